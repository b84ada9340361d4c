mod file;

pub use file::FileDirectory;

use async_trait::async_trait;
use thiserror::Error;
use crate::models::employee::Employee;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Failed to read employee directory '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse employee directory '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Employee directory has no backing file")]
    NoSource,
}

/// Employee lookup owned by the HR directory. Read-only from the messaging
/// side; assignment links are re-read on every call.
#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn find(&self, employee_id: &str) -> Result<Option<Employee>, DirectoryError>;
}
