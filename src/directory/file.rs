use async_trait::async_trait;
use log::info;
use std::collections::HashMap;
use std::fs;
use std::path::{ Path, PathBuf };
use std::time::SystemTime;
use tokio::sync::RwLock;
use crate::directory::{ DirectoryError, EmployeeDirectory };
use crate::models::employee::Employee;

struct Snapshot {
    employees: HashMap<String, Employee>,
    last_loaded: Option<SystemTime>,
}

/// Directory backed by a JSON array of employee records.
pub struct FileDirectory {
    path: Option<PathBuf>,
    snapshot: RwLock<Snapshot>,
}

fn read_employees(path: &Path) -> Result<Vec<Employee>, DirectoryError> {
    let display = path.display().to_string();
    let content = fs
        ::read_to_string(path)
        .map_err(|source| DirectoryError::Io { path: display.clone(), source })?;
    serde_json::from_str(&content).map_err(|source| DirectoryError::Json { path: display, source })
}

fn index(employees: Vec<Employee>) -> HashMap<String, Employee> {
    employees
        .into_iter()
        .map(|e| (e.id.clone(), e))
        .collect()
}

impl FileDirectory {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DirectoryError> {
        let path = path.as_ref().to_path_buf();
        let employees = read_employees(&path)?;
        info!("Loaded {} employees from {}", employees.len(), path.display());
        Ok(Self {
            path: Some(path),
            snapshot: RwLock::new(Snapshot {
                employees: index(employees),
                last_loaded: Some(SystemTime::now()),
            }),
        })
    }

    pub fn from_employees(employees: Vec<Employee>) -> Self {
        Self {
            path: None,
            snapshot: RwLock::new(Snapshot { employees: index(employees), last_loaded: None }),
        }
    }

    /// Swaps the whole record set, e.g. after an HR reassignment.
    pub async fn replace(&self, employees: Vec<Employee>) {
        let mut snapshot = self.snapshot.write().await;
        snapshot.employees = index(employees);
        snapshot.last_loaded = Some(SystemTime::now());
    }

    pub async fn len(&self) -> usize {
        self.snapshot.read().await.employees.len()
    }

    /// Re-reads the backing file when its mtime is newer than the last load.
    /// Returns whether anything was reloaded.
    pub async fn reload_if_changed(&self) -> Result<bool, DirectoryError> {
        let path = self.path.as_ref().ok_or(DirectoryError::NoSource)?;
        let display = path.display().to_string();
        let metadata = fs
            ::metadata(path)
            .map_err(|source| DirectoryError::Io { path: display, source })?;

        let last_loaded = self.snapshot.read().await.last_loaded;
        let changed = match (metadata.modified().ok(), last_loaded) {
            (Some(modified), Some(last)) => modified > last,
            _ => true,
        };
        if !changed {
            return Ok(false);
        }

        info!("Employee directory changed, reloading...");
        let employees = read_employees(path)?;
        self.replace(employees).await;
        Ok(true)
    }
}

#[async_trait]
impl EmployeeDirectory for FileDirectory {
    async fn find(&self, employee_id: &str) -> Result<Option<Employee>, DirectoryError> {
        Ok(self.snapshot.read().await.employees.get(employee_id).cloned())
    }
}
