use axum::{ http::StatusCode, response::{ IntoResponse, Response }, Json };
use log::error;
use serde_json::json;
use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Rate limit exceeded. Please slow down.")]
    RateLimited,

    #[error("transient failure: {0}")]
    Transient(String),
}

impl ChatError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ChatError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ChatError::Forbidden(_) => StatusCode::FORBIDDEN,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ChatError::Transient(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller. Transient failures never leak detail.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Transient(_) => "Server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<crate::store::StoreError> for ChatError {
    fn from(err: crate::store::StoreError) -> Self {
        ChatError::Transient(err.to_string())
    }
}

impl From<crate::directory::DirectoryError> for ChatError {
    fn from(err: crate::directory::DirectoryError) -> Self {
        ChatError::Transient(err.to_string())
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        if let ChatError::Transient(ref detail) = self {
            error!("Internal failure: {}", detail);
        }
        let body = Json(json!({ "message": self.user_message() }));
        (self.status_code(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(ChatError::InvalidInput("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ChatError::Unauthorized("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ChatError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ChatError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ChatError::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn transient_detail_is_hidden() {
        let err = ChatError::Transient("redis connection refused at 10.0.0.5".into());
        assert_eq!(err.user_message(), "Server error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
