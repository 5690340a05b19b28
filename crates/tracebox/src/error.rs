//! Error types for the service.

use tracebox_store::StoreError;
use thiserror::Error;

/// Errors that can occur while configuring or serving requests.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Configuration is unreadable or out of range.
    #[error("configuration error: {0}")]
    Config(String),

    /// Request or config body is not the expected JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The `since` bound is not a Unix timestamp.
    #[error("invalid since: {0}")]
    InvalidSince(String),

    /// No handler for the request.
    #[error("not found: {0}")]
    NotFound(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// HTTP-style status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            ServiceError::Json(_)
            | ServiceError::InvalidSince(_)
            | ServiceError::Store(StoreError::InvalidQueryVector(_)) => 400,
            ServiceError::NotFound(_) => 404,
            _ => 500,
        }
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
