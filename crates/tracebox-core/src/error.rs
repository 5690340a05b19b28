//! Error types for tracebox core.

use thiserror::Error;

/// Errors from key parsing and query vector decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("prefix width {0} is outside the supported range 8..=32 bits")]
    InvalidPrefixWidth(u32),

    #[error("invalid query vector: {0}")]
    InvalidQueryVector(String),

    #[error("bucket key width mismatch: expected {expected} bits, got {got}")]
    WidthMismatch { expected: u32, got: u32 },

    #[error("invalid hashed key: {0}")]
    InvalidHashedPk(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
