//! Error types for the store module.

use rusqlite::ErrorCode;
use thiserror::Error;

use tracebox_core::CoreError;

/// One shard of a fan-out scan that did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardFailure {
    /// Position of the shard in dispatch order.
    pub shard: usize,
    /// What went wrong.
    pub message: String,
}

/// Some shards of a query failed. Rows from the other shards were still
/// returned alongside this error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} of {total_shards} shards failed", .failures.len())]
pub struct PartialQueryFailure {
    /// Number of shards dispatched.
    pub total_shards: usize,
    /// The shards that failed.
    pub failures: Vec<ShardFailure>,
}

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or could not prepare the operation.
    /// Nothing was written or read.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The query vector did not decode.
    #[error("invalid query vector: {0}")]
    InvalidQueryVector(#[from] CoreError),

    /// A row was refused before reaching the backend.
    ///
    /// Covers rows that did not decode as well as rows that decoded but
    /// cannot be stored.
    #[error("row rejected: {0}")]
    Rejected(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// One or more shards of a query failed.
    #[error(transparent)]
    PartialQuery(#[from] PartialQueryFailure),
}

impl StoreError {
    /// Whether repeating the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Unavailable(_) | StoreError::PartialQuery(_) => true,
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
