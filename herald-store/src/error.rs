//! Error types for the herald-store crate.

use std::path::PathBuf;

use herald_common::RecordKey;
use thiserror::Error;

/// Data-access failures, for both fetch and status updates.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be opened.
    #[error("Failed to open database at {}: {source}", path.display())]
    Connection {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A statement failed to prepare or execute.
    #[error("Query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// A fetched row did not have the expected shape.
    #[error("Malformed row: {0}")]
    Row(String),

    /// The fetch returned the same (ApplicationNo, RollNo) twice.
    #[error("Duplicate record in fetch result: {0}")]
    DuplicateKey(RecordKey),

    /// A status update matched no row.
    #[error("No record matched status update for {0}")]
    NoMatchingRow(RecordKey),

    /// The blocking task running the statement did not complete.
    #[error("Store task failed: {0}")]
    Task(String),

    /// Internal error (lock poisoning, injected failures).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}
