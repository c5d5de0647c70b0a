//! Storage error types for lmtrace-storage.
//!
//! [`StorageError`] covers every failure mode in the storage layer. The
//! engine treats [`StorageError::Unavailable`] specially (it degrades to
//! untracked execution); everything else is propagated to the caller.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// The backend cannot serve requests right now (locked, busy, or the
    /// database file cannot be opened).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A program version with the given id was not found.
    #[error("version not found: {0}")]
    VersionNotFound(String),

    /// A data integrity violation was detected.
    #[error("integrity error: {reason}")]
    IntegrityError { reason: String },

    /// A stored row could not be turned back into a record.
    #[error("reconstruction error: {reason}")]
    ReconstructionError { reason: String },
}

impl StorageError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy)
            | Some(ErrorCode::DatabaseLocked)
            | Some(ErrorCode::CannotOpen) => StorageError::Unavailable(err.to_string()),
            Some(ErrorCode::ConstraintViolation) => StorageError::IntegrityError {
                reason: err.to_string(),
            },
            _ => StorageError::Sqlite(err),
        }
    }
}

impl From<lmtrace_core::CoreError> for StorageError {
    fn from(err: lmtrace_core::CoreError) -> Self {
        StorageError::ReconstructionError {
            reason: err.to_string(),
        }
    }
}
