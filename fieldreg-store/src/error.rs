//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Document or collection not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote store is unreachable or refused the operation.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// A snapshot subscription closed and delivers no further updates.
    #[error("subscription closed")]
    SubscriptionClosed,

    /// Invalid data (malformed document, non-object patch, ...).
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// Returns true if the operation may succeed on a later retry.
    ///
    /// Validation-style errors (`NotFound`, `InvalidData`, `Serialization`)
    /// are permanent; connectivity-style errors are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_) | StoreError::Io(_) | StoreError::SubscriptionClosed
        )
    }
}
