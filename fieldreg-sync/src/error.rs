//! Error types for the sync core.

use crate::validator::ValidationError;
use fieldreg_store::{StoreError, StoreResult};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in the sync core.
///
/// `Validation` and `Duplicate` surface synchronously to the caller and
/// are never retried. `Remote` and `Timeout` are transient and absorbed
/// by retry ceilings; they only reach callers in aggregate reports.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Bad input shape or range; never queued.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Conflicting national id in the queue or the remote store.
    #[error("duplicate national id: {national_id}")]
    Duplicate { national_id: String },

    /// Transient remote store failure.
    #[error("remote store error: {0}")]
    Remote(#[from] StoreError),

    /// A sync stream broke; triggers reconnect with backoff.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// A monitored dependency failed its probe.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Durable local storage failure.
    #[error("local storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A remote operation exceeded its time bound.
    #[error("operation timed out")]
    Timeout,
}

impl SyncError {
    /// Returns true if a later retry of the same operation may succeed.
    ///
    /// Drives the queue's retry/fail split: transient failures climb the
    /// retry ladder, permanent ones (bad data, serialization) go straight
    /// to failed instead of burning the full ceiling.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_transient(),
            SyncError::Timeout | SyncError::Subscription(_) | SyncError::ServiceUnavailable(_) => {
                true
            }
            _ => false,
        }
    }
}

/// Runs a remote operation under a time bound.
pub(crate) async fn bounded<T>(
    limit: Duration,
    op: impl Future<Output = StoreResult<T>>,
) -> SyncResult<T> {
    match tokio::time::timeout(limit, op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(SyncError::Remote(e)),
        Err(_) => Err(SyncError::Timeout),
    }
}
