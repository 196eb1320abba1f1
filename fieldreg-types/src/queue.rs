//! Durable queue items.
//!
//! A queue item wraps a registration draft while it waits for delivery to
//! the remote store. Items are owned exclusively by the registration queue
//! and persisted on every mutation, so a crash or restart resumes with the
//! same items in the same order.

use crate::{QueueItemId, RegistrationDraft};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a queued registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    /// Waiting for the next drain pass.
    Pending,
    /// Currently being written to the remote store.
    Processing,
    /// A remote write failed; eligible for the next pass.
    Retry,
    /// Retry ceiling exhausted; removed from processing.
    Failed,
    /// Committed to the remote store.
    Done,
}

/// A registration waiting in the durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub draft: RegistrationDraft,
    pub status: QueueItemStatus,
    /// Number of remote write attempts so far.
    pub attempts: u32,
    /// Message from the most recent failed attempt.
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueItem {
    /// Wraps a draft as a fresh pending item.
    #[must_use]
    pub fn new(draft: RegistrationDraft) -> Self {
        Self {
            id: QueueItemId::new(),
            draft,
            status: QueueItemStatus::Pending,
            attempts: 0,
            last_error: None,
            enqueued_at: Utc::now(),
        }
    }

    /// Whether the item is still eligible for a drain pass.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        matches!(
            self.status,
            QueueItemStatus::Pending | QueueItemStatus::Retry
        )
    }

    /// Records a failed remote write attempt.
    pub fn record_failure(&mut self, error: impl Into<String>, max_retries: u32) {
        self.attempts += 1;
        self.last_error = Some(error.into());
        self.status = if self.attempts >= max_retries {
            QueueItemStatus::Failed
        } else {
            QueueItemStatus::Retry
        };
    }

    /// Records a failed attempt that no retry can ever make succeed.
    pub fn record_permanent_failure(&mut self, error: impl Into<String>) {
        self.attempts += 1;
        self.last_error = Some(error.into());
        self.status = QueueItemStatus::Failed;
    }
}
