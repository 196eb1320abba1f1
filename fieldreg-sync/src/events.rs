//! Typed change events.
//!
//! A broadcast channel internal to the core, decoupled from any UI
//! toolkit. The UI layer subscribes and re-renders from event payloads;
//! the core never calls into it directly.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

/// Where a collection update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    /// Delivered by a live snapshot subscription.
    Subscription,
    /// Fetched by a direct remote read (cache refresh).
    DirectRead,
    /// Restored from the persisted local snapshot while offline.
    LocalFallback,
}

/// Payload of a collection change event.
#[derive(Debug, Clone)]
pub struct CollectionUpdate {
    /// The new collection data.
    pub data: Value,
    /// Where the update came from.
    pub source: ChangeSource,
    /// When the update was applied locally.
    pub timestamp: DateTime<Utc>,
    /// Elapsed processing time for applying the update.
    pub elapsed_ms: u64,
}

/// Events published by the core to the embedding application.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// The voting-center configuration mapping changed.
    ConfigUpdated(CollectionUpdate),
    /// The community list changed.
    CommunitiesUpdated(CollectionUpdate),
    /// The voter records collection changed.
    VotersUpdated(CollectionUpdate),
    /// A queued registration was committed to the remote store.
    RegistrationCommitted {
        /// National id of the committed record.
        national_id: String,
    },
}

/// Broadcast channel of [`ChangeEvent`]s.
///
/// Cloning shares the channel. Publishing with no subscribers is fine;
/// slow subscribers that lag simply miss intermediate events, which is
/// safe because every collection update carries the full new data.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    /// Creates a bus retaining up to `capacity` undelivered events per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event to all current subscribers.
    pub fn publish(&self, event: ChangeEvent) {
        trace!("publishing {event:?}");
        let _ = self.tx.send(event);
    }

    /// Opens a new subscription.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Current number of subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
