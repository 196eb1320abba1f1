//! Remote document store abstraction.
//!
//! Defines a common interface over whatever authoritative store the
//! embedding application talks to. The sync core only depends on these
//! operations; the wire format is the client's business.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

/// A document in a remote collection: an opaque JSON body under a
/// store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The document's unique identifier within its collection.
    pub id: String,
    /// The document body.
    pub data: Value,
}

impl Document {
    /// Creates a document from an id and body.
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// A full replacement view of a collection, as delivered by a
/// subscription callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Collection this snapshot belongs to.
    pub collection: String,
    /// Monotonic sequence number within the collection. Consumers must
    /// never apply a snapshot whose seq is not greater than the last one
    /// they applied.
    pub seq: u64,
    /// All documents currently in the collection.
    pub docs: Vec<Document>,
}

/// A live subscription to one collection's snapshots.
///
/// The current snapshot is delivered first, then every subsequent change.
/// Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    initial: Option<Snapshot>,
    rx: broadcast::Receiver<Snapshot>,
}

impl Subscription {
    /// Wraps a broadcast receiver plus the snapshot current at subscribe
    /// time. Transport implementations construct this.
    pub fn new(initial: Option<Snapshot>, rx: broadcast::Receiver<Snapshot>) -> Self {
        Self { initial, rx }
    }

    /// Receives the next snapshot. Returns `None` once the stream is
    /// closed. A consumer that lags far enough to miss intermediate
    /// snapshots skips straight to newer ones, which is safe because each
    /// snapshot is a full replacement view.
    pub async fn recv(&mut self) -> Option<Snapshot> {
        if let Some(snapshot) = self.initial.take() {
            return Some(snapshot);
        }
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("subscription lagged, skipped {n} snapshots");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Abstract remote document store.
///
/// All operations may fail with [`StoreError::Unavailable`] when the
/// network is down; callers are expected to bound them with timeouts and
/// handle transient failures via their own retry policy.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns all documents in a collection.
    async fn get_all(&self, collection: &str) -> StoreResult<Vec<Document>>;

    /// Returns documents whose body has `field` equal to `value`.
    async fn query(&self, collection: &str, field: &str, value: &Value)
    -> StoreResult<Vec<Document>>;

    /// Adds a document, returning it with its assigned id.
    async fn add(&self, collection: &str, data: Value) -> StoreResult<Document>;

    /// Merges `patch`'s top-level fields into the document body.
    async fn update(&self, collection: &str, id: &str, patch: Value) -> StoreResult<()>;

    /// Deletes a document.
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;

    /// Opens a snapshot subscription to a collection.
    async fn subscribe(&self, collection: &str) -> StoreResult<Subscription>;
}

pub(crate) fn non_object_patch() -> StoreError {
    StoreError::InvalidData("update patch must be a JSON object".into())
}
