//! In-memory remote store.
//!
//! Serves two purposes: the production offline stand-in (the core keeps
//! working against it when no real client is configured) and the test
//! double for everything in `fieldreg-sync`. Supports fault injection so
//! tests can exercise retry and reconnect paths deterministically.

use crate::error::{StoreError, StoreResult};
use crate::remote::{Document, RemoteStore, Snapshot, Subscription, non_object_patch};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

const SNAPSHOT_CHANNEL_CAPACITY: usize = 32;

struct CollectionState {
    docs: Vec<Document>,
    seq: u64,
    tx: broadcast::Sender<Snapshot>,
}

impl CollectionState {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            docs: Vec::new(),
            seq: 0,
            tx,
        }
    }

    fn snapshot(&self, collection: &str) -> Snapshot {
        Snapshot {
            collection: collection.to_string(),
            seq: self.seq,
            docs: self.docs.clone(),
        }
    }

    fn publish(&mut self, collection: &str) {
        self.seq += 1;
        // No receivers is fine; the send result is irrelevant.
        let _ = self.tx.send(self.snapshot(collection));
    }
}

struct Inner {
    collections: HashMap<String, CollectionState>,
    online: bool,
    fail_next: u32,
}

/// In-memory implementation of [`RemoteStore`].
pub struct MemoryRemoteStore {
    inner: Mutex<Inner>,
}

impl MemoryRemoteStore {
    /// Creates an empty store in the online state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                collections: HashMap::new(),
                online: true,
                fail_next: 0,
            }),
        }
    }

    /// Simulates losing or regaining connectivity. While offline every
    /// operation fails with [`StoreError::Unavailable`].
    pub fn set_online(&self, online: bool) {
        self.inner.lock().unwrap().online = online;
    }

    /// Whether the simulated link is up.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.inner.lock().unwrap().online
    }

    /// Makes the next `n` operations fail with a transient error, then
    /// recover. For exercising retry paths.
    pub fn fail_next(&self, n: u32) {
        self.inner.lock().unwrap().fail_next = n;
    }

    /// Number of documents currently in a collection.
    #[must_use]
    pub fn doc_count(&self, collection: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .collections
            .get(collection)
            .map_or(0, |c| c.docs.len())
    }

    fn check_available(inner: &mut Inner) -> StoreResult<()> {
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        if !inner.online {
            return Err(StoreError::Unavailable("offline".into()));
        }
        Ok(())
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&mut inner)?;
        Ok(inner
            .collections
            .get(collection)
            .map(|c| c.docs.clone())
            .unwrap_or_default())
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<Vec<Document>> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&mut inner)?;
        Ok(inner
            .collections
            .get(collection)
            .map(|c| {
                c.docs
                    .iter()
                    .filter(|d| d.data.get(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add(&self, collection: &str, data: Value) -> StoreResult<Document> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&mut inner)?;
        let doc = Document::new(Uuid::now_v7().to_string(), data);
        let state = inner
            .collections
            .entry(collection.to_string())
            .or_insert_with(CollectionState::new);
        state.docs.push(doc.clone());
        state.publish(collection);
        Ok(doc)
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> StoreResult<()> {
        let Value::Object(patch) = patch else {
            return Err(non_object_patch());
        };
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&mut inner)?;
        let state = inner
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound(format!("{collection}/{id}")))?;
        let doc = state
            .docs
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("{collection}/{id}")))?;
        match &mut doc.data {
            Value::Object(body) => {
                for (k, v) in patch {
                    body.insert(k, v);
                }
            }
            other => *other = Value::Object(patch),
        }
        state.publish(collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&mut inner)?;
        let state = inner
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound(format!("{collection}/{id}")))?;
        let before = state.docs.len();
        state.docs.retain(|d| d.id != id);
        if state.docs.len() == before {
            return Err(StoreError::NotFound(format!("{collection}/{id}")));
        }
        state.publish(collection);
        Ok(())
    }

    async fn subscribe(&self, collection: &str) -> StoreResult<Subscription> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&mut inner)?;
        let state = inner
            .collections
            .entry(collection.to_string())
            .or_insert_with(CollectionState::new);
        let initial = state.snapshot(collection);
        Ok(Subscription::new(Some(initial), state.tx.subscribe()))
    }
}
