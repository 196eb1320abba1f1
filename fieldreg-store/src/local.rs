//! Durable local key/blob storage.
//!
//! The sync core persists two things locally: the registration queue (so
//! a restart resumes with the same pending items) and the last good
//! snapshot of each synced collection (so reads have a fallback while
//! offline). Both are opaque serialized payloads; no format is imposed
//! here.

use crate::error::StoreResult;
use std::collections::HashMap;
use std::sync::Mutex;

/// Durable key → opaque blob persistence.
pub trait LocalStore: Send + Sync {
    /// Writes (or overwrites) a blob under a key.
    fn persist(&self, key: &str, blob: &[u8]) -> StoreResult<()>;

    /// Reads the blob stored under a key, if any.
    fn load(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Removes a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> StoreResult<()>;
}

/// In-memory [`LocalStore`] for tests.
#[derive(Default)]
pub struct MemoryLocalStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

impl LocalStore for MemoryLocalStore {
    fn persist(&self, key: &str, blob: &[u8]) -> StoreResult<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    fn load(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}
