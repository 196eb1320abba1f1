//! Bounded TTL cache for synced collections.
//!
//! One entry per collection key, replaced wholesale on every snapshot.
//! Reads return a copy and never the cached value itself; callers cannot
//! mutate cache state in place. Time is read through `tokio::time` so
//! tests can drive expiry with a paused clock.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

struct CacheEntry {
    data: Value,
    stored_at: Instant,
}

/// Bounded, TTL-based key → data cache.
pub struct LocalCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl LocalCache {
    /// Creates a cache with the given TTL and capacity.
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity,
        }
    }

    /// The configured TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Replaces the entry under `key`. Evicts the oldest entry first when
    /// inserting a new key into a full cache.
    pub fn insert(&self, key: impl Into<String>, data: Value) {
        let key = key.into();
        let mut entries = self.entries.lock().unwrap();
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.stored_at)
                .map(|(k, _)| k.clone())
            {
                debug!("cache full, evicting oldest entry {oldest}");
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                data,
                stored_at: Instant::now(),
            },
        );
    }

    /// Returns a copy of the entry under `key` if present and not stale.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(key)?;
        if entry.stored_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.data.clone())
    }

    /// Removes the entry under `key`.
    pub fn invalidate(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    /// Evicts every entry older than the TTL. Returns how many were
    /// evicted.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, e| e.stored_at.elapsed() <= self.ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!("cache sweep evicted {evicted} stale entries");
        }
        evicted
    }

    /// Number of entries, stale or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}
