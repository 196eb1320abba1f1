//! Collection sync manager.
//!
//! Opens one snapshot subscription per tracked collection, mirrors the
//! remote store into the local cache and a durable snapshot, and emits
//! typed change events. Reconnects with capped exponential backoff when
//! a stream breaks; restarts wholesale when the network or visibility
//! comes back.
//!
//! Concurrent writers from other operators are reconciled entirely by
//! the remote store's own ordering; this manager only mirrors whatever
//! the store reports, and the per-collection sequence check guarantees a
//! newer local snapshot is never overwritten by an older delivery.

use crate::cache::LocalCache;
use crate::collections;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult, bounded};
use crate::events::{ChangeEvent, ChangeSource, CollectionUpdate, EventBus};
use crate::signals::Signals;
use fieldreg_store::{Document, LocalStore, RemoteStore, Snapshot, Subscription};
use fieldreg_types::{CenterMap, VoterRecord};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Connection state of one collection's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionState {
    Online,
    #[default]
    Offline,
    Reconnecting,
}

/// Per-collection sync status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionStatus {
    pub state: CollectionState,
    /// When the last snapshot was applied.
    pub last_sync: Option<DateTime<Utc>>,
    /// Sequence of the last applied snapshot.
    pub last_seq: Option<u64>,
    /// Reconnect attempts since the stream last worked.
    pub reconnect_attempts: u32,
}

/// Aggregate sync counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncMetrics {
    pub snapshots_applied: u64,
    /// Snapshots dropped by the monotonic sequence check.
    pub stale_skipped: u64,
    pub last_elapsed_ms: u64,
}

/// Snapshot of the manager's state for the UI layer.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub collections: HashMap<String, CollectionStatus>,
    pub metrics: SyncMetrics,
}

impl SyncStatus {
    /// Whether at least one collection has a live stream.
    #[must_use]
    pub fn any_online(&self) -> bool {
        self.collections
            .values()
            .any(|s| s.state == CollectionState::Online)
    }
}

/// Mirrors remote collections into the local cache.
pub struct SyncManager {
    remote: Arc<dyn RemoteStore>,
    local: Arc<dyn LocalStore>,
    cache: Arc<LocalCache>,
    events: EventBus,
    signals: Signals,
    config: SyncConfig,
    debouncer: Debouncer,
    status: Mutex<HashMap<String, CollectionStatus>>,
    metrics: Mutex<SyncMetrics>,
    syncing: AtomicBool,
    running: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncManager {
    /// Creates a manager. Nothing runs until [`start_full_sync`] or
    /// [`start`] is called.
    ///
    /// [`start_full_sync`]: SyncManager::start_full_sync
    /// [`start`]: SyncManager::start
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        local: Arc<dyn LocalStore>,
        cache: Arc<LocalCache>,
        events: EventBus,
        signals: Signals,
        config: SyncConfig,
    ) -> Self {
        let status = collections::TRACKED
            .iter()
            .map(|c| (c.to_string(), CollectionStatus::default()))
            .collect();
        let debouncer = Debouncer::new(config.debounce_quiet);
        Self {
            remote,
            local,
            cache,
            events,
            signals,
            config,
            debouncer,
            status: Mutex::new(status),
            metrics: Mutex::new(SyncMetrics::default()),
            syncing: AtomicBool::new(false),
            running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Opens one subscription task per tracked collection. A no-op while
    /// a full sync is already running.
    pub fn start_full_sync(self: Arc<Self>) {
        if self.syncing.swap(true, Ordering::SeqCst) {
            debug!("full sync already running");
            return;
        }
        info!("starting full sync");
        let mut tasks = self.tasks.lock().unwrap();
        for collection in collections::TRACKED {
            let manager = Arc::clone(&self);
            tasks.push(tokio::spawn(manager.sync_collection(collection)));
        }
    }

    /// Cancels all subscriptions and marks every collection offline.
    pub fn stop_sync(&self) {
        let aborted = {
            let mut tasks = self.tasks.lock().unwrap();
            let aborted = !tasks.is_empty();
            for task in tasks.drain(..) {
                task.abort();
            }
            aborted
        };
        {
            let mut status = self.status.lock().unwrap();
            for collection in collections::TRACKED {
                let entry = status.entry(collection.to_string()).or_default();
                entry.state = CollectionState::Offline;
                entry.reconnect_attempts = 0;
            }
        }
        self.syncing.store(false, Ordering::SeqCst);
        if aborted {
            info!("sync stopped");
        }
    }

    /// The manager's debounced-callback helper, built from the configured
    /// quiet period. UI layers route bursty per-collection re-renders
    /// through it instead of reacting to every event.
    #[must_use]
    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    /// Per-collection status plus aggregate metrics.
    #[must_use]
    pub fn sync_status(&self) -> SyncStatus {
        SyncStatus {
            collections: self.status.lock().unwrap().clone(),
            metrics: *self.metrics.lock().unwrap(),
        }
    }

    /// Starts the supervision loop: restarts the full sync on network or
    /// visibility regain, tears it down on network loss, and sweeps the
    /// cache periodically.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        if self.signals.online.get() {
            Arc::clone(&self).start_full_sync();
        }
        let manager = self;
        tokio::spawn(async move {
            let mut online_rx = manager.signals.online.watch();
            let mut visible_rx = manager.signals.visible.watch();
            let mut sweep = tokio::time::interval(manager.config.sweep_interval);
            sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
            while manager.running.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = sweep.tick() => {
                        manager.cache.sweep();
                    }
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *online_rx.borrow_and_update() {
                            info!("network online, restarting full sync");
                            manager.stop_sync();
                            Arc::clone(&manager).start_full_sync();
                        } else {
                            info!("network lost, stopping sync");
                            manager.stop_sync();
                        }
                    }
                    changed = visible_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *visible_rx.borrow_and_update() && manager.signals.online.get() {
                            info!("app visible again, restarting full sync");
                            manager.stop_sync();
                            Arc::clone(&manager).start_full_sync();
                        }
                    }
                }
            }
            debug!("sync manager loop stopped");
        })
    }

    /// Stops the supervision loop, all subscriptions, and any pending
    /// debounced callbacks.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop_sync();
        self.debouncer.cancel_all();
    }

    /// Opens a timeout-bounded subscription, mapping any failure into the
    /// reconnect-triggering error class.
    async fn open_stream(&self, collection: &str) -> SyncResult<Subscription> {
        bounded(self.config.remote_timeout, self.remote.subscribe(collection))
            .await
            .map_err(|e| SyncError::Subscription(e.to_string()))
    }

    async fn sync_collection(self: Arc<Self>, collection: &'static str) {
        let mut attempts: u32 = 0;
        loop {
            match self.open_stream(collection).await {
                Ok(mut subscription) => {
                    info!("subscribed to {collection}");
                    attempts = 0;
                    self.set_state(collection, CollectionState::Online, 0);
                    while let Some(snapshot) = subscription.recv().await {
                        self.apply_snapshot(collection, snapshot);
                    }
                    warn!("subscription to {collection} closed");
                }
                Err(e) => {
                    warn!("subscribe to {collection} failed: {e}");
                }
            }

            attempts += 1;
            if attempts > self.config.max_reconnect_attempts {
                warn!("{collection}: reconnect attempts exhausted, marking offline");
                self.set_state(collection, CollectionState::Offline, attempts);
                return;
            }
            let delay = reconnect_delay(
                self.config.reconnect_base,
                self.config.reconnect_cap,
                attempts,
            );
            self.set_state(collection, CollectionState::Reconnecting, attempts);
            debug!("{collection}: reconnect attempt {attempts} in {delay:?}");
            tokio::time::sleep(delay).await;
        }
    }

    fn apply_snapshot(&self, collection: &str, snapshot: Snapshot) {
        let started = Instant::now();
        {
            let mut status = self.status.lock().unwrap();
            let entry = status.entry(collection.to_string()).or_default();
            if entry.last_seq.is_some_and(|last| snapshot.seq <= last) {
                debug!(
                    "{collection}: dropping stale snapshot seq {} (have {:?})",
                    snapshot.seq, entry.last_seq
                );
                self.metrics.lock().unwrap().stale_skipped += 1;
                return;
            }
            entry.last_seq = Some(snapshot.seq);
            entry.last_sync = Some(Utc::now());
            entry.state = CollectionState::Online;
        }

        let value = Self::collection_value(collection, &snapshot.docs);
        self.cache.insert(collection, value.clone());
        if let Err(e) = self.persist_snapshot(collection, &value) {
            warn!("{collection}: failed to persist snapshot: {e}");
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        {
            let mut metrics = self.metrics.lock().unwrap();
            metrics.snapshots_applied += 1;
            metrics.last_elapsed_ms = elapsed_ms;
        }
        self.events.publish(Self::make_event(
            collection,
            CollectionUpdate {
                data: value,
                source: ChangeSource::Subscription,
                timestamp: Utc::now(),
                elapsed_ms,
            },
        ));
        debug!(
            "{collection}: applied snapshot seq {} in {elapsed_ms}ms",
            snapshot.seq
        );
    }

    // ── Cache read helpers ───────────────────────────────────────

    /// The configuration mapping, from cache when fresh, otherwise from
    /// a direct remote read, otherwise from the persisted snapshot.
    pub async fn load_center_config(&self) -> SyncResult<CenterMap> {
        let value = self.load_collection(collections::CENTER_CONFIG).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// The community list as `[{id, data}]`.
    pub async fn load_communities(&self) -> SyncResult<Value> {
        self.load_collection(collections::COMMUNITIES).await
    }

    /// All voter records. Malformed documents are skipped with a warning
    /// rather than failing the whole read.
    pub async fn load_voters(&self) -> SyncResult<Vec<VoterRecord>> {
        let value = self.load_collection(collections::VOTERS).await?;
        let docs: Vec<Document> = serde_json::from_value(value)?;
        let mut records = Vec::with_capacity(docs.len());
        for doc in docs {
            match serde_json::from_value::<VoterRecord>(doc.data) {
                Ok(record) => records.push(record),
                Err(e) => warn!("skipping malformed voter record {}: {e}", doc.id),
            }
        }
        Ok(records)
    }

    async fn load_collection(&self, collection: &'static str) -> SyncResult<Value> {
        if let Some(value) = self.cache.get(collection) {
            return Ok(value);
        }
        match bounded(self.config.remote_timeout, self.remote.get_all(collection)).await {
            Ok(docs) => {
                let value = Self::collection_value(collection, &docs);
                self.cache.insert(collection, value.clone());
                if let Err(e) = self.persist_snapshot(collection, &value) {
                    warn!("{collection}: failed to persist snapshot: {e}");
                }
                self.events.publish(Self::make_event(
                    collection,
                    CollectionUpdate {
                        data: value.clone(),
                        source: ChangeSource::DirectRead,
                        timestamp: Utc::now(),
                        elapsed_ms: 0,
                    },
                ));
                Ok(value)
            }
            Err(e) => {
                warn!("direct read of {collection} failed, trying persisted snapshot: {e}");
                let blob = self
                    .local
                    .load(&collections::snapshot_key(collection))
                    .map_err(|se| SyncError::Storage(se.to_string()))?;
                match blob {
                    Some(blob) => {
                        let value: Value = serde_json::from_slice(&blob)?;
                        self.events.publish(Self::make_event(
                            collection,
                            CollectionUpdate {
                                data: value.clone(),
                                source: ChangeSource::LocalFallback,
                                timestamp: Utc::now(),
                                elapsed_ms: 0,
                            },
                        ));
                        Ok(value)
                    }
                    None => Err(e),
                }
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────

    fn persist_snapshot(&self, collection: &str, value: &Value) -> SyncResult<()> {
        let blob = serde_json::to_vec(value)?;
        self.local
            .persist(&collections::snapshot_key(collection), &blob)
            .map_err(|e| SyncError::Storage(e.to_string()))
    }

    /// Builds the cached representation of a collection. The center
    /// configuration is folded into a [`CenterMap`]; other collections
    /// keep their `[{id, data}]` document shape.
    fn collection_value(collection: &str, docs: &[Document]) -> Value {
        if collection == collections::CENTER_CONFIG {
            let mut map = CenterMap::new();
            for doc in docs {
                let Some(center) = doc.data.get("center").and_then(Value::as_str) else {
                    warn!("malformed center config doc {}", doc.id);
                    continue;
                };
                let communities = doc
                    .data
                    .get("communities")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                for community in communities.iter().filter_map(Value::as_str) {
                    map.add_community(center, community);
                }
            }
            serde_json::to_value(map).unwrap_or(Value::Null)
        } else {
            serde_json::to_value(docs).unwrap_or(Value::Null)
        }
    }

    fn make_event(collection: &str, update: CollectionUpdate) -> ChangeEvent {
        match collection {
            collections::CENTER_CONFIG => ChangeEvent::ConfigUpdated(update),
            collections::COMMUNITIES => ChangeEvent::CommunitiesUpdated(update),
            _ => ChangeEvent::VotersUpdated(update),
        }
    }

    fn set_state(&self, collection: &str, state: CollectionState, attempts: u32) {
        let mut status = self.status.lock().unwrap();
        let entry = status.entry(collection.to_string()).or_default();
        entry.state = state;
        entry.reconnect_attempts = attempts;
    }
}

/// Capped exponential backoff: `base * 2^(attempt-1)`, clamped to `cap`.
fn reconnect_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(16);
    base.saturating_mul(factor).min(cap)
}

/// Coalesces bursts of rapid updates for the same key into a single
/// callback after a quiet period, sparing the UI redundant re-renders
/// during high-frequency remote writes.
pub struct Debouncer {
    quiet: Duration,
    pending: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Debouncer {
    /// Creates a debouncer with the given quiet period.
    #[must_use]
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Schedules `callback` to run after the quiet period, replacing any
    /// callback still pending for the same key.
    pub fn call<F>(&self, key: &str, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = self.pending.lock().unwrap();
        if let Some(previous) = pending.remove(key) {
            previous.abort();
        }
        let quiet = self.quiet;
        pending.insert(
            key.to_string(),
            tokio::spawn(async move {
                tokio::time::sleep(quiet).await;
                callback();
            }),
        );
    }

    /// Cancels every pending callback.
    pub fn cancel_all(&self) {
        for (_, task) in self.pending.lock().unwrap().drain() {
            task.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
