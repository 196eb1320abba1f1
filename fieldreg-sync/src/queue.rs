//! Durable registration queue.
//!
//! FIFO of pending registrations, persisted on every mutation so a
//! process restart resumes with the same items. Drains to the remote
//! store in fixed-size batches with a retry ceiling; duplicate detection
//! runs on every attempt, not just at enqueue time, so a write that was
//! in flight during a crash can never commit twice.

use crate::cache::LocalCache;
use crate::collections;
use crate::config::QueueConfig;
use crate::error::{SyncError, SyncResult, bounded};
use crate::events::{ChangeEvent, EventBus};
use crate::signals::{OperatorProvider, Signals};
use crate::validator::validate;
use fieldreg_store::{LocalStore, RemoteStore};
use fieldreg_types::{
    CenterMap, QueueItem, QueueItemId, QueueItemStatus, RegistrationDraft, VoterRecord,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Key under which the queue persists itself in the local store.
pub const QUEUE_STORAGE_KEY: &str = "registration_queue";

/// Queue counters exposed to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub retry: usize,
    pub is_online: bool,
    pub is_processing: bool,
}

/// Outcome of one drain pass. Items that exhausted their retries are
/// listed here rather than surfaced as errors, so the UI can prompt
/// manual intervention without the drain loop ever crashing.
#[derive(Debug, Clone, Default)]
pub struct ProcessReport {
    /// Items attempted this pass.
    pub processed: usize,
    /// Items committed to the remote store.
    pub committed: usize,
    /// Items dropped because the id was already committed remotely.
    pub duplicates: usize,
    /// Items left queued for a later pass.
    pub retried: usize,
    /// Items dropped after exhausting the retry ceiling.
    pub failed: Vec<QueueItem>,
}

impl ProcessReport {
    /// Whether any item was dropped after exhausting its retries.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Durable FIFO of pending registrations.
pub struct RegistrationQueue {
    remote: Arc<dyn RemoteStore>,
    local: Arc<dyn LocalStore>,
    cache: Arc<LocalCache>,
    events: EventBus,
    signals: Signals,
    operator: Arc<dyn OperatorProvider>,
    config: QueueConfig,
    items: Mutex<VecDeque<QueueItem>>,
    processing: AtomicBool,
    running: AtomicBool,
    drain_notify: Notify,
}

/// Clears the processing flag on every exit path of a drain.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RegistrationQueue {
    /// Creates a queue, restoring any items persisted by a previous run.
    ///
    /// Items that were mid-write when the process died come back as
    /// pending; the per-attempt duplicate re-check decides whether their
    /// write actually landed.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        local: Arc<dyn LocalStore>,
        cache: Arc<LocalCache>,
        events: EventBus,
        signals: Signals,
        operator: Arc<dyn OperatorProvider>,
        config: QueueConfig,
    ) -> SyncResult<Self> {
        let mut restored: VecDeque<QueueItem> = match local
            .load(QUEUE_STORAGE_KEY)
            .map_err(|e| SyncError::Storage(e.to_string()))?
        {
            Some(blob) => serde_json::from_slice(&blob)?,
            None => VecDeque::new(),
        };
        for item in &mut restored {
            if item.status == QueueItemStatus::Processing {
                item.status = QueueItemStatus::Pending;
            }
        }
        if !restored.is_empty() {
            info!("restored {} queued registrations", restored.len());
        }
        Ok(Self {
            remote,
            local,
            cache,
            events,
            signals,
            operator,
            config,
            items: Mutex::new(restored),
            processing: AtomicBool::new(false),
            running: AtomicBool::new(false),
            drain_notify: Notify::new(),
        })
    }

    /// Validates and appends a draft.
    ///
    /// Rejects with [`SyncError::Duplicate`] when the national id matches
    /// a queued item or (best effort, network permitting) an existing
    /// remote record. An unreachable remote check never blocks admission;
    /// the per-attempt re-check during draining is the authoritative one.
    pub async fn enqueue(&self, draft: RegistrationDraft) -> SyncResult<QueueItem> {
        let centers = self.center_map();
        let draft = validate(&draft, centers.as_ref())?.into_inner();

        if self.is_queued(&draft.national_id) {
            return Err(SyncError::Duplicate {
                national_id: draft.national_id,
            });
        }

        if self.signals.online.get() {
            match bounded(
                self.config.remote_timeout,
                self.remote
                    .query(collections::VOTERS, "national_id", &json!(draft.national_id)),
            )
            .await
            {
                Ok(existing) if !existing.is_empty() => {
                    return Err(SyncError::Duplicate {
                        national_id: draft.national_id,
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        "remote duplicate check unreachable, admitting {}: {e}",
                        draft.national_id
                    );
                }
            }
        }

        let item = QueueItem::new(draft);
        {
            let mut items = self.items.lock().unwrap();
            // Re-check under the lock: a concurrent enqueue of the same id
            // may have landed while we were querying the remote store.
            if items
                .iter()
                .any(|i| i.draft.national_id == item.draft.national_id)
            {
                return Err(SyncError::Duplicate {
                    national_id: item.draft.national_id.clone(),
                });
            }
            items.push_back(item.clone());
        }
        self.persist_items()?;
        info!("queued registration {}", item.draft.national_id);

        if self.signals.online.get() {
            self.drain_notify.notify_one();
        }
        Ok(item)
    }

    /// Drains the queue to the remote store.
    ///
    /// No-op when offline, already processing, or empty. Each eligible
    /// item gets exactly one attempt per pass; retryable failures stay
    /// queued for the next one. A short pause separates batches.
    pub async fn process_queue(&self) -> SyncResult<ProcessReport> {
        let mut report = ProcessReport::default();
        if !self.signals.online.get() {
            debug!("skipping drain: offline");
            return Ok(report);
        }
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("skipping drain: already processing");
            return Ok(report);
        }
        let _guard = ProcessingGuard(&self.processing);

        // One attempt per item per pass: snapshot the eligible ids now so
        // items marked retry below are not immediately re-attempted.
        let eligible: Vec<QueueItemId> = {
            let items = self.items.lock().unwrap();
            items
                .iter()
                .filter(|i| i.is_eligible())
                .map(|i| i.id)
                .collect()
        };
        if eligible.is_empty() {
            return Ok(report);
        }
        info!("draining {} queued registrations", eligible.len());

        // chunks() panics on zero; a misconfigured batch size means one.
        let mut batches = eligible.chunks(self.config.batch_size.max(1)).peekable();
        while let Some(batch) = batches.next() {
            if !self.signals.online.get() {
                debug!("network lost mid-drain, stopping");
                break;
            }
            for id in batch {
                self.process_item(*id, &mut report).await;
            }
            self.persist_items()?;
            if batches.peek().is_some() {
                tokio::time::sleep(self.config.batch_pause).await;
            }
        }

        // A mid-drain abort can leave the current batch marked processing.
        {
            let mut items = self.items.lock().unwrap();
            for item in items.iter_mut() {
                if item.status == QueueItemStatus::Processing {
                    item.status = QueueItemStatus::Pending;
                }
            }
        }
        self.persist_items()?;

        info!(
            "drain finished: {} committed, {} retried, {} duplicates, {} failed",
            report.committed,
            report.retried,
            report.duplicates,
            report.failed.len()
        );
        Ok(report)
    }

    async fn process_item(&self, id: QueueItemId, report: &mut ProcessReport) {
        let item = {
            let mut items = self.items.lock().unwrap();
            let Some(item) = items.iter_mut().find(|i| i.id == id) else {
                return;
            };
            item.status = QueueItemStatus::Processing;
            item.clone()
        };
        report.processed += 1;
        let national_id = item.draft.national_id.clone();

        // Re-check against the authoritative store: another operator's
        // write (or our own pre-crash attempt) may have landed since.
        match bounded(
            self.config.remote_timeout,
            self.remote
                .query(collections::VOTERS, "national_id", &json!(national_id)),
        )
        .await
        {
            Ok(existing) if !existing.is_empty() => {
                warn!("dropping queued registration: {national_id} already committed remotely");
                self.remove_item(id);
                report.duplicates += 1;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                // The write below will hit the same outage and be retried.
                debug!("duplicate re-check unreachable for {national_id}: {e}");
            }
        }

        let record = VoterRecord::from_draft(item.draft.clone(), self.operator.current_operator());
        let write = async {
            let body = serde_json::to_value(&record)?;
            bounded(
                self.config.remote_timeout,
                self.remote.add(collections::VOTERS, body),
            )
            .await
        };

        match write.await {
            Ok(_) => {
                info!("registration {national_id} committed");
                self.remove_item(id);
                report.committed += 1;
                self.events
                    .publish(ChangeEvent::RegistrationCommitted { national_id });
            }
            Err(e) => {
                let mut items = self.items.lock().unwrap();
                let Some(it) = items.iter_mut().find(|i| i.id == id) else {
                    return;
                };
                if e.is_transient() {
                    it.record_failure(e.to_string(), self.config.max_retries);
                } else {
                    it.record_permanent_failure(e.to_string());
                }
                if it.status == QueueItemStatus::Failed {
                    warn!(
                        "registration {national_id} dropped after {} attempts: {e}",
                        it.attempts
                    );
                    report.failed.push(it.clone());
                    items.retain(|i| i.id != id);
                } else {
                    debug!(
                        "registration {national_id} will retry (attempt {} of {}): {e}",
                        it.attempts, self.config.max_retries
                    );
                    report.retried += 1;
                }
            }
        }
    }

    /// Returns current queue counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let items = self.items.lock().unwrap();
        QueueStats {
            total: items.len(),
            pending: items
                .iter()
                .filter(|i| i.status == QueueItemStatus::Pending)
                .count(),
            retry: items
                .iter()
                .filter(|i| i.status == QueueItemStatus::Retry)
                .count(),
            is_online: self.signals.online.get(),
            is_processing: self.processing.load(Ordering::SeqCst),
        }
    }

    /// Whether a drain is currently in flight.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Starts the drain loop: drains on online transitions, on enqueue
    /// nudges, and on a fixed interval while online and idle.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let queue = self;
        tokio::spawn(async move {
            let mut online_rx = queue.signals.online.watch();
            let mut tick = tokio::time::interval(queue.config.drain_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            while queue.running.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = tick.tick() => {
                        queue.drain_and_log().await;
                    }
                    _ = queue.drain_notify.notified() => {
                        queue.drain_and_log().await;
                    }
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *online_rx.borrow_and_update() {
                            info!("network online, draining registration queue");
                            queue.drain_and_log().await;
                        }
                    }
                }
            }
            debug!("registration queue loop stopped");
        })
    }

    /// Stops the drain loop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.drain_notify.notify_one();
    }

    async fn drain_and_log(&self) {
        if let Err(e) = self.process_queue().await {
            warn!("queue drain failed: {e}");
        }
    }

    fn is_queued(&self, national_id: &str) -> bool {
        self.items
            .lock()
            .unwrap()
            .iter()
            .any(|i| i.draft.national_id == national_id)
    }

    fn remove_item(&self, id: QueueItemId) {
        self.items.lock().unwrap().retain(|i| i.id != id);
    }

    fn persist_items(&self) -> SyncResult<()> {
        let blob = {
            let items = self.items.lock().unwrap();
            serde_json::to_vec(&*items)?
        };
        self.local
            .persist(QUEUE_STORAGE_KEY, &blob)
            .map_err(|e| SyncError::Storage(e.to_string()))
    }

    /// The configuration mapping used for referential validation: the
    /// synced cache entry when fresh, otherwise the last persisted
    /// snapshot, otherwise nothing (shape rules still apply).
    fn center_map(&self) -> Option<CenterMap> {
        if let Some(value) = self.cache.get(collections::CENTER_CONFIG) {
            return serde_json::from_value(value).ok();
        }
        match self
            .local
            .load(&collections::snapshot_key(collections::CENTER_CONFIG))
        {
            Ok(Some(blob)) => serde_json::from_slice(&blob).ok(),
            _ => None,
        }
    }
}
