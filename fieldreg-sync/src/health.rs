//! Health supervision.
//!
//! Periodically probes the registration queue, the sync manager and the
//! remote store, and restarts a failed dependency a bounded number of
//! times. Per service: online → (probe fails) → offline → (auto-restart,
//! bounded) → online, or permanently offline once the restart budget is
//! exhausted, until `force_restart` resets it.

use crate::collections;
use crate::config::HealthConfig;
use crate::error::{SyncError, bounded};
use crate::queue::RegistrationQueue;
use crate::signals::Signals;
use crate::sync_manager::{CollectionState, SyncManager};
use chrono::{DateTime, Utc};
use fieldreg_store::RemoteStore;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// The dependencies the supervisor watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceName {
    Queue,
    Sync,
    Remote,
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceName::Queue => write!(f, "queue"),
            ServiceName::Sync => write!(f, "sync"),
            ServiceName::Remote => write!(f, "remote"),
        }
    }
}

/// Probe verdict for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Online,
    Offline,
    Degraded,
}

/// Health record for one monitored service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceHealth {
    pub service: ServiceName,
    pub status: ServiceStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    /// Automatic restarts since the service last probed healthy.
    pub restarts: u32,
}

impl ServiceHealth {
    fn new(service: ServiceName) -> Self {
        Self {
            service,
            status: ServiceStatus::Online,
            last_check: None,
            consecutive_failures: 0,
            restarts: 0,
        }
    }
}

enum Outcome {
    Healthy,
    Degraded(&'static str),
    Failing(SyncError),
}

/// Watches the queue, the sync manager and the remote store.
pub struct HealthSupervisor {
    queue: Arc<RegistrationQueue>,
    sync: Arc<SyncManager>,
    remote: Arc<dyn RemoteStore>,
    signals: Signals,
    config: HealthConfig,
    services: Arc<Mutex<HashMap<ServiceName, ServiceHealth>>>,
    restart_pending: Arc<Mutex<HashSet<ServiceName>>>,
    /// Whether the queue was mid-drain at the previous probe; two
    /// consecutive probes mid-drain mean the drain is wedged.
    queue_was_processing: AtomicBool,
    running: AtomicBool,
}

impl HealthSupervisor {
    /// Creates a supervisor. All services start optimistically online;
    /// the first probe cycle corrects that.
    #[must_use]
    pub fn new(
        queue: Arc<RegistrationQueue>,
        sync: Arc<SyncManager>,
        remote: Arc<dyn RemoteStore>,
        signals: Signals,
        config: HealthConfig,
    ) -> Self {
        let services = [ServiceName::Queue, ServiceName::Sync, ServiceName::Remote]
            .into_iter()
            .map(|s| (s, ServiceHealth::new(s)))
            .collect();
        Self {
            queue,
            sync,
            remote,
            signals,
            config,
            services: Arc::new(Mutex::new(services)),
            restart_pending: Arc::new(Mutex::new(HashSet::new())),
            queue_was_processing: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    /// Runs one probe cycle over all monitored services.
    ///
    /// While the device itself is offline, the remote store and the sync
    /// streams are expected to be down; they are recorded as degraded
    /// without consuming the restart budget.
    pub async fn probe_cycle(&self) {
        let online = self.signals.online.get();

        let outcome = if !online {
            Outcome::Degraded("device offline")
        } else {
            match bounded(
                self.config.probe_timeout,
                self.remote.get_all(collections::CENTER_CONFIG),
            )
            .await
            {
                Ok(_) => Outcome::Healthy,
                Err(e) => Outcome::Failing(SyncError::ServiceUnavailable(e.to_string())),
            }
        };
        self.record(ServiceName::Remote, outcome);

        let status = self.sync.sync_status();
        let outcome = if !online {
            Outcome::Degraded("device offline")
        } else if status.any_online() {
            Outcome::Healthy
        } else if status
            .collections
            .values()
            .any(|s| s.state == CollectionState::Reconnecting)
        {
            Outcome::Degraded("streams reconnecting")
        } else {
            Outcome::Failing(SyncError::ServiceUnavailable(
                "no live collection stream".into(),
            ))
        };
        self.record(ServiceName::Sync, outcome);

        let processing = self.queue.is_processing();
        let was_processing = self.queue_was_processing.swap(processing, Ordering::SeqCst);
        let outcome = if processing && was_processing {
            Outcome::Degraded("drain running for a full probe interval")
        } else {
            Outcome::Healthy
        };
        self.record(ServiceName::Queue, outcome);
    }

    /// Health records in fixed order (queue, sync, remote).
    #[must_use]
    pub fn service_status(&self) -> Vec<ServiceHealth> {
        let services = self.services.lock().unwrap();
        [ServiceName::Queue, ServiceName::Sync, ServiceName::Remote]
            .iter()
            .filter_map(|s| services.get(s).cloned())
            .collect()
    }

    /// Manually restarts a service, resetting its restart budget.
    ///
    /// A no-op (returning false) while an operator is mid-way through a
    /// registration form, to avoid disrupting the in-flight submission.
    pub fn force_restart(&self, service: ServiceName) -> bool {
        if self.signals.entry_in_progress.get() {
            info!("force restart of {service} ignored: registration entry in progress");
            return false;
        }
        {
            let mut services = self.services.lock().unwrap();
            if let Some(entry) = services.get_mut(&service) {
                entry.restarts = 0;
                entry.consecutive_failures = 0;
            }
        }
        self.schedule_restart_in(service, Duration::ZERO);
        true
    }

    /// Starts the probe loop. Connectivity and visibility transitions
    /// trigger an immediate cycle instead of waiting for the interval.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let supervisor = self;
        tokio::spawn(async move {
            let mut online_rx = supervisor.signals.online.watch();
            let mut visible_rx = supervisor.signals.visible.watch();
            let mut tick = tokio::time::interval(supervisor.config.probe_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            while supervisor.running.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = tick.tick() => {
                        supervisor.probe_cycle().await;
                    }
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        debug!("connectivity changed, probing immediately");
                        supervisor.probe_cycle().await;
                    }
                    changed = visible_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        debug!("visibility changed, probing immediately");
                        supervisor.probe_cycle().await;
                    }
                }
            }
            debug!("health supervisor loop stopped");
        })
    }

    /// Stops the probe loop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn record(&self, service: ServiceName, outcome: Outcome) {
        let mut needs_restart = false;
        {
            let mut services = self.services.lock().unwrap();
            let Some(entry) = services.get_mut(&service) else {
                return;
            };
            entry.last_check = Some(Utc::now());
            match outcome {
                Outcome::Healthy => {
                    if entry.consecutive_failures > 0 {
                        info!("{service} recovered");
                    }
                    entry.status = ServiceStatus::Online;
                    entry.consecutive_failures = 0;
                    entry.restarts = 0;
                }
                Outcome::Degraded(reason) => {
                    debug!("{service} degraded: {reason}");
                    entry.status = ServiceStatus::Degraded;
                }
                Outcome::Failing(reason) => {
                    entry.consecutive_failures += 1;
                    entry.status = ServiceStatus::Offline;
                    warn!(
                        "{service} probe failed ({} consecutive): {reason}",
                        entry.consecutive_failures
                    );
                    needs_restart = true;
                }
            }
        }
        if needs_restart {
            self.schedule_restart_in(service, self.config.restart_delay);
        }
    }

    fn schedule_restart_in(&self, service: ServiceName, delay: Duration) {
        {
            let mut pending = self.restart_pending.lock().unwrap();
            if pending.contains(&service) {
                debug!("{service}: restart already pending");
                return;
            }
            let mut services = self.services.lock().unwrap();
            let Some(entry) = services.get_mut(&service) else {
                return;
            };
            if entry.restarts >= self.config.max_restarts {
                warn!("{service}: restart budget exhausted, manual restart required");
                return;
            }
            entry.restarts += 1;
            pending.insert(service);
        }
        info!("{service}: restart scheduled in {delay:?}");
        let queue = Arc::clone(&self.queue);
        let sync = Arc::clone(&self.sync);
        let pending = Arc::clone(&self.restart_pending);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!("restarting {service}");
            restart_service(service, &queue, &sync).await;
            pending.lock().unwrap().remove(&service);
        });
    }
}

/// Re-invokes the dependency's own start routine. The remote store is
/// external, so "restarting" it means re-establishing our subscriptions.
async fn restart_service(
    service: ServiceName,
    queue: &Arc<RegistrationQueue>,
    sync: &Arc<SyncManager>,
) {
    match service {
        ServiceName::Queue => {
            if let Err(e) = queue.process_queue().await {
                warn!("queue restart drain failed: {e}");
            }
        }
        ServiceName::Sync | ServiceName::Remote => {
            sync.stop_sync();
            Arc::clone(sync).start_full_sync();
        }
    }
}
