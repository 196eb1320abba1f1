//! Tunables for the sync core.
//!
//! Each long-running component takes its own config struct; the defaults
//! carry the operational constants the system runs with in the field.

use std::time::Duration;

/// Configuration for the registration queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Items per drain batch.
    pub batch_size: usize,
    /// Remote write attempts before an item is dropped as failed.
    pub max_retries: u32,
    /// Idle drain interval while online.
    pub drain_interval: Duration,
    /// Pause between batches to avoid saturating the remote store.
    pub batch_pause: Duration,
    /// Time bound on each remote operation.
    pub remote_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_retries: 3,
            drain_interval: Duration::from_secs(30),
            batch_pause: Duration::from_millis(500),
            remote_timeout: Duration::from_secs(10),
        }
    }
}

/// Configuration for the sync manager.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Age beyond which a cache entry is stale.
    pub cache_ttl: Duration,
    /// Maximum cached collections before oldest-first eviction.
    pub cache_capacity: usize,
    /// Reconnect attempts per collection before giving up.
    pub max_reconnect_attempts: u32,
    /// First reconnect delay; doubles per attempt.
    pub reconnect_base: Duration,
    /// Ceiling on the reconnect delay.
    pub reconnect_cap: Duration,
    /// Quiet period for the debounced update helper.
    pub debounce_quiet: Duration,
    /// Time bound on each remote operation.
    pub remote_timeout: Duration,
    /// How often the cache sweep evicts expired entries.
    pub sweep_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 32,
            max_reconnect_attempts: 5,
            reconnect_base: Duration::from_secs(1),
            reconnect_cap: Duration::from_secs(30),
            debounce_quiet: Duration::from_secs(1),
            remote_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Configuration for the health supervisor.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Interval between probe cycles.
    pub probe_interval: Duration,
    /// Delay before a scheduled restart fires.
    pub restart_delay: Duration,
    /// Automatic restarts per service before it is left offline.
    pub max_restarts: u32,
    /// Time bound on each probe.
    pub probe_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(30),
            restart_delay: Duration::from_secs(5),
            max_restarts: 3,
            probe_timeout: Duration::from_secs(5),
        }
    }
}
