//! Offline-tolerant synchronization core for FieldReg.
//!
//! Keeps a local view of voter records consistent with a remote
//! authoritative store under intermittent connectivity, multiple
//! operators, and partial failures.
//!
//! # Components
//!
//! - **Validator**: pure shape/range checks on registration drafts
//! - **LocalCache**: bounded TTL cache of synced collections
//! - **RegistrationQueue**: durable FIFO of pending registrations,
//!   drained in batches with retry and duplicate suppression
//! - **SyncManager**: per-collection snapshot subscriptions with
//!   reconnect/backoff, cache maintenance and typed change events
//! - **HealthSupervisor**: periodic probes with bounded auto-restart
//!
//! The three long-running components are independent tasks; a stalled
//! sync reconnect never blocks a queue drain and vice versa. All shared
//! state is owned by exactly one component and read through accessors.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fieldreg_store::{MemoryLocalStore, MemoryRemoteStore};
//! use fieldreg_sync::{
//!     EventBus, FixedOperator, LocalCache, QueueConfig, RegistrationQueue, Signals, SyncConfig,
//! };
//! use fieldreg_types::OperatorId;
//!
//! let remote = Arc::new(MemoryRemoteStore::new());
//! let local = Arc::new(MemoryLocalStore::new());
//! let sync_config = SyncConfig::default();
//! let cache = Arc::new(LocalCache::new(sync_config.cache_ttl, sync_config.cache_capacity));
//! let events = EventBus::new(64);
//! let signals = Signals::new(true);
//! let operator = Arc::new(FixedOperator::new(OperatorId::new()));
//!
//! let queue = RegistrationQueue::new(
//!     remote,
//!     local,
//!     cache,
//!     events,
//!     signals,
//!     operator,
//!     QueueConfig::default(),
//! )
//! .unwrap();
//! ```

mod cache;
mod config;
mod error;
mod events;
mod health;
mod queue;
mod signals;
mod sync_manager;
pub mod validator;

pub use cache::LocalCache;
pub use config::{HealthConfig, QueueConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use events::{ChangeEvent, ChangeSource, CollectionUpdate, EventBus};
pub use health::{HealthSupervisor, ServiceHealth, ServiceName, ServiceStatus};
pub use queue::{ProcessReport, QueueStats, RegistrationQueue, QUEUE_STORAGE_KEY};
pub use signals::{FixedOperator, OperatorProvider, Signal, Signals};
pub use sync_manager::{
    CollectionState, CollectionStatus, Debouncer, SyncManager, SyncMetrics, SyncStatus,
};
pub use validator::{ValidDraft, ValidationError, validate};

/// Names of the remote collections the core tracks. Cache keys and
/// persisted snapshot keys are derived from these 1:1.
pub mod collections {
    /// Voting-center → communities configuration mapping.
    pub const CENTER_CONFIG: &str = "center_config";
    /// Community list.
    pub const COMMUNITIES: &str = "communities";
    /// Voter records.
    pub const VOTERS: &str = "voters";

    /// All tracked collections.
    pub const TRACKED: [&str; 3] = [CENTER_CONFIG, COMMUNITIES, VOTERS];

    /// Key under which a collection's last good snapshot is persisted.
    pub fn snapshot_key(collection: &str) -> String {
        format!("snapshot:{collection}")
    }
}
