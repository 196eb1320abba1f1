//! Storage abstractions for the FieldReg sync core.
//!
//! Two independent capabilities, both consumed by `fieldreg-sync` as
//! injected trait objects:
//!
//! - [`RemoteStore`]: an abstract remote document store (collections of
//!   JSON documents with snapshot subscriptions). The real client is
//!   supplied by the embedding application; [`MemoryRemoteStore`] is the
//!   in-process stand-in used in offline mode and in tests.
//! - [`LocalStore`]: durable key → opaque-blob persistence for queue
//!   durability and cache fallback. [`SqliteLocalStore`] is the production
//!   implementation; [`MemoryLocalStore`] backs tests.

mod error;
mod local;
mod memory;
mod remote;
mod sqlite;

pub use error::{StoreError, StoreResult};
pub use local::{LocalStore, MemoryLocalStore};
pub use memory::MemoryRemoteStore;
pub use remote::{Document, RemoteStore, Snapshot, Subscription};
pub use sqlite::SqliteLocalStore;
