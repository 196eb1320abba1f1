//! Core type definitions for FieldReg.
//!
//! This crate defines the fundamental, UI-agnostic types used throughout
//! the sync core:
//! - Queue item and operator identifiers (UUID v7)
//! - Voter records and registration drafts
//! - Durable queue items
//! - The voting-center → communities configuration mapping
//!
//! Everything UI-facing (forms, charts, exports) lives in the embedding
//! application, not here.

mod centers;
mod ids;
mod queue;
mod record;

pub use centers::CenterMap;
pub use ids::{OperatorId, QueueItemId};
pub use queue::{QueueItem, QueueItemStatus};
pub use record::{RegistrationDraft, Sex, VoterRecord};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("unknown sex code: {0}")]
    UnknownSexCode(String),
}
