/// Collaborative document sync engine.
/// Keeps a shared document consistent between an in-memory mirror, a
/// durable local fallback and a remote multi-writer store, under a
/// latest-snapshot-wins model with optimistic local updates.
use thiserror::Error;

mod scope;
pub use scope::*;

mod store;
pub use store::*;

mod memory;
pub use memory::*;

mod safe;
pub use safe::*;

mod mirror;
pub use mirror::*;

mod channel;
pub use channel::*;

mod gateway;
pub use gateway::*;

mod engine;
pub use engine::*;

mod protocol;
pub use protocol::*;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transient store error: {0}")]
    Transient(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("revision conflict: expected {expected}, found {actual}")]
    Conflict { expected: u64, actual: u64 },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("sync channel error: {0}")]
    Channel(String),
}

impl SyncError {
    /// Transient errors are worth retrying; everything else is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient(_) | SyncError::Timeout(_))
    }
}

impl From<trip::TripError> for SyncError {
    fn from(err: trip::TripError) -> Self {
        SyncError::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
