/// Remote document store abstraction.
/// Documents are loosely-typed JSON values addressed by hierarchical
/// paths (`trips/<id>/data/<doc>`, `trips/<id>/chat/<id>`). The store
/// serializes single-document writes; subscribers receive the full latest
/// snapshot on every change, including the echo of their own writes.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use trip::UserId;

use crate::SyncError;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("revision conflict: expected {expected}, found {actual}")]
    Conflict { expected: u64, actual: u64 },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => SyncError::NotFound(path),
            StoreError::PermissionDenied(path) => SyncError::PermissionDenied(path),
            StoreError::Unavailable(msg) => SyncError::Transient(msg),
            StoreError::Conflict { expected, actual } => SyncError::Conflict { expected, actual },
            StoreError::InvalidPayload(msg) => SyncError::Serialization(msg),
        }
    }
}

/// Full state of one document at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub path: String,
    pub exists: bool,
    pub payload: Value,
    pub revision: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<UserId>,
}

impl DocumentSnapshot {
    /// Snapshot of a document that does not exist (yet)
    pub fn missing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            exists: false,
            payload: Value::Null,
            revision: 0,
            created_at: None,
            updated_at: None,
            updated_by: None,
        }
    }

    /// Last path segment, the document id within its collection
    pub fn doc_id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Decode the payload into a typed document
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| StoreError::InvalidPayload(e.to_string()))
    }
}

/// Metadata attached to a write
#[derive(Debug, Clone, Default)]
pub struct WriteMeta {
    pub updated_by: Option<UserId>,
    /// Shallow-merge into the existing document instead of replacing it
    pub merge: bool,
    /// Compare-and-set: fail with `Conflict` unless the stored revision
    /// matches. Used where concurrent read-modify-write must not silently
    /// lose data (poll votes).
    pub expected_revision: Option<u64>,
}

impl WriteMeta {
    pub fn by(user_id: UserId) -> Self {
        Self {
            updated_by: Some(user_id),
            ..Self::default()
        }
    }

    pub fn merging(mut self) -> Self {
        self.merge = true;
        self
    }

    pub fn expecting(mut self, revision: u64) -> Self {
        self.expected_revision = Some(revision);
        self
    }
}

/// Field filter for collection queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    Eq { field: String, value: Value },
    ArrayContains { field: String, value: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    CreatedDesc,
    CreatedAsc,
}

/// A filtered, ordered view over one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub collection: String,
    pub filter: Option<Filter>,
    pub order: Order,
    pub limit: Option<usize>,
}

impl QuerySpec {
    pub fn collection(path: impl Into<String>) -> Self {
        Self {
            collection: path.into(),
            filter: None,
            order: Order::CreatedDesc,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filter = Some(Filter::Eq {
            field: field.into(),
            value,
        });
        self
    }

    pub fn where_array_contains(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filter = Some(Filter::ArrayContains {
            field: field.into(),
            value,
        });
        self
    }

    pub fn oldest_first(mut self) -> Self {
        self.order = Order::CreatedAsc;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Handle for a live single-document subscription.
/// The initial snapshot is delivered eagerly; every subsequent change
/// arrives on `rx`. Dropping the guard unsubscribes.
pub struct DocWatch {
    pub initial: DocumentSnapshot,
    pub rx: broadcast::Receiver<DocumentSnapshot>,
    pub guard: WatchGuard,
}

/// Handle for a live query subscription
pub struct QueryWatch {
    pub initial: Vec<DocumentSnapshot>,
    pub rx: broadcast::Receiver<Vec<DocumentSnapshot>>,
    pub guard: WatchGuard,
}

/// Unsubscribes on drop
pub struct WatchGuard {
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl WatchGuard {
    pub fn new(on_drop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_drop: Some(Box::new(on_drop)),
        }
    }

    /// Guard that does nothing on drop (for tests and adapters)
    pub fn noop() -> Self {
        Self { on_drop: None }
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

/// The remote multi-writer document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document. A missing document is NOT an error here; the
    /// snapshot comes back with `exists: false`.
    async fn get(&self, path: &str) -> Result<DocumentSnapshot, StoreError>;

    /// Create or fully overwrite a document (merge via `meta.merge`).
    /// Returns the new revision.
    async fn set(&self, path: &str, payload: Value, meta: WriteMeta) -> Result<u64, StoreError>;

    /// Merge fields into an existing document; `NotFound` if it does not
    /// exist. The safe layer upgrades that into a merge-creating set.
    async fn update(&self, path: &str, payload: Value, meta: WriteMeta)
        -> Result<u64, StoreError>;

    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Append a document with a store-assigned id and creation timestamp
    async fn add(
        &self,
        collection: &str,
        payload: Value,
        meta: WriteMeta,
    ) -> Result<DocumentSnapshot, StoreError>;

    async fn query(&self, spec: &QuerySpec) -> Result<Vec<DocumentSnapshot>, StoreError>;

    /// Push subscription to a single document
    async fn watch(&self, path: &str) -> Result<DocWatch, StoreError>;

    /// Push subscription to a collection view
    async fn watch_query(&self, spec: &QuerySpec) -> Result<QueryWatch, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_doc_id() {
        let snap = DocumentSnapshot::missing("trips/t1/chat/m42");
        assert_eq!(snap.doc_id(), "m42");
    }

    #[test]
    fn test_query_spec_builder() {
        let spec = QuerySpec::collection("trips/t1/polls")
            .where_eq("active", Value::Bool(true))
            .limit(20);

        assert_eq!(spec.collection, "trips/t1/polls");
        assert_eq!(spec.order, Order::CreatedDesc);
        assert_eq!(spec.limit, Some(20));
        assert!(matches!(spec.filter, Some(Filter::Eq { .. })));
    }

    #[test]
    fn test_store_error_maps_to_sync_error() {
        let err: SyncError = StoreError::Unavailable("socket closed".into()).into();
        assert!(err.is_retryable());

        let err: SyncError = StoreError::PermissionDenied("trips/t1".into()).into();
        assert!(!err.is_retryable());
    }
}
