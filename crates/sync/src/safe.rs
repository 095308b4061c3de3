/// Defensive wrappers around the document store.
/// Reads retry with exponential backoff and a per-attempt timeout, then
/// fall back to caller-supplied data; permission denials are never
/// retried. Writes are attempted once; a failed write is surfaced and
/// left to the caller to redo. Updating a missing document transparently
/// becomes a merge-creating set, turning "update a possibly-missing
/// document" into an idempotent upsert.
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::{
    DocumentSnapshot, DocumentStore, QuerySpec, Result, StoreError, SyncError, WriteMeta,
};

/// Retry policy for the read path
#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub max_retries: u32,
    pub attempt_timeout: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of a safe read: `value` is always usable; `error` says why the
/// fallback was used when `fresh` is false.
#[derive(Debug)]
pub struct SafeRead<T> {
    pub value: T,
    pub fresh: bool,
    pub error: Option<SyncError>,
}

impl<T> SafeRead<T> {
    fn fresh(value: T) -> Self {
        Self {
            value,
            fresh: true,
            error: None,
        }
    }

    fn fallback(value: T, error: SyncError) -> Self {
        Self {
            value,
            fresh: false,
            error: Some(error),
        }
    }
}

/// Store handle with the defensive policies applied
#[derive(Clone)]
pub struct SafeStore {
    inner: Arc<dyn DocumentStore>,
    retry: RetryOptions,
}

impl SafeStore {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            retry: RetryOptions::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner
    }

    /// Read a document, retrying transient failures
    pub async fn get_doc_safe(
        &self,
        path: &str,
        fallback: DocumentSnapshot,
    ) -> SafeRead<DocumentSnapshot> {
        let mut last_error = SyncError::Transient("no attempt made".into());

        for attempt in 0..self.retry.max_retries {
            match timeout(self.retry.attempt_timeout, self.inner.get(path)).await {
                Ok(Ok(snapshot)) => return SafeRead::fresh(snapshot),
                Ok(Err(StoreError::PermissionDenied(p))) => {
                    warn!(path = %p, "read denied, not retrying");
                    return SafeRead::fallback(fallback, SyncError::PermissionDenied(p));
                }
                Ok(Err(err)) => {
                    warn!(
                        path,
                        attempt = attempt + 1,
                        max = self.retry.max_retries,
                        %err,
                        "read failed"
                    );
                    last_error = err.into();
                }
                Err(_) => {
                    warn!(path, attempt = attempt + 1, "read timed out");
                    last_error = SyncError::Timeout(self.retry.attempt_timeout);
                }
            }

            if attempt + 1 < self.retry.max_retries {
                sleep(backoff_delay(attempt)).await;
            }
        }

        SafeRead::fallback(fallback, last_error)
    }

    /// Run a collection query, retrying transient failures
    pub async fn query_docs_safe(
        &self,
        spec: &QuerySpec,
        fallback: Vec<DocumentSnapshot>,
    ) -> SafeRead<Vec<DocumentSnapshot>> {
        let mut last_error = SyncError::Transient("no attempt made".into());

        for attempt in 0..self.retry.max_retries {
            match timeout(self.retry.attempt_timeout, self.inner.query(spec)).await {
                Ok(Ok(docs)) => return SafeRead::fresh(docs),
                Ok(Err(StoreError::PermissionDenied(p))) => {
                    warn!(collection = %spec.collection, "query denied, not retrying");
                    return SafeRead::fallback(fallback, SyncError::PermissionDenied(p));
                }
                Ok(Err(err)) => {
                    warn!(
                        collection = %spec.collection,
                        attempt = attempt + 1,
                        %err,
                        "query failed"
                    );
                    last_error = err.into();
                }
                Err(_) => {
                    warn!(collection = %spec.collection, attempt = attempt + 1, "query timed out");
                    last_error = SyncError::Timeout(self.retry.attempt_timeout);
                }
            }

            if attempt + 1 < self.retry.max_retries {
                sleep(backoff_delay(attempt)).await;
            }
        }

        SafeRead::fallback(fallback, last_error)
    }

    /// Create or overwrite a document (single attempt)
    pub async fn set_doc_safe(&self, path: &str, payload: Value, meta: WriteMeta) -> Result<u64> {
        self.inner.set(path, payload, meta).await.map_err(|err| {
            warn!(path, %err, "set failed");
            err.into()
        })
    }

    /// Merge into a document; if it does not exist yet, create it instead
    /// of failing. Calling this twice with the same payload against a
    /// missing document leaves the same final state as calling it once.
    pub async fn update_doc_safe(
        &self,
        path: &str,
        payload: Value,
        meta: WriteMeta,
    ) -> Result<u64> {
        match self.inner.update(path, payload.clone(), meta.clone()).await {
            Ok(revision) => Ok(revision),
            Err(StoreError::NotFound(_)) => {
                debug!(path, "document missing, creating it");
                self.inner
                    .set(path, payload, meta.merging())
                    .await
                    .map_err(|err| {
                        warn!(path, %err, "upsert fallback failed");
                        err.into()
                    })
            }
            Err(err) => {
                warn!(path, %err, "update failed");
                Err(err.into())
            }
        }
    }

    pub async fn delete_doc_safe(&self, path: &str) -> Result<()> {
        self.inner.delete(path).await.map_err(|err| {
            warn!(path, %err, "delete failed");
            err.into()
        })
    }

    /// Append to a collection (single attempt)
    pub async fn add_doc_safe(
        &self,
        collection: &str,
        payload: Value,
        meta: WriteMeta,
    ) -> Result<DocumentSnapshot> {
        self.inner.add(collection, payload, meta).await.map_err(|err| {
            warn!(collection, %err, "append failed");
            err.into()
        })
    }

    /// Cheap probe: can the caller read this path at all?
    pub async fn check_access(&self, path: &str) -> bool {
        let probe = self
            .clone()
            .with_retry(RetryOptions {
                max_retries: 1,
                ..self.retry.clone()
            })
            .get_doc_safe(path, DocumentSnapshot::missing(path))
            .await;

        !matches!(probe.error, Some(SyncError::PermissionDenied(_)))
    }
}

/// 1s, 2s, 4s, ...
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.min(6))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::{DocWatch, MemoryStore, QueryWatch};

    /// Store whose reads always fail with a chosen error, counting attempts
    struct FailingReads {
        error: fn(String) -> StoreError,
        attempts: AtomicU32,
    }

    impl FailingReads {
        fn new(error: fn(String) -> StoreError) -> Self {
            Self {
                error,
                attempts: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for FailingReads {
        async fn get(&self, path: &str) -> std::result::Result<DocumentSnapshot, StoreError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err((self.error)(path.to_string()))
        }

        async fn set(
            &self,
            _path: &str,
            _payload: Value,
            _meta: WriteMeta,
        ) -> std::result::Result<u64, StoreError> {
            unimplemented!("read-only test store")
        }

        async fn update(
            &self,
            _path: &str,
            _payload: Value,
            _meta: WriteMeta,
        ) -> std::result::Result<u64, StoreError> {
            unimplemented!("read-only test store")
        }

        async fn delete(&self, _path: &str) -> std::result::Result<(), StoreError> {
            unimplemented!("read-only test store")
        }

        async fn add(
            &self,
            _collection: &str,
            _payload: Value,
            _meta: WriteMeta,
        ) -> std::result::Result<DocumentSnapshot, StoreError> {
            unimplemented!("read-only test store")
        }

        async fn query(
            &self,
            spec: &QuerySpec,
        ) -> std::result::Result<Vec<DocumentSnapshot>, StoreError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err((self.error)(spec.collection.clone()))
        }

        async fn watch(&self, _path: &str) -> std::result::Result<DocWatch, StoreError> {
            unimplemented!("read-only test store")
        }

        async fn watch_query(
            &self,
            _spec: &QuerySpec,
        ) -> std::result::Result<QueryWatch, StoreError> {
            unimplemented!("read-only test store")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_read_retries_to_the_bound() {
        let inner = Arc::new(FailingReads::new(StoreError::Unavailable));
        let safe = SafeStore::new(inner.clone());

        let fallback = DocumentSnapshot::missing("users/u1/data/packing");
        let read = safe.get_doc_safe("users/u1/data/packing", fallback).await;

        assert!(!read.fresh);
        assert!(matches!(read.error, Some(SyncError::Transient(_))));
        assert_eq!(inner.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_read_attempted_once() {
        let inner = Arc::new(FailingReads::new(StoreError::PermissionDenied));
        let safe = SafeStore::new(inner.clone());

        let fallback = DocumentSnapshot::missing("trips/t1/data/packing");
        let read = safe.get_doc_safe("trips/t1/data/packing", fallback).await;

        assert!(!read.fresh);
        assert!(matches!(read.error, Some(SyncError::PermissionDenied(_))));
        assert_eq!(inner.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_retry_bound() {
        let inner = Arc::new(FailingReads::new(StoreError::Unavailable));
        let safe = SafeStore::new(inner.clone());

        let spec = QuerySpec::collection("trips/t1/chat");
        let read = safe.query_docs_safe(&spec, Vec::new()).await;

        assert!(!read.fresh);
        assert!(read.value.is_empty());
        assert_eq!(inner.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_upsert_on_missing_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let safe = SafeStore::new(store.clone());
        let path = "users/u1/data/packing";
        let payload = serde_json::json!({"items": ["Pasaporte"]});

        safe.update_doc_safe(path, payload.clone(), WriteMeta::default())
            .await
            .unwrap();
        safe.update_doc_safe(path, payload.clone(), WriteMeta::default())
            .await
            .unwrap();

        let snap = store.get(path).await.unwrap();
        assert!(snap.exists);
        assert_eq!(snap.payload, payload);
    }

    #[tokio::test]
    async fn test_fresh_read_passes_through() {
        let store = Arc::new(MemoryStore::new());
        store
            .set("users/u1/data/x", serde_json::json!({"v": 1}), WriteMeta::default())
            .await
            .unwrap();

        let safe = SafeStore::new(store);
        let read = safe
            .get_doc_safe("users/u1/data/x", DocumentSnapshot::missing("users/u1/data/x"))
            .await;

        assert!(read.fresh);
        assert!(read.error.is_none());
        assert_eq!(read.value.payload["v"], 1);
    }
}
