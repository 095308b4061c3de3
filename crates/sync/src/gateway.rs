/// Mutation gateway: the only write path for a scoped document.
/// Mutations apply to the local mirror first so the UI never waits on the
/// network, then persist remotely. A failed remote write restores the
/// exact pre-mutation payload. When the store is known unreachable, or in
/// ephemeral scope, the local apply is the whole outcome.
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use trip::UserId;

use crate::{LocalMirror, Result, SafeStore, WriteMeta};

/// Presentation hook: a pure function of the current payload
pub type RenderFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Render hook that paints nothing (headless use and tests)
pub fn no_render<T>() -> RenderFn<T> {
    Arc::new(|_payload| {})
}

/// Where mutations go after the local apply
#[derive(Debug, Clone, PartialEq)]
pub enum WriteTarget {
    Remote {
        path: String,
        updated_by: Option<UserId>,
    },
    /// Ephemeral scope: fallback store only, never synced
    LocalOnly,
}

/// Shared reachability flag, flipped by the sync channel
#[derive(Clone, Default)]
pub struct ConnectionState {
    offline: Arc<AtomicBool>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }
}

pub struct MutationGateway<T> {
    mirror: Arc<LocalMirror<T>>,
    safe: SafeStore,
    render: RenderFn<T>,
    target: RwLock<WriteTarget>,
    connection: ConnectionState,
}

impl<T> MutationGateway<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        mirror: Arc<LocalMirror<T>>,
        safe: SafeStore,
        render: RenderFn<T>,
        connection: ConnectionState,
    ) -> Self {
        Self {
            mirror,
            safe,
            render,
            target: RwLock::new(WriteTarget::LocalOnly),
            connection,
        }
    }

    /// Re-pointed on every scope resolution
    pub fn set_target(&self, target: WriteTarget) {
        *self.target.write() = target;
    }

    pub fn target(&self) -> WriteTarget {
        self.target.read().clone()
    }

    /// Apply a mutation: validate, apply optimistically, then persist.
    pub async fn mutate<F>(&self, transform: F) -> Result<()>
    where
        F: FnOnce(&mut T) -> Result<()>,
    {
        let before = self.mirror.get();
        let mut next = before.clone();
        // Validation failures abort before any I/O or mirror change
        transform(&mut next)?;

        self.mirror.set(next.clone());
        (self.render)(&next);
        self.mirror.persist_fallback();

        let (path, updated_by) = match self.target() {
            WriteTarget::LocalOnly => return Ok(()),
            WriteTarget::Remote { path, updated_by } => (path, updated_by),
        };

        if self.connection.is_offline() {
            debug!(path, "store unreachable, keeping change local");
            return Ok(());
        }

        let payload = serde_json::to_value(&next)
            .map_err(|e| crate::SyncError::Serialization(e.to_string()))?;
        let meta = WriteMeta {
            updated_by,
            ..WriteMeta::default()
        };

        match self.safe.set_doc_safe(&path, payload, meta).await {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(path, %err, "remote write failed, reverting");
                self.mirror.set(before.clone());
                (self.render)(&before);
                self.mirror.persist_fallback();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::AtomicUsize;

    use crate::{
        DocWatch, DocumentSnapshot, DocumentStore, FallbackStore, MemoryFallback, MemoryStore,
        QuerySpec, QueryWatch, StoreError, SyncError,
    };

    /// Delegates to a MemoryStore but can be told to reject writes
    struct BreakableStore {
        inner: MemoryStore,
        fail_writes: AtomicBool,
        write_attempts: AtomicUsize,
    }

    impl BreakableStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_writes: AtomicBool::new(false),
                write_attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for BreakableStore {
        async fn get(&self, path: &str) -> std::result::Result<DocumentSnapshot, StoreError> {
            self.inner.get(path).await
        }

        async fn set(
            &self,
            path: &str,
            payload: Value,
            meta: WriteMeta,
        ) -> std::result::Result<u64, StoreError> {
            self.write_attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("injected write failure".into()));
            }
            self.inner.set(path, payload, meta).await
        }

        async fn update(
            &self,
            path: &str,
            payload: Value,
            meta: WriteMeta,
        ) -> std::result::Result<u64, StoreError> {
            self.inner.update(path, payload, meta).await
        }

        async fn delete(&self, path: &str) -> std::result::Result<(), StoreError> {
            self.inner.delete(path).await
        }

        async fn add(
            &self,
            collection: &str,
            payload: Value,
            meta: WriteMeta,
        ) -> std::result::Result<DocumentSnapshot, StoreError> {
            self.inner.add(collection, payload, meta).await
        }

        async fn query(
            &self,
            spec: &QuerySpec,
        ) -> std::result::Result<Vec<DocumentSnapshot>, StoreError> {
            self.inner.query(spec).await
        }

        async fn watch(&self, path: &str) -> std::result::Result<DocWatch, StoreError> {
            self.inner.watch(path).await
        }

        async fn watch_query(
            &self,
            spec: &QuerySpec,
        ) -> std::result::Result<QueryWatch, StoreError> {
            self.inner.watch_query(spec).await
        }
    }

    fn gateway_over(
        store: Arc<BreakableStore>,
        fallback: Arc<dyn FallbackStore>,
    ) -> MutationGateway<trip::PackingList> {
        let mirror = Arc::new(LocalMirror::new(
            fallback,
            "packingList",
            trip::PackingList::default(),
        ));
        let gateway = MutationGateway::new(
            mirror,
            SafeStore::new(store),
            no_render(),
            ConnectionState::new(),
        );
        gateway.set_target(WriteTarget::Remote {
            path: "users/u1/data/packing".into(),
            updated_by: None,
        });
        gateway
    }

    #[tokio::test]
    async fn test_successful_mutation_persists_remotely() {
        let store = Arc::new(BreakableStore::new());
        let gateway = gateway_over(store.clone(), Arc::new(MemoryFallback::new()));

        gateway
            .mutate(|list| {
                list.toggle_item("Documentos", 0)?;
                Ok(())
            })
            .await
            .unwrap();

        let snap = store.get("users/u1/data/packing").await.unwrap();
        assert!(snap.exists);
        let list: trip::PackingList = snap.decode().unwrap();
        assert!(list.find("Pasaporte").unwrap().checked);
    }

    #[tokio::test]
    async fn test_failed_write_reverts_bit_for_bit() {
        let store = Arc::new(BreakableStore::new());
        store.fail_writes.store(true, Ordering::SeqCst);
        let gateway = gateway_over(store.clone(), Arc::new(MemoryFallback::new()));

        let before = gateway.mirror.get();
        let result = gateway
            .mutate(|list| {
                list.toggle_item("Documentos", 0)?;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(SyncError::Transient(_))));
        assert_eq!(gateway.mirror.get(), before);
    }

    #[tokio::test]
    async fn test_validation_error_skips_io() {
        let store = Arc::new(BreakableStore::new());
        let gateway = gateway_over(store.clone(), Arc::new(MemoryFallback::new()));

        let before = gateway.mirror.get();
        let result = gateway
            .mutate(|list| {
                list.add_custom_item("Opcionales", "  ", "📦")?;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(SyncError::Validation(_))));
        assert_eq!(gateway.mirror.get(), before);
        assert_eq!(store.write_attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_offline_mutation_stays_local() {
        let store = Arc::new(BreakableStore::new());
        let fallback: Arc<dyn FallbackStore> = Arc::new(MemoryFallback::new());
        let gateway = gateway_over(store.clone(), fallback.clone());
        gateway.connection.set_offline(true);

        gateway
            .mutate(|list| {
                list.toggle_item("Documentos", 0)?;
                Ok(())
            })
            .await
            .unwrap();

        // No remote attempt was made, but the change survived locally
        assert_eq!(store.write_attempts.load(Ordering::SeqCst), 0);
        assert!(gateway.mirror.get().find("Pasaporte").unwrap().checked);

        let raw = fallback.get("packingList").unwrap();
        let persisted: trip::PackingList = serde_json::from_str(&raw).unwrap();
        assert!(persisted.find("Pasaporte").unwrap().checked);
    }

    #[tokio::test]
    async fn test_local_only_target_never_touches_store() {
        let store = Arc::new(BreakableStore::new());
        let gateway = gateway_over(store.clone(), Arc::new(MemoryFallback::new()));
        gateway.set_target(WriteTarget::LocalOnly);

        gateway
            .mutate(|list| {
                list.toggle_item("Documentos", 0)?;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(store.write_attempts.load(Ordering::SeqCst), 0);
    }
}
