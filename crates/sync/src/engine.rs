/// Per-document sync runtime: wires the scope resolver, local mirror,
/// sync channel and mutation gateway together for one named document.
/// Features construct one of these per shared document and call `resync`
/// whenever the active trip or the identity changes.
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::{
    ChannelSlot, ConnectionState, DocumentStore, ErrorHandler, FallbackStore, LocalMirror,
    MutationGateway, RenderFn, Result, SafeStore, Scope, ScopeResolver, SnapshotHandler,
    WriteTarget,
};

pub struct DocSync<T> {
    store: Arc<dyn DocumentStore>,
    resolver: ScopeResolver,
    mirror: Arc<LocalMirror<T>>,
    gateway: MutationGateway<T>,
    channel: ChannelSlot,
    connection: ConnectionState,
    default_fn: Arc<dyn Fn() -> T + Send + Sync>,
    render: RenderFn<T>,
    doc_name: String,
}

impl<T> DocSync<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<dyn DocumentStore>,
        fallback: Arc<dyn FallbackStore>,
        resolver: ScopeResolver,
        doc_name: impl Into<String>,
        fallback_key: impl Into<String>,
        default_fn: impl Fn() -> T + Send + Sync + 'static,
        render: RenderFn<T>,
    ) -> Self {
        let default_fn: Arc<dyn Fn() -> T + Send + Sync> = Arc::new(default_fn);
        let mirror = Arc::new(LocalMirror::new(fallback, fallback_key, default_fn()));
        let connection = ConnectionState::new();
        let gateway = MutationGateway::new(
            mirror.clone(),
            SafeStore::new(store.clone()),
            render.clone(),
            connection.clone(),
        );

        Self {
            store,
            resolver,
            mirror,
            gateway,
            channel: ChannelSlot::new(),
            connection,
            default_fn,
            render,
            doc_name: doc_name.into(),
        }
    }

    /// Load the fallback copy, then attach to the current scope.
    pub async fn start(&self) -> Result<()> {
        let initial = self.mirror.load_fallback((self.default_fn)());
        (self.render)(&initial);
        self.resync().await
    }

    /// Re-resolve the scope and re-point the channel and write target.
    /// The previous subscription is torn down before the new one exists.
    pub async fn resync(&self) -> Result<()> {
        let scope = self.resolver.resolve();

        let Some(path) = scope.document_path(&self.doc_name) else {
            // Ephemeral: nothing to sync with, local copy is the world
            self.channel.clear();
            self.gateway.set_target(WriteTarget::LocalOnly);
            return Ok(());
        };

        self.gateway.set_target(WriteTarget::Remote {
            path: path.clone(),
            updated_by: self.resolver.identity().map(|identity| identity.id),
        });

        let on_change: SnapshotHandler = {
            let mirror = self.mirror.clone();
            let render = self.render.clone();
            let connection = self.connection.clone();
            let default_fn = self.default_fn.clone();
            Arc::new(move |snapshot| {
                let value: T = if snapshot.exists {
                    match serde_json::from_value(snapshot.payload.clone()) {
                        Ok(value) => value,
                        Err(err) => {
                            warn!(path = %snapshot.path, %err, "snapshot did not decode");
                            (default_fn)()
                        }
                    }
                } else {
                    (default_fn)()
                };

                mirror.set(value.clone());
                mirror.persist_fallback();
                (render)(&value);
                connection.set_offline(false);
            })
        };

        let on_error: ErrorHandler = {
            let connection = self.connection.clone();
            Arc::new(move |err| {
                warn!(%err, "sync channel error, serving local data");
                connection.set_offline(true);
            })
        };

        match self
            .channel
            .replace_doc(&self.store, &path, on_change, on_error)
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                // Subscription could not be established: keep working from
                // the last known local copy instead of clearing state.
                warn!(path, %err, "could not subscribe, working offline");
                self.connection.set_offline(true);
                let value = self.mirror.load_fallback((self.default_fn)());
                (self.render)(&value);
                Ok(())
            }
        }
    }

    /// Apply a mutation through the gateway
    pub async fn mutate<F>(&self, transform: F) -> Result<()>
    where
        F: FnOnce(&mut T) -> Result<()>,
    {
        self.gateway.mutate(transform).await
    }

    /// Current mirror payload
    pub fn current(&self) -> T {
        self.mirror.get()
    }

    pub fn scope(&self) -> Scope {
        self.resolver.resolve()
    }

    pub fn is_offline(&self) -> bool {
        self.connection.is_offline()
    }

    pub fn has_channel(&self) -> bool {
        self.channel.is_active()
    }

    /// Teardown on feature close or logout
    pub fn stop(&self) {
        self.channel.clear();
    }
}
