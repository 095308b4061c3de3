/// Remote sync channel management.
/// Each feature holds one slot; establishing a subscription for a new
/// scope tears the previous one down first, so exactly one channel is
/// live per (feature, scope) at any time. Forgetting to clear a slot on
/// teardown would leak a listener that keeps re-rendering a dead view.
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{DocumentSnapshot, DocumentStore, QuerySpec, Result, SyncError, WatchGuard};

pub type SnapshotHandler = Arc<dyn Fn(DocumentSnapshot) + Send + Sync>;
pub type QueryHandler = Arc<dyn Fn(Vec<DocumentSnapshot>) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(SyncError) + Send + Sync>;

struct ActiveChannel {
    target: String,
    task: JoinHandle<()>,
    _guard: WatchGuard,
}

impl Drop for ActiveChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Holder of a feature's single live subscription
pub struct ChannelSlot {
    active: Mutex<Option<ActiveChannel>>,
}

impl ChannelSlot {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Path or collection the live channel is bound to
    pub fn active_target(&self) -> Option<String> {
        self.active.lock().as_ref().map(|c| c.target.clone())
    }

    /// Tear down the live channel, if any. Aborting the pump task drops
    /// the receiver and the watch guard unsubscribes.
    pub fn clear(&self) {
        if let Some(old) = self.active.lock().take() {
            debug!(target = %old.target, "sync channel torn down");
        }
    }

    /// Subscribe to a single document, replacing any previous channel.
    /// The initial snapshot is delivered before this returns.
    pub async fn replace_doc(
        &self,
        store: &Arc<dyn DocumentStore>,
        path: &str,
        on_change: SnapshotHandler,
        on_error: ErrorHandler,
    ) -> Result<()> {
        self.clear();

        let watch = store.watch(path).await.map_err(SyncError::from)?;
        on_change(watch.initial);

        let mut rx = watch.rx;
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(snapshot) => on_change(snapshot),
                    Err(RecvError::Lagged(skipped)) => {
                        // Snapshots are full values, so skipping straight
                        // to the latest one loses nothing
                        warn!(skipped, "subscription lagged");
                    }
                    Err(RecvError::Closed) => {
                        on_error(SyncError::Channel("subscription closed".into()));
                        break;
                    }
                }
            }
        });

        *self.active.lock() = Some(ActiveChannel {
            target: path.to_string(),
            task,
            _guard: watch.guard,
        });
        debug!(path, "sync channel established");
        Ok(())
    }

    /// Subscribe to a collection view, replacing any previous channel
    pub async fn replace_query(
        &self,
        store: &Arc<dyn DocumentStore>,
        spec: &QuerySpec,
        on_change: QueryHandler,
        on_error: ErrorHandler,
    ) -> Result<()> {
        self.clear();

        let watch = store.watch_query(spec).await.map_err(SyncError::from)?;
        on_change(watch.initial);

        let mut rx = watch.rx;
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(docs) => on_change(docs),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "query subscription lagged");
                    }
                    Err(RecvError::Closed) => {
                        on_error(SyncError::Channel("subscription closed".into()));
                        break;
                    }
                }
            }
        });

        *self.active.lock() = Some(ActiveChannel {
            target: spec.collection.clone(),
            task,
            _guard: watch.guard,
        });
        debug!(collection = %spec.collection, "query channel established");
        Ok(())
    }
}

impl Default for ChannelSlot {
    fn default() -> Self {
        Self::new()
    }
}
