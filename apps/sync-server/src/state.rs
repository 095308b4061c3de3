use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use sync::MemoryStore;

/// Shared server state: the document store plus connection bookkeeping
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            started_at: chrono::Utc::now(),
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn connection_opened(&self) -> usize {
        self.connections.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn connection_closed(&self) -> usize {
        self.connections.fetch_sub(1, Ordering::SeqCst) - 1
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}
