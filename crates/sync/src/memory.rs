/// In-process implementation of the document store.
/// Backs the sync server and tests: documents live in a concurrent map,
/// every write bumps a revision and fans the full snapshot out to all
/// subscribers of the path (the writer included). Timestamps and insertion
/// order are assigned here, never taken from clients.
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use trip::UserId;

use crate::{
    DocWatch, DocumentSnapshot, DocumentStore, Filter, Order, QuerySpec, QueryWatch, StoreError,
    WatchGuard, WriteMeta,
};

const CHANNEL_CAPACITY: usize = 64;

struct StoredDoc {
    payload: Value,
    revision: u64,
    /// Server-side insertion sequence, the authority for stream ordering
    seq: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    updated_by: Option<UserId>,
}

struct DocChannel {
    tx: broadcast::Sender<DocumentSnapshot>,
    active: Arc<AtomicUsize>,
}

struct QueryChannel {
    spec: QuerySpec,
    tx: broadcast::Sender<Vec<DocumentSnapshot>>,
    active: Arc<AtomicUsize>,
}

pub struct MemoryStore {
    docs: DashMap<String, StoredDoc>,
    doc_channels: DashMap<String, DocChannel>,
    query_channels: DashMap<String, Vec<QueryChannel>>,
    denied_prefixes: RwLock<Vec<String>>,
    next_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            docs: DashMap::new(),
            doc_channels: DashMap::new(),
            query_channels: DashMap::new(),
            denied_prefixes: RwLock::new(Vec::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Deny access to every path under `prefix`. Lets tests and the server
    /// exercise permission-denied behavior.
    pub fn deny_prefix(&self, prefix: impl Into<String>) {
        self.denied_prefixes.write().push(prefix.into());
    }

    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    /// Live subscriber count for a document path
    pub fn active_watchers(&self, path: &str) -> usize {
        self.doc_channels
            .get(path)
            .map(|c| c.active.load(AtomicOrdering::SeqCst))
            .unwrap_or(0)
    }

    fn check_access(&self, path: &str) -> Result<(), StoreError> {
        let denied = self.denied_prefixes.read();
        if denied.iter().any(|p| path.starts_with(p.as_str())) {
            return Err(StoreError::PermissionDenied(path.to_string()));
        }
        Ok(())
    }

    fn snapshot_of(&self, path: &str) -> DocumentSnapshot {
        match self.docs.get(path) {
            Some(doc) => DocumentSnapshot {
                path: path.to_string(),
                exists: true,
                payload: doc.payload.clone(),
                revision: doc.revision,
                created_at: Some(doc.created_at),
                updated_at: Some(doc.updated_at),
                updated_by: doc.updated_by,
            },
            None => DocumentSnapshot::missing(path),
        }
    }

    fn parent_collection(path: &str) -> Option<&str> {
        path.rsplit_once('/').map(|(collection, _)| collection)
    }

    /// Fan the current state of `path` out to document subscribers and
    /// re-run any query subscriptions on its collection.
    fn publish(&self, path: &str) {
        let snapshot = self.snapshot_of(path);
        if let Some(channel) = self.doc_channels.get(path) {
            if channel.active.load(AtomicOrdering::SeqCst) > 0 {
                let _ = channel.tx.send(snapshot);
            }
        }

        if let Some(collection) = Self::parent_collection(path) {
            if let Some(mut channels) = self.query_channels.get_mut(collection) {
                channels.retain(|c| c.active.load(AtomicOrdering::SeqCst) > 0);
                for channel in channels.iter() {
                    let docs = self.run_query(&channel.spec);
                    let _ = channel.tx.send(docs);
                }
            }
        }
    }

    fn matches(filter: &Filter, payload: &Value) -> bool {
        match filter {
            Filter::Eq { field, value } => payload.get(field) == Some(value),
            Filter::ArrayContains { field, value } => payload
                .get(field)
                .and_then(Value::as_array)
                .map(|items| items.contains(value))
                .unwrap_or(false),
        }
    }

    fn run_query(&self, spec: &QuerySpec) -> Vec<DocumentSnapshot> {
        let prefix = format!("{}/", spec.collection);

        let mut rows: Vec<(u64, DocumentSnapshot)> = self
            .docs
            .iter()
            .filter(|entry| {
                let rest = match entry.key().strip_prefix(&prefix) {
                    Some(rest) => rest,
                    None => return false,
                };
                // Direct children only, not nested sub-collections
                if rest.contains('/') {
                    return false;
                }
                spec.filter
                    .as_ref()
                    .map(|f| Self::matches(f, &entry.value().payload))
                    .unwrap_or(true)
            })
            .map(|entry| {
                let doc = entry.value();
                (
                    doc.seq,
                    DocumentSnapshot {
                        path: entry.key().clone(),
                        exists: true,
                        payload: doc.payload.clone(),
                        revision: doc.revision,
                        created_at: Some(doc.created_at),
                        updated_at: Some(doc.updated_at),
                        updated_by: doc.updated_by,
                    },
                )
            })
            .collect();

        rows.sort_by_key(|(seq, _)| *seq);
        if spec.order == Order::CreatedDesc {
            rows.reverse();
        }
        if let Some(limit) = spec.limit {
            rows.truncate(limit);
        }

        rows.into_iter().map(|(_, snap)| snap).collect()
    }

    fn write(
        &self,
        path: &str,
        payload: Value,
        meta: WriteMeta,
        must_exist: bool,
    ) -> Result<u64, StoreError> {
        self.check_access(path)?;

        let now = Utc::now();
        let revision;
        {
            let mut entry = match self.docs.entry(path.to_string()) {
                Entry::Occupied(entry) => entry,
                Entry::Vacant(vacant) => {
                    if must_exist {
                        return Err(StoreError::NotFound(path.to_string()));
                    }
                    if let Some(expected) = meta.expected_revision {
                        if expected != 0 {
                            return Err(StoreError::Conflict {
                                expected,
                                actual: 0,
                            });
                        }
                    }
                    let seq = self.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
                    vacant.insert(StoredDoc {
                        payload,
                        revision: 1,
                        seq,
                        created_at: now,
                        updated_at: now,
                        updated_by: meta.updated_by,
                    });
                    self.publish(path);
                    return Ok(1);
                }
            };

            let doc = entry.get_mut();
            if let Some(expected) = meta.expected_revision {
                if expected != doc.revision {
                    return Err(StoreError::Conflict {
                        expected,
                        actual: doc.revision,
                    });
                }
            }

            if meta.merge {
                merge_shallow(&mut doc.payload, payload);
            } else {
                doc.payload = payload;
            }
            doc.revision += 1;
            doc.updated_at = now;
            doc.updated_by = meta.updated_by;
            revision = doc.revision;
        }

        self.publish(path);
        Ok(revision)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge top-level object fields; non-objects replace wholesale
fn merge_shallow(target: &mut Value, incoming: Value) {
    match (target.as_object_mut(), incoming) {
        (Some(target_map), Value::Object(incoming_map)) => {
            for (key, value) in incoming_map {
                target_map.insert(key, value);
            }
        }
        (_, incoming) => *target = incoming,
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<DocumentSnapshot, StoreError> {
        self.check_access(path)?;
        Ok(self.snapshot_of(path))
    }

    async fn set(&self, path: &str, payload: Value, meta: WriteMeta) -> Result<u64, StoreError> {
        self.write(path, payload, meta, false)
    }

    async fn update(
        &self,
        path: &str,
        payload: Value,
        meta: WriteMeta,
    ) -> Result<u64, StoreError> {
        let meta = WriteMeta {
            merge: true,
            ..meta
        };
        self.write(path, payload, meta, true)
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.check_access(path)?;
        if self.docs.remove(path).is_none() {
            return Err(StoreError::NotFound(path.to_string()));
        }
        self.publish(path);
        Ok(())
    }

    async fn add(
        &self,
        collection: &str,
        payload: Value,
        meta: WriteMeta,
    ) -> Result<DocumentSnapshot, StoreError> {
        self.check_access(collection)?;
        let path = format!("{}/{}", collection, uuid::Uuid::new_v4());
        self.write(&path, payload, meta, false)?;
        debug!(path, "document appended");
        Ok(self.snapshot_of(&path))
    }

    async fn query(&self, spec: &QuerySpec) -> Result<Vec<DocumentSnapshot>, StoreError> {
        self.check_access(&spec.collection)?;
        Ok(self.run_query(spec))
    }

    async fn watch(&self, path: &str) -> Result<DocWatch, StoreError> {
        self.check_access(path)?;

        let channel = self
            .doc_channels
            .entry(path.to_string())
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
                DocChannel {
                    tx,
                    active: Arc::new(AtomicUsize::new(0)),
                }
            });

        let rx = channel.tx.subscribe();
        let active = channel.active.clone();
        active.fetch_add(1, AtomicOrdering::SeqCst);
        drop(channel);

        let guard = WatchGuard::new(move || {
            active.fetch_sub(1, AtomicOrdering::SeqCst);
        });

        Ok(DocWatch {
            initial: self.snapshot_of(path),
            rx,
            guard,
        })
    }

    async fn watch_query(&self, spec: &QuerySpec) -> Result<QueryWatch, StoreError> {
        self.check_access(&spec.collection)?;

        let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
        let active = Arc::new(AtomicUsize::new(1));

        self.query_channels
            .entry(spec.collection.clone())
            .or_default()
            .push(QueryChannel {
                spec: spec.clone(),
                tx,
                active: active.clone(),
            });

        let guard = WatchGuard::new(move || {
            active.fetch_sub(1, AtomicOrdering::SeqCst);
        });

        Ok(QueryWatch {
            initial: self.run_query(spec),
            rx,
            guard,
        })
    }
}
