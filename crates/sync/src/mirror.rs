/// Local mirror of a shared document, plus the durable fallback store
/// behind it. The fallback is only a safety net for offline or denied
/// sessions; while the remote store is reachable it is never the source
/// of truth. Corrupt fallback data is treated as absence, never an error.
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Synchronous string key/value store (the localStorage analog)
pub trait FallbackStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-memory fallback store for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryFallback {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryFallback {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FallbackStore for MemoryFallback {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.map.lock().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.map.lock().remove(key);
    }
}

/// Fallback store keeping one JSON file per key under a directory.
/// Write failures are logged, not raised.
pub struct DirFallback {
    dir: PathBuf,
}

impl DirFallback {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn file_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl FallbackStore for DirFallback {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.file_for(key)).ok()
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(err) = fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), %err, "could not create fallback dir");
            return;
        }
        if let Err(err) = fs::write(self.file_for(key), value) {
            warn!(key, %err, "could not persist fallback");
        }
    }

    fn remove(&self, key: &str) {
        let _ = fs::remove_file(self.file_for(key));
    }
}

/// In-memory last-known-good copy of a shared document, paired with its
/// durable fallback entry
pub struct LocalMirror<T> {
    payload: RwLock<T>,
    fallback: Arc<dyn FallbackStore>,
    key: String,
}

impl<T> LocalMirror<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    pub fn new(fallback: Arc<dyn FallbackStore>, key: impl Into<String>, initial: T) -> Self {
        Self {
            payload: RwLock::new(initial),
            fallback,
            key: key.into(),
        }
    }

    pub fn get(&self) -> T {
        self.payload.read().clone()
    }

    pub fn set(&self, payload: T) {
        *self.payload.write() = payload;
    }

    /// Load the fallback copy into the mirror. Missing or unparseable data
    /// yields `default`; corruption never propagates past this boundary.
    pub fn load_fallback(&self, default: T) -> T {
        let value = match self.fallback.get(&self.key) {
            Some(raw) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => value,
                Err(err) => {
                    warn!(key = %self.key, %err, "fallback data corrupt, using default");
                    default
                }
            },
            None => default,
        };

        self.set(value.clone());
        value
    }

    /// Write the current payload to the fallback store. Failures are
    /// logged by the store, never raised.
    pub fn persist_fallback(&self) {
        let payload = self.payload.read();
        match serde_json::to_string(&*payload) {
            Ok(raw) => self.fallback.set(&self.key, &raw),
            Err(err) => warn!(key = %self.key, %err, "could not serialize fallback"),
        }
    }

    pub fn fallback_key(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Checklist {
        items: Vec<String>,
    }

    fn empty() -> Checklist {
        Checklist { items: Vec::new() }
    }

    #[test]
    fn test_round_trip() {
        let fallback: Arc<dyn FallbackStore> = Arc::new(MemoryFallback::new());
        let mirror = LocalMirror::new(fallback.clone(), "packingList", empty());

        mirror.set(Checklist {
            items: vec!["Pasaporte".to_string()],
        });
        mirror.persist_fallback();

        let other = LocalMirror::new(fallback, "packingList", empty());
        let loaded = other.load_fallback(empty());
        assert_eq!(loaded.items, vec!["Pasaporte"]);
    }

    #[test]
    fn test_corrupt_fallback_yields_default() {
        let fallback: Arc<dyn FallbackStore> = Arc::new(MemoryFallback::new());
        fallback.set("packingList", "{this is not json");

        let mirror = LocalMirror::new(fallback, "packingList", empty());
        let loaded = mirror.load_fallback(empty());
        assert_eq!(loaded, empty());
    }

    #[test]
    fn test_missing_fallback_yields_default() {
        let fallback: Arc<dyn FallbackStore> = Arc::new(MemoryFallback::new());
        let mirror = LocalMirror::new(fallback, "nope", empty());
        assert_eq!(mirror.load_fallback(empty()), empty());
    }

    #[test]
    fn test_dir_fallback_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let fallback: Arc<dyn FallbackStore> = Arc::new(DirFallback::new(dir.path()));

        let mirror = LocalMirror::new(fallback.clone(), "favorites", empty());
        mirror.set(Checklist {
            items: vec!["tokyo-sensoji".to_string()],
        });
        mirror.persist_fallback();

        let reloaded = LocalMirror::new(fallback.clone(), "favorites", empty());
        assert_eq!(
            reloaded.load_fallback(empty()).items,
            vec!["tokyo-sensoji"]
        );

        fallback.remove("favorites");
        assert_eq!(reloaded.load_fallback(empty()), empty());
    }
}
