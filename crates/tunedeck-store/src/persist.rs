//! Session persistence for the catalog.
//!
//! A small string-keyed store holding JSON blobs.  Writes are fire-and-forget:
//! a failed write is logged and the in-memory state stays authoritative until
//! the next successful save or an explicit reload.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

pub const KEY_CRITERIA: &str = "criteria";
pub const KEY_SONGS: &str = "songs";

pub trait PersistentKv: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Key-value store persisted as a single JSON object in one file.
/// Missing or corrupt files load as empty.
pub struct JsonFileKv {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl JsonFileKv {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn save(&self, entries: &HashMap<String, String>) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("state dir {} not creatable: {}", parent.display(), e);
                return;
            }
        }
        let json = match serde_json::to_string(entries) {
            Ok(json) => json,
            Err(e) => {
                warn!("state not serializable: {}", e);
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, json) {
            warn!("state write to {} failed: {}", self.path.display(), e);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl PersistentKv for JsonFileKv {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.lock();
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.lock();
        entries.remove(key);
        self.save(&entries);
    }
}

/// Ephemeral store for tests and deployments without a writable data dir.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl PersistentKv for MemoryKv {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.lock().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.lock().remove(key);
    }
}
