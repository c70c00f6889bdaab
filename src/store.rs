use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};

use fd_lock::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    core::{restrict_file_permissions, unique_time_suffix},
    error::StoreError,
};

/// Persistent string-keyed settings store shared by the poller and the CLI.
///
/// Writes are per key: `put_all` replaces only the keys it names, so two
/// writers touching different keys never clobber each other.
pub(crate) trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn put_all(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Keys starting with `prefix`, used for checkpoint inspection.
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;

    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)?.as_bool()
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key)?.as_i64()
    }

    fn put_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.put_all(vec![(key.to_string(), Value::from(value))])
    }

    fn put_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.put_all(vec![(key.to_string(), Value::from(value))])
    }

    fn put_i64(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.put_all(vec![(key.to_string(), Value::from(value))])
    }
}

/// Volatile store for tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemoryStore {
    entries: Mutex<Map<String, Value>>,
}

#[cfg(test)]
impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn put_all(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError> {
        let mut map = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        map.extend(entries);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        map.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        match self.entries.lock() {
            Ok(map) => map
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// JSON object file store. Every read goes to disk so a daemon sees changes
/// made by a separate CLI invocation at the next cycle start.
///
/// Writes hold an exclusive advisory lock on a sidecar `.lock` file for the
/// whole read-modify-write, so concurrent writers in different processes only
/// race on the keys they both touch.
pub(crate) struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub(crate) fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        restrict_file_permissions(&path);
        let store = Self {
            lock_path: path.with_extension("lock"),
            path,
            write_lock: Mutex::new(()),
        };
        // Move a corrupt file aside now rather than on first write.
        let _ = store.read_map();
        Ok(store)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Map<String, Value> {
        if !self.path.exists() {
            return Map::new();
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) => {
                warn!(path = ?self.path, %error, "failed to read settings file");
                return Map::new();
            }
        };
        if content.trim().is_empty() {
            return Map::new();
        }

        match serde_json::from_str::<Map<String, Value>>(&content) {
            Ok(map) => map,
            Err(error) => {
                let backup_path = self
                    .path
                    .with_extension(format!("corrupt-{}.json", unique_time_suffix()));
                if let Err(rename_error) = fs::rename(&self.path, &backup_path) {
                    warn!(%rename_error, "failed to back up corrupt settings file");
                } else {
                    warn!(backup = ?backup_path, "moved corrupt settings file aside");
                }
                warn!(%error, "settings parse failed, starting fresh");
                Map::new()
            }
        }
    }

    fn update(&self, apply: impl FnOnce(&mut Map<String, Value>)) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        let mut file_lock = RwLock::new(lock_file);
        let _file_guard = file_lock.write()?;

        let mut map = self.read_map();
        apply(&mut map);
        self.persist(&map)
    }

    fn persist(&self, map: &Map<String, Value>) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(map)?;
        let tmp_path = self
            .path
            .with_extension(format!("tmp-{}", unique_time_suffix()));
        fs::write(&tmp_path, content)?;
        restrict_file_permissions(&tmp_path);
        fs::rename(&tmp_path, &self.path)?;
        debug!(path = ?self.path, keys = map.len(), "settings persisted");
        Ok(())
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.read_map().remove(key)
    }

    fn put_all(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError> {
        self.update(|map| map.extend(entries))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|map| {
            map.remove(key);
        })
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.read_map()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }
}
