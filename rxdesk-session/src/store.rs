//! Session stores - persistence backends for the session mirror
//!
//! The session manager owns the session; a store only mirrors it so that a
//! restarted process can pick it up again.

use rxdesk_core::{
    storage_error, RxdeskResult, SessionStore, StorageBackend, StorageConfig,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Build the store selected by the storage configuration
pub fn build_store(config: &StorageConfig) -> RxdeskResult<Arc<dyn SessionStore>> {
    match config.backend {
        StorageBackend::File => Ok(Arc::new(FileStore::new(config.session_file_path()?)?)),
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Disabled => Ok(Arc::new(NoopStore)),
    }
}

/// JSON object on disk, rewritten on every mutation
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStore {
    /// Create a file store, creating the parent directory if needed
    pub fn new<P: AsRef<Path>>(path: P) -> RxdeskResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                storage_error!(
                    format!("Failed to create session directory {}", parent.display()),
                    "file_store",
                    e
                )
            })?;
        }

        info!("Session store initialized at: {}", path.display());

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> BTreeMap<String, String> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!("Failed to read session file {}: {}", self.path.display(), e);
                return BTreeMap::new();
            }
        };

        match serde_json::from_str(&data) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Ignoring corrupt session file {}: {}",
                    self.path.display(),
                    e
                );
                BTreeMap::new()
            }
        }
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> RxdeskResult<()> {
        if entries.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(storage_error!(
                    format!("Failed to remove session file {}", self.path.display()),
                    "file_store",
                    e
                )),
            };
        }

        let json_data = serde_json::to_string_pretty(entries)?;
        let tmp_path = self.path.with_extension("json.tmp");

        std::fs::write(&tmp_path, json_data).map_err(|e| {
            storage_error!(
                format!("Failed to write session file {}", tmp_path.display()),
                "file_store",
                e
            )
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            storage_error!(
                format!("Failed to replace session file {}", self.path.display()),
                "file_store",
                e
            )
        })?;

        debug!("Saved {} session keys to {}", entries.len(), self.path.display());
        Ok(())
    }

    fn mutate<F>(&self, f: F) -> RxdeskResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut entries = self.read_entries();
        if f(&mut entries) {
            self.write_entries(&entries)?;
        }
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.read_entries().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> RxdeskResult<()> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value.to_string()).as_deref() != Some(value)
        })
    }

    fn remove(&self, key: &str) -> RxdeskResult<()> {
        self.mutate(|entries| entries.remove(key).is_some())
    }
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> RxdeskResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| storage_error!("Memory store lock poisoned", "memory_store"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> RxdeskResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| storage_error!("Memory store lock poisoned", "memory_store"))?;
        entries.remove(key);
        Ok(())
    }
}

/// Store for contexts without persistence; hydration becomes a no-op
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

impl SessionStore for NoopStore {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: &str) -> RxdeskResult<()> {
        Ok(())
    }

    fn remove(&self, _key: &str) -> RxdeskResult<()> {
        Ok(())
    }

    fn is_available(&self) -> bool {
        false
    }
}
