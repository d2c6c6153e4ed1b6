//! Durable key-value persistence shared by every participant on the device.
//!
//! Writes go through a [`StorageMedium`], which also notifies the other
//! participants so they can pick up snapshots written elsewhere.

use crate::error::StorageError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

const CHANGE_CAPACITY: usize = 256;

/// Backend for the storage medium.
pub trait KeyValueStore: Send + Sync {
    fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn name(&self) -> &'static str;
}

/// In-process store, optionally with a byte quota over keys and values
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(limit: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota: Some(limit),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::Io("memory store lock poisoned".to_string()))?;

        if let Some(limit) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    limit,
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::Io("memory store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// One JSON file per key under a directory
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| StorageError::Io(format!("{}: {}", dir.display(), e)))?;
        info!("Using state directory {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Percent-encoded key, so distinct keys never share a file
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }
}

impl KeyValueStore for JsonFileStore {
    fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| StorageError::Io(format!("{}: {}", path.display(), e)))
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(format!("{}: {}", path.display(), e))),
        }
    }

    fn name(&self) -> &'static str {
        "json-file"
    }
}

/// A medium that is switched off; every operation fails.
pub struct DisabledStore;

impl KeyValueStore for DisabledStore {
    fn put(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }

    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Notification of a successful write, seen by every other participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    pub new_value: String,
    pub origin: Uuid,
}

/// The storage medium shared by all participants in one deployment
pub struct StorageMedium {
    backend: Box<dyn KeyValueStore>,
    changes: broadcast::Sender<StorageChange>,
}

impl StorageMedium {
    pub fn new(backend: Box<dyn KeyValueStore>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self { backend, changes }
    }

    pub fn put(&self, origin: Uuid, key: &str, value: &str) -> Result<(), StorageError> {
        self.backend.put(key, value)?;
        // No subscribers is fine
        let _ = self.changes.send(StorageChange {
            key: key.to_string(),
            new_value: value.to_string(),
            origin,
        });
        debug!("Stored {} ({} bytes) in {} store", key, value.len(), self.backend.name());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.backend.get(key)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

/// Namespaced view of the medium for one participant.
///
/// Keys are `<prefix><display_id>`; writes are tagged with the participant's
/// origin so its own change notifications can be told apart.
#[derive(Clone)]
pub struct Persistence {
    medium: Arc<StorageMedium>,
    prefix: String,
    origin: Uuid,
}

impl Persistence {
    pub fn new(medium: Arc<StorageMedium>, prefix: impl Into<String>, origin: Uuid) -> Self {
        Self {
            medium,
            prefix: prefix.into(),
            origin,
        }
    }

    pub fn key(&self, display_id: &str) -> String {
        format!("{}{}", self.prefix, display_id)
    }

    pub fn put(&self, display_id: &str, value: &str) -> Result<(), StorageError> {
        self.medium.put(self.origin, &self.key(display_id), value)
    }

    pub fn get(&self, display_id: &str) -> Result<Option<String>, StorageError> {
        self.medium.get(&self.key(display_id))
    }

    pub fn origin(&self) -> Uuid {
        self.origin
    }
}
