//! String-keyed storage scopes.
//!
//! Mirrors the two browser scopes the tracker relies on: a session scope that
//! lives as long as one page session, and a persistent scope that survives
//! restarts. Writes are last-write-wins with no locking across processes.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Well-known storage keys.
pub mod keys {
    /// Session identifier (session scope)
    pub const SESSION_ID: &str = "sc_session";
    /// User identifier (persistent scope)
    pub const USER_ID: &str = "sc_user_id";
    /// Latest analytics snapshot (persistent scope)
    pub const ANALYTICS: &str = "sc_analytics";
    /// Membership tier after an upgrade (persistent scope)
    pub const MEMBERSHIP: &str = "sc-membership";
    /// Discount percentage granted with the membership (persistent scope)
    pub const DISCOUNT: &str = "sc-discount";
    /// Captured leads (persistent scope)
    pub const LEADS: &str = "sc-leads";
}

/// Storage errors.
#[derive(Debug)]
pub enum StorageError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::IoError(e) => write!(f, "IO error: {e}"),
            StorageError::ParseError(e) => write!(f, "Parse error: {e}"),
            StorageError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// A string-keyed value store.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Shared handle to a storage scope.
pub type SharedStorage = Arc<dyn Storage>;

/// Read a JSON value stored under `key`.
pub fn load_json<T: DeserializeOwned>(
    storage: &dyn Storage,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match storage.get(key)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StorageError::ParseError(e.to_string())),
        None => Ok(None),
    }
}

/// Overwrite `key` with the JSON encoding of `value`.
pub fn store_json<T: Serialize>(
    storage: &dyn Storage,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let json =
        serde_json::to_string(value).map_err(|e| StorageError::SerializeError(e.to_string()))?;
    storage.set(key, &json)
}

/// In-memory storage; what a session scope is.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStorage {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// JSON-file backed storage. The whole map is rewritten on every change.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| StorageError::IoError(e.to_string()))?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| StorageError::ParseError(e.to_string()))?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::SerializeError(e.to_string()))?;
        std::fs::write(&self.path, content).map_err(|e| StorageError::IoError(e.to_string()))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

/// The pair of scopes a page session uses.
#[derive(Clone)]
pub struct StorageScopes {
    pub session: SharedStorage,
    pub persistent: SharedStorage,
}

impl StorageScopes {
    /// Both scopes in memory.
    pub fn in_memory() -> Self {
        Self {
            session: MemoryStorage::shared(),
            persistent: MemoryStorage::shared(),
        }
    }

    /// A fresh in-memory session scope over a file-backed persistent scope in `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        let persistent = FileStorage::open(data_dir.join(PERSISTENT_FILE))?;
        Ok(Self {
            session: MemoryStorage::shared(),
            persistent: Arc::new(persistent),
        })
    }
}

/// File name of the persistent scope inside the data directory.
pub const PERSISTENT_FILE: &str = "local_storage.json";
