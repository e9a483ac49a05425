//! Persistent key-value store — the local-storage equivalent for the widget
//!
//! Holds two entries: the welcome-bubble flag and the session id. Callers treat
//! every failure as soft (see `widget`), so the trait reports errors instead of
//! hiding them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Key suffix for the "welcome bubbles already shown" flag.
pub const WELCOME_SHOWN_KEY: &str = "welcome-shown";

/// Key suffix for the persisted session id.
pub const SESSION_ID_KEY: &str = "session-id";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt storage file {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// String-to-string store shared by every widget instance of a process.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Drop every entry. This is the only way a session id ever goes away.
    fn clear(&self) -> Result<(), StoreError>;
}

/// Fully qualified key names for one widget deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    pub welcome_shown: String,
    pub session_id: String,
}

impl StoreKeys {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            welcome_shown: format!("{prefix}{WELCOME_SHOWN_KEY}"),
            session_id: format!("{prefix}{SESSION_ID_KEY}"),
        }
    }
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self::with_prefix("")
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Unavailable(format!("store lock poisoned: {e}"))
}

// ============================================================================
// MemoryStore
// ============================================================================

/// Process-lifetime store. Used in tests and when no file is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.clear();
        Ok(())
    }
}

// ============================================================================
// FileStore
// ============================================================================

/// JSON object on disk, rewritten in full on every mutation.
///
/// The file is read once at open; a missing file is an empty store.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: path.display().to_string(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened file store");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let body = serde_json::to_string_pretty(entries).map_err(|source| StoreError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })?;

        std::fs::write(&self.path, body).map_err(io_err)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.clear();
        self.flush(&entries)
    }
}
