//! String key/value persistence backing the token store

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt storage file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Synchronous key/value storage with local-storage semantics: values are
/// strings and a missing key reads as `None`
pub trait KeyValueStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing an absent key is not an error
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local storage, used by tests and one-shot sessions
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
        Ok(())
    }
}

/// A JSON object on disk. Every write rewrites the whole file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open `path`, creating parent directories. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let items = match std::fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(items).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        // Write to a sibling file then rename so a crash never leaves half a file
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_string(), value.to_string());
        self.persist(&items)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        if items.remove(key).is_some() {
            self.persist(&items)?;
        }
        Ok(())
    }
}
