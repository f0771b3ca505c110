//! Read-state tracking
//!
//! An entry counts as read once its cache key exists in the injected cache.
//! The engine only needs membership tests and write-once storage with no
//! expiry; [`MemoryCache`] serves tests and embedding, [`FileCache`] keeps the
//! state in a JSON file so it survives between CLI runs.

use crate::error::{ReaderError, Result};
use crate::logs::file_set::write_atomically;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Key-value cache consulted for read state
pub trait ReadStateCache: Send + Sync {
    /// Whether `key` is present
    fn exists(&self, key: &str) -> Result<bool>;

    /// Return the value stored under `key`, storing `producer()` first if the
    /// key is absent. Stored values never expire.
    fn remember_forever(&self, key: &str, producer: &dyn Fn() -> String) -> Result<String>;

    /// Store each absent key with its value; returns how many were added
    fn remember_all(&self, entries: Vec<(String, String)>) -> Result<usize> {
        let mut added = 0;
        for (key, value) in entries {
            if !self.exists(&key)? {
                self.remember_forever(&key, &|| value.clone())?;
                added += 1;
            }
        }
        Ok(added)
    }
}

fn lock<'a>(entries: &'a Mutex<HashMap<String, String>>) -> Result<MutexGuard<'a, HashMap<String, String>>> {
    entries
        .lock()
        .map_err(|_| ReaderError::Cache("read-state lock poisoned".to_string()))
}

/// In-process cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    /// Create an empty in-memory cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReadStateCache for MemoryCache {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(lock(&self.entries)?.contains_key(key))
    }

    fn remember_forever(&self, key: &str, producer: &dyn Fn() -> String) -> Result<String> {
        let mut entries = lock(&self.entries)?;
        Ok(entries
            .entry(key.to_string())
            .or_insert_with(producer)
            .clone())
    }
}

/// Cache persisted as a JSON object in a single file
///
/// The file is loaded on open and rewritten whenever keys are added, once per
/// [`ReadStateCache::remember_all`] batch.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileCache {
    /// Open the cache at `path`; a missing file starts an empty cache
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|e| {
                ReaderError::Cache(format!("failed to read {}: {}", path.display(), e))
            })?;
            if contents.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&contents).map_err(|e| {
                    ReaderError::Cache(format!("failed to parse {}: {}", path.display(), e))
                })?
            }
        } else {
            HashMap::new()
        };

        debug!("Loaded {} read-state key(s) from {}", entries.len(), path.display());

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    ReaderError::Cache(format!("failed to create {}: {}", parent.display(), e))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| ReaderError::Cache(format!("failed to serialize read state: {}", e)))?;

        write_atomically(&self.path, json.as_bytes()).map_err(|e| {
            ReaderError::Cache(format!("failed to write {}: {}", self.path.display(), e))
        })
    }
}

impl ReadStateCache for FileCache {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(lock(&self.entries)?.contains_key(key))
    }

    fn remember_forever(&self, key: &str, producer: &dyn Fn() -> String) -> Result<String> {
        let mut entries = lock(&self.entries)?;
        if let Some(value) = entries.get(key) {
            return Ok(value.clone());
        }

        let value = producer();
        entries.insert(key.to_string(), value.clone());
        self.persist(&entries)?;
        Ok(value)
    }

    fn remember_all(&self, batch: Vec<(String, String)>) -> Result<usize> {
        let mut entries = lock(&self.entries)?;
        let mut added = 0;
        for (key, value) in batch {
            if !entries.contains_key(&key) {
                entries.insert(key, value);
                added += 1;
            }
        }

        if added > 0 {
            self.persist(&entries)?;
            debug!("Stored {} read-state key(s) in {}", added, self.path.display());
        }
        Ok(added)
    }
}
