//! JSON-file storage adapter.
//!
//! All keys live in one JSON object on disk. The whole document is cached
//! in memory and rewritten on every change through a temporary file that is
//! renamed over the target, so a crash mid-write leaves the previous
//! version intact.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use quizgate_core::error::StorageError;
use quizgate_core::traits::Storage;

/// [`Storage`] persisted to a single JSON file.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    entries: RwLock<Map<String, Value>>,
}

impl JsonFileStorage {
    /// Open the store at `path`, creating parent directories as needed.
    ///
    /// A missing or empty file starts an empty store. Anything other than a
    /// JSON object is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }

        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read storage file: {}", path.display()))?;
            if content.trim().is_empty() {
                Map::new()
            } else {
                serde_json::from_str(&content).with_context(|| {
                    format!("storage file is not a JSON object: {}", path.display())
                })?
            }
        } else {
            Map::new()
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "opened storage file");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_document(&self, entries: &Map<String, Value>) -> Result<(), StorageError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, entries).map_err(|source| {
            StorageError::Serialization {
                key: self.path.display().to_string(),
                source,
            }
        })?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }

    /// Apply `change` to a copy of the document and commit it only once the
    /// file has been replaced.
    fn modify(&self, change: impl FnOnce(&mut Map<String, Value>)) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::Unavailable("file storage lock poisoned".into()))?;
        let mut next = entries.clone();
        change(&mut next);
        self.write_document(&next)?;
        *entries = next;
        Ok(())
    }
}

impl Storage for JsonFileStorage {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::Unavailable("file storage lock poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.modify(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.get(key)?.is_none() {
            return Ok(());
        }
        self.modify(|entries| {
            entries.remove(key);
        })
    }
}
