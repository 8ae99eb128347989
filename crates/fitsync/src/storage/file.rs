//! JSON-file-backed key-value store
//!
//! Persists the whole map on every write. The durable state this core
//! keeps is a handful of small records (checkpoint, cursors, budget), so
//! rewrite-on-change is cheap and keeps the file human-inspectable.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use super::KvStore;

pub struct FileKvStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileKvStore {
    /// Open (or create) a store backed by the given file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read state file: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse state file: {}", path.display()))?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Default location under the fitsync config directory.
    pub fn default_path() -> Option<PathBuf> {
        config::config_path("sync-state.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write state file: {}", self.path.display()))
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.remove(key);
        self.persist(&entries)
    }
}
