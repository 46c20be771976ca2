use std::{
    cell::RefCell,
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::warn;

/// Durable string key-value storage, shaped like browser local storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}

/// Stores every key in one JSON object file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read storage file {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("Storage file {} is malformed", self.path.display()))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.read_entries()?;
        Ok(entries.get(key).and_then(|value| match value {
            Value::String(text) => Some(text.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "discarding unreadable storage file");
                Map::new()
            }
        };
        entries.insert(key.to_string(), Value::String(value.to_string()));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Unable to create storage directory {}", parent.display())
            })?;
        }
        let serialised = serde_json::to_string_pretty(&entries)?;
        fs::write(&self.path, serialised)
            .with_context(|| format!("Failed to write storage file {}", self.path.display()))
    }
}

/// Process-local store used by tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::new();
        store
            .entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        store
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_round_trips_and_creates_parents() {
        let temp = tempdir().unwrap();
        let store = JsonFileStore::new(temp.path().join("data/storage.json"));
        assert_eq!(store.get("language").unwrap(), None);

        store.set("language", "ja").unwrap();
        store.set("other", "{\"a\":1}").unwrap();
        assert_eq!(store.get("language").unwrap().as_deref(), Some("ja"));
        assert_eq!(store.get("other").unwrap().as_deref(), Some("{\"a\":1}"));
        assert!(store.path().exists());
    }

    #[test]
    fn malformed_file_errors_on_get_and_is_replaced_on_set() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("storage.json");
        fs::write(&path, "[[[").unwrap();
        let store = JsonFileStore::new(path);

        assert!(store.get("language").is_err());
        store.set("language", "fr").unwrap();
        assert_eq!(store.get("language").unwrap().as_deref(), Some("fr"));
    }

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryStore::with_entry("k", "v1");
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
        assert_eq!(store.get("missing").unwrap(), None);
    }
}
