use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::RepoConfig;
use crate::store::KeyValueStore;

/// Storage key holding every cached per-repository option bundle.
pub const REPO_CONFIG_CACHE_KEY: &str = "deepwikiRepoConfigCache";

/// Per-repository option bundles kept in one JSON object, keyed by the
/// trimmed raw repository input.
///
/// Writes are read-modify-write against a single blob without locking; the
/// last writer wins.
#[derive(Debug)]
pub struct ConfigCache<S> {
    store: S,
}

impl<S: KeyValueStore> ConfigCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn backing_store(&self) -> &S {
        &self.store
    }

    /// Look up the record cached for `key`. Missing storage, corrupt JSON and
    /// unknown keys all yield `None`.
    pub fn load(&self, key: &str) -> Option<RepoConfig> {
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        let mapping = match self.read_mapping() {
            Ok(Some(mapping)) => mapping,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "ignoring unreadable repository config cache");
                return None;
            }
        };
        let entry = mapping.get(key)?;
        match serde_json::from_value::<RepoConfig>(entry.clone()) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(key, error = %err, "ignoring malformed cached repository config");
                None
            }
        }
    }

    /// Replace the record for `key`, preserving every other entry.
    pub fn store(&self, key: &str, record: &RepoConfig) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            debug!("skipping config cache write for empty repository input");
            return Ok(());
        }
        let mut mapping = match self.read_mapping() {
            Ok(mapping) => mapping.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "resetting unreadable repository config cache");
                Map::new()
            }
        };
        mapping.insert(key.to_string(), serde_json::to_value(record)?);
        let serialised = serde_json::to_string(&Value::Object(mapping))?;
        self.store
            .set(REPO_CONFIG_CACHE_KEY, &serialised)
            .context("Failed to persist repository config cache")
    }

    fn read_mapping(&self) -> Result<Option<Map<String, Value>>> {
        let Some(raw) = self.store.get(REPO_CONFIG_CACHE_KEY)? else {
            return Ok(None);
        };
        let mapping = serde_json::from_str(&raw)
            .context("repository config cache is not a JSON object")?;
        Ok(Some(mapping))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Platform;
    use crate::store::{JsonFileStore, MemoryStore};
    use tempfile::tempdir;

    fn sample_record() -> RepoConfig {
        RepoConfig {
            selected_language: "ja".into(),
            is_comprehensive_view: false,
            provider: "openai".into(),
            model: "gpt-4o".into(),
            is_custom_model: true,
            custom_model: "ft:gpt-4o:wiki".into(),
            selected_platform: Platform::Gitlab,
            excluded_dirs: "./node_modules\n./dist".into(),
            excluded_files: "*.lock".into(),
            included_dirs: String::new(),
            included_files: String::new(),
        }
    }

    #[test]
    fn store_then_load_round_trips() {
        let cache = ConfigCache::new(MemoryStore::new());
        let record = sample_record();
        cache.store("https://github.com/a/b", &record).unwrap();
        assert_eq!(cache.load("https://github.com/a/b"), Some(record));
    }

    #[test]
    fn keys_are_trimmed() {
        let cache = ConfigCache::new(MemoryStore::new());
        cache.store("  /srv/repo \n", &sample_record()).unwrap();
        assert!(cache.load("/srv/repo").is_some());
        assert!(cache.load("   /srv/repo").is_some());
    }

    #[test]
    fn unrelated_or_absent_keys_are_none() {
        let cache = ConfigCache::new(MemoryStore::new());
        assert_eq!(cache.load("https://github.com/a/b"), None);
        cache.store("https://github.com/a/b", &sample_record()).unwrap();
        assert_eq!(cache.load("https://github.com/a/c"), None);
        assert_eq!(cache.load(""), None);
    }

    #[test]
    fn corrupt_blob_loads_as_none_and_is_replaced_on_store() {
        let cache = ConfigCache::new(MemoryStore::with_entry(REPO_CONFIG_CACHE_KEY, "{oops"));
        assert_eq!(cache.load("x/y/z"), None);

        cache.store("x/y/z", &sample_record()).unwrap();
        assert!(cache.load("x/y/z").is_some());
    }

    #[test]
    fn store_preserves_other_entries_verbatim() {
        let existing = r#"{"keep/me/please":{"futureField":42},"old/a/b":{"provider":"google"}}"#;
        let cache = ConfigCache::new(MemoryStore::with_entry(REPO_CONFIG_CACHE_KEY, existing));
        cache.store("old/a/b", &sample_record()).unwrap();

        let raw = cache
            .backing_store()
            .get(REPO_CONFIG_CACHE_KEY)
            .unwrap()
            .unwrap();
        let mapping: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(mapping["keep/me/please"]["futureField"], 42);
        assert_eq!(mapping["old/a/b"]["provider"], "openai");
        assert_eq!(mapping.as_object().unwrap().len(), 2);
    }

    #[test]
    fn unreadable_record_does_not_hide_others() {
        let existing = r#"{"bad/a/b":{"selectedPlatform":"sourcehut"},"good/a/b":{"model":"m"}}"#;
        let cache = ConfigCache::new(MemoryStore::with_entry(REPO_CONFIG_CACHE_KEY, existing));
        assert_eq!(cache.load("bad/a/b"), None);
        assert_eq!(cache.load("good/a/b").unwrap().model, "m");
    }

    #[test]
    fn record_with_blank_fields_is_restored_with_defaults() {
        let existing = r#"{"https://github.com/a/b":{"provider":"google","model":"gemini","selectedPlatform":"","excludedDirs":null}}"#;
        let cache = ConfigCache::new(MemoryStore::with_entry(REPO_CONFIG_CACHE_KEY, existing));
        let record = cache.load("https://github.com/a/b").unwrap();
        assert_eq!(record.provider, "google");
        assert_eq!(record.model, "gemini");
        assert_eq!(record.selected_platform, Platform::Github);
        assert_eq!(record.excluded_dirs, "");
        assert!(record.is_comprehensive_view);
    }

    #[test]
    fn file_backed_cache_survives_reopen() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("storage.json");
        {
            let cache = ConfigCache::new(JsonFileStore::new(path.clone()));
            cache.store("/home/me/project", &sample_record()).unwrap();
        }
        let reopened = ConfigCache::new(JsonFileStore::new(path));
        assert_eq!(reopened.load("/home/me/project"), Some(sample_record()));
    }
}
