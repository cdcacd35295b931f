use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::warn;

/// A string-keyed cache persisted as a JSON map.
///
/// Backs the lexical-search, mention-detector and vector-norm caches. All
/// access is mutex-guarded; the file is written only on an explicit
/// `store()` call, never mid-query. A missing or unreadable file starts the
/// cache empty rather than failing: caches are an optimization, not an
/// index.
pub struct JsonCache<V> {
    path: Option<PathBuf>,
    entries: Mutex<FxHashMap<String, V>>,
    changed: AtomicBool,
}

impl<V: Clone + Serialize + DeserializeOwned> JsonCache<V> {
    /// Open a cache backed by `path`; `None` keeps it in memory only.
    pub fn open(path: Option<&Path>) -> Self {
        let entries = match path {
            Some(path) if path.exists() => match Self::read_file(path) {
                Ok(entries) => entries,
                Err(error) => {
                    warn!("ignoring unreadable cache {}: {error:#}", path.display());
                    FxHashMap::default()
                }
            },
            _ => FxHashMap::default(),
        };
        Self {
            path: path.map(Path::to_path_buf),
            entries: Mutex::new(entries),
            changed: AtomicBool::new(false),
        }
    }

    pub fn in_memory() -> Self {
        Self::open(None)
    }

    fn read_file(path: &Path) -> Result<FxHashMap<String, V>> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).context("cache file is not a JSON map")
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn put(&self, key: impl Into<String>, value: V) {
        self.entries.lock().unwrap().insert(key.into(), value);
        self.changed.store(true, Ordering::Relaxed);
    }

    /// Look up `key`, computing and remembering the value on a miss.
    pub fn get_or_insert_with(&self, key: &str, compute: impl FnOnce() -> V) -> V {
        let mut entries = self.entries.lock().unwrap();
        if let Some(value) = entries.get(key) {
            return value.clone();
        }
        let value = compute();
        entries.insert(key.to_string(), value.clone());
        self.changed.store(true, Ordering::Relaxed);
        value
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persist to disk if the cache is file-backed and has changed.
    pub fn store(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.changed.swap(false, Ordering::Relaxed) {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let entries = self.entries.lock().unwrap();
        let raw = serde_json::to_string(&*entries)?;
        std::fs::write(path, raw)
            .with_context(|| format!("failed to write cache {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_round_trip() {
        let cache: JsonCache<Vec<String>> = JsonCache::in_memory();
        assert!(cache.get("term").is_none());
        cache.put("term", vec!["Q1".to_string()]);
        assert_eq!(cache.get("term"), Some(vec!["Q1".to_string()]));
    }

    #[test]
    fn store_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache: JsonCache<f64> = JsonCache::open(Some(&path));
        cache.put("norm", 2.5);
        cache.store().unwrap();

        let reopened: JsonCache<f64> = JsonCache::open(Some(&path));
        assert_eq!(reopened.get("norm"), Some(2.5));
    }

    #[test]
    fn unchanged_cache_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache: JsonCache<f64> = JsonCache::open(Some(&path));
        cache.store().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_cache_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not json").unwrap();
        let cache: JsonCache<f64> = JsonCache::open(Some(&path));
        assert!(cache.is_empty());
    }
}
