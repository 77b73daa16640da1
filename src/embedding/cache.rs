//! Best-effort persistent embedding cache.
//!
//! A JSON object mapping `sha256(provider, model, normalized text)` to the
//! aligned vector. Load and write failures are logged and never propagate —
//! a broken cache must not break retrieval.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// On-disk embedding cache with an in-memory mirror.
pub struct EmbeddingCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, Vec<f32>>>,
}

/// Composite cache key: hash of (provider, model, normalized text).
pub fn cache_key(provider: &str, model: &str, normalized_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(provider.as_bytes());
    hasher.update([0u8]);
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(normalized_text.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl EmbeddingCache {
    /// Open a cache file, loading any existing entries. A missing or
    /// unreadable file starts the cache empty.
    pub fn open(path: PathBuf) -> Self {
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<HashMap<String, Vec<f32>>>(&contents) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "embedding cache unreadable, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "embedding cache loaded");
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    /// Insert and persist. Failures are logged, never returned.
    pub fn put(&self, key: String, embedding: Vec<f32>) {
        let snapshot = {
            let Ok(mut entries) = self.entries.lock() else {
                return;
            };
            entries.insert(key, embedding);
            match serde_json::to_string(&*entries) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to serialize embedding cache");
                    return;
                }
            }
        };

        // Atomic write: tmp + rename.
        let tmp = self.path.with_extension("tmp");
        let result = std::fs::write(&tmp, snapshot).and_then(|_| std::fs::rename(&tmp, &self.path));
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to persist embedding cache");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_and_sensitive_to_all_parts() {
        let a = cache_key("local", "m1", "hello");
        assert_eq!(a, cache_key("local", "m1", "hello"));
        assert_ne!(a, cache_key("gemini", "m1", "hello"));
        assert_ne!(a, cache_key("local", "m2", "hello"));
        assert_ne!(a, cache_key("local", "m1", "goodbye"));
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache = EmbeddingCache::open(path.clone());
        cache.put(cache_key("local", "m", "text"), vec![1.0, 0.0]);

        let reopened = EmbeddingCache::open(path);
        assert_eq!(
            reopened.get(&cache_key("local", "m", "text")),
            Some(vec![1.0, 0.0])
        );
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not json at all").unwrap();

        let cache = EmbeddingCache::open(path);
        assert!(cache.is_empty());
    }

    #[test]
    fn unwritable_path_does_not_panic() {
        let cache = EmbeddingCache::open(PathBuf::from("/nonexistent-dir/cache.json"));
        cache.put("k".into(), vec![0.5]);
        // Write failed silently; the in-memory mirror still serves reads.
        assert_eq!(cache.get("k"), Some(vec![0.5]));
    }
}
