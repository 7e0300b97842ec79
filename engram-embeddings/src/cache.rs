//! Bounded in-process embedding cache keyed by content hash.

use std::sync::Arc;

use moka::sync::Cache;

/// Default cache capacity (entries).
const DEFAULT_CAPACITY: u64 = 2_048;

/// L1 embedding cache. Values are shared so hits never clone the vector.
pub struct EmbeddingCache {
    inner: Cache<String, Arc<Vec<f32>>>,
}

impl EmbeddingCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Cache::new(capacity.max(1)),
        }
    }

    /// Hash a text into its cache key.
    pub fn key(text: &str) -> String {
        blake3::hash(text.as_bytes()).to_hex().to_string()
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<f32>>> {
        self.inner.get(key)
    }

    pub fn put(&self, key: String, embedding: Vec<f32>) -> Arc<Vec<f32>> {
        let shared = Arc::new(embedding);
        self.inner.insert(key, shared.clone());
        shared
    }

    pub fn len(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get() {
        let cache = EmbeddingCache::default();
        let key = EmbeddingCache::key("hello");
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), vec![1.0, 2.0]);
        assert_eq!(*cache.get(&key).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn keys_are_stable_and_distinct() {
        assert_eq!(EmbeddingCache::key("a"), EmbeddingCache::key("a"));
        assert_ne!(EmbeddingCache::key("a"), EmbeddingCache::key("b"));
    }
}
