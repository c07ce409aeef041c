//! LRU cache for computed permission sets
//!
//! Entries are keyed by (subject, process, target). The cache knows nothing
//! about the graph, so the owner must clear it on every mutation.

use crate::core::operations::OperationSet;
use lru::LruCache;
use std::num::NonZeroUsize;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    subject: String,
    process: String,
    target: String,
}

impl CacheKey {
    fn new(subject: &str, process: &str, target: &str) -> Self {
        CacheKey {
            subject: subject.to_string(),
            process: process.to_string(),
            target: target.to_string(),
        }
    }
}

/// LRU cache of decisions; a zero capacity disables caching
pub struct DecisionCache {
    cache: Option<LruCache<CacheKey, OperationSet>>,
}

impl DecisionCache {
    pub fn new(capacity: usize) -> Self {
        DecisionCache {
            cache: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub fn get(&mut self, subject: &str, process: &str, target: &str) -> Option<OperationSet> {
        let cache = self.cache.as_mut()?;
        cache.get(&CacheKey::new(subject, process, target)).cloned()
    }

    pub fn put(&mut self, subject: &str, process: &str, target: &str, decision: OperationSet) {
        if let Some(cache) = self.cache.as_mut() {
            cache.put(CacheKey::new(subject, process, target), decision);
        }
    }

    pub fn clear(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.cache.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;

    #[test]
    fn test_cache_basic() {
        let mut cache = DecisionCache::new(10);
        assert!(cache.get("u1", "", "o1").is_none());

        cache.put("u1", "", "o1", ops!["read"]);
        assert_eq!(cache.get("u1", "", "o1"), Some(ops!["read"]));
        // the process is part of the key
        assert!(cache.get("u1", "p1", "o1").is_none());
    }

    #[test]
    fn test_cache_lru_eviction() {
        let mut cache = DecisionCache::new(2);
        cache.put("u1", "", "a", ops!["read"]);
        cache.put("u1", "", "b", ops!["read"]);
        cache.put("u1", "", "c", ops!["read"]); // evicts a

        assert!(cache.get("u1", "", "a").is_none());
        assert!(cache.get("u1", "", "b").is_some());
        assert!(cache.get("u1", "", "c").is_some());
    }

    #[test]
    fn test_cache_clear() {
        let mut cache = DecisionCache::new(10);
        cache.put("u1", "", "o1", ops!["read"]);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_disables() {
        let mut cache = DecisionCache::new(0);
        assert!(!cache.is_enabled());
        cache.put("u1", "", "o1", ops!["read"]);
        assert!(cache.get("u1", "", "o1").is_none());
        assert_eq!(cache.len(), 0);
    }
}
