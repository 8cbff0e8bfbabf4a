//! In-process LRU store.

use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::RwLock;

use crate::{CacheEntry, CacheError, CacheStore};

/// Bounded LRU store with lazy TTL expiry. Used by tests and as a
/// process-local tier.
pub struct MemoryStore {
    cache: RwLock<LruCache<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(cap)),
        }
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let mut cache = self.cache.write().await;
        let expired = match cache.get(key) {
            None => return Ok(None),
            Some(entry) => entry.is_expired(),
        };
        if expired {
            cache.pop(key);
            return Ok(None);
        }
        Ok(cache.get(key).cloned())
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.cache.write().await.put(entry.key.clone(), entry);
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.cache.write().await.pop(key).is_some())
    }

    async fn purge_expired(&self) -> Result<usize, CacheError> {
        let mut cache = self.cache.write().await;
        let expired: Vec<String> = cache
            .iter()
            .filter(|(_, e)| e.is_expired())
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            cache.pop(key);
        }
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    fn entry(key: &str, ttl: Option<Duration>) -> CacheEntry {
        CacheEntry::new(key, format!("GET {}", key), Bytes::from(key.to_string()), ttl)
    }

    #[tokio::test]
    async fn test_put_get_invalidate() {
        let store = MemoryStore::new(10);
        assert!(store.get("a").await.unwrap().is_none());

        store.put(entry("a", None)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().unwrap().payload, Bytes::from("a"));

        assert!(store.invalidate("a").await.unwrap());
        assert!(!store.invalidate("a").await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_lru_bound() {
        let store = MemoryStore::new(2);
        for k in ["a", "b", "c"] {
            store.put(entry(k, None)).await.unwrap();
        }
        assert_eq!(store.len().await, 2);
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_are_dropped() {
        let store = MemoryStore::new(10);
        store.put(entry("old", Some(Duration::ZERO))).await.unwrap();
        store.put(entry("fresh", None)).await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.get("fresh").await.unwrap().is_some());

        store.put(entry("old", Some(Duration::ZERO))).await.unwrap();
        assert!(store.get("old").await.unwrap().is_none());
        assert_eq!(store.len().await, 1);
    }
}
