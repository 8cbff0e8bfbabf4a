//! Read-through cache in front of outbound requests.

use bytes::Bytes;
use metrics::counter;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{CacheEntry, CacheStore, FetchError, RequestSignature};

/// Counters for the HTTP cache.
///
/// All fields are atomic for lock-free reads from metrics endpoints.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    /// Entries written after a successful fetch
    pub stores: AtomicU64,
    pub fetch_errors: AtomicU64,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn stores(&self) -> u64 {
        self.stores.load(Ordering::Relaxed)
    }

    pub fn fetch_errors(&self) -> u64 {
        self.fetch_errors.load(Ordering::Relaxed)
    }
}

type Gate = Arc<tokio::sync::Mutex<()>>;

/// Cache of raw response bytes keyed by [`RequestSignature`].
///
/// Concurrent misses on the same key are coalesced: the first caller fetches
/// while the others wait on a per-key gate and then read the stored entry.
pub struct HttpCache {
    store: Arc<dyn CacheStore>,
    default_ttl: Option<Duration>,
    stats: Arc<CacheStats>,
    in_flight: Mutex<HashMap<String, Gate>>,
}

impl HttpCache {
    pub fn new(store: Arc<dyn CacheStore>, default_ttl: Option<Duration>) -> Self {
        Self {
            store,
            default_ttl,
            stats: Arc::new(CacheStats::default()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        self.stats.clone()
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Return cached bytes for `signature`, or run `fetch` and store its
    /// result. Fetch errors are returned to the caller and never stored.
    pub async fn get_or_fetch<F, Fut>(&self, signature: &RequestSignature, fetch: F) -> Result<Bytes, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, FetchError>>,
    {
        let key = signature.key();
        let gate = self.acquire_gate(&key);
        let result = {
            let _guard = gate.lock().await;
            self.lookup_or_fetch(&key, signature, fetch).await
        };
        self.release_gate(&key, gate);
        result
    }

    async fn lookup_or_fetch<F, Fut>(&self, key: &str, signature: &RequestSignature, fetch: F) -> Result<Bytes, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, FetchError>>,
    {
        match self.store.get(key).await {
            Ok(Some(entry)) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                counter!("http_cache_hits_total").increment(1);
                debug!(cache_key = %key, request = %signature, "Cache hit");
                return Ok(entry.payload);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Cache read failed, treating as miss");
            }
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        counter!("http_cache_misses_total").increment(1);
        debug!(cache_key = %key, request = %signature, "Cache miss");

        let payload = match fetch().await {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.fetch_errors.fetch_add(1, Ordering::Relaxed);
                counter!("http_cache_fetch_errors_total").increment(1);
                return Err(e);
            }
        };

        let entry = CacheEntry::new(key, signature.canonical(), payload.clone(), self.default_ttl);
        match self.store.put(entry).await {
            Ok(()) => {
                self.stats.stores.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Failed to store cache entry");
            }
        }
        Ok(payload)
    }

    /// Drop the entry for `signature`, if any.
    pub async fn invalidate(&self, signature: &RequestSignature) -> bool {
        let key = signature.key();
        match self.store.invalidate(&key).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Cache invalidation failed");
                false
            }
        }
    }

    fn acquire_gate(&self, key: &str) -> Gate {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        in_flight.entry(key.to_string()).or_default().clone()
    }

    fn release_gate(&self, key: &str, gate: Gate) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        // The map holds one reference and this caller the other; anyone else
        // still waiting keeps the gate alive.
        if Arc::strong_count(&gate) <= 2 {
            in_flight.remove(key);
        }
    }

    #[cfg(test)]
    fn gates_in_flight(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use std::sync::atomic::AtomicUsize;

    fn cache(ttl: Option<Duration>) -> HttpCache {
        HttpCache::new(Arc::new(MemoryStore::new(64)), ttl)
    }

    fn sig(q: &str) -> RequestSignature {
        RequestSignature::get("https://gis.example.com/query", &[("where", q)]).unwrap()
    }

    #[tokio::test]
    async fn test_hit_skips_fetch() {
        let cache = cache(None);
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        for _ in 0..3 {
            let bytes = cache
                .get_or_fetch(&sig("1=1"), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Bytes::from_static(b"body"))
                })
                .await
                .unwrap();
            assert_eq!(bytes, Bytes::from_static(b"body"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits(), 2);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.stores(), 1);
        assert!((stats.hit_rate() - 66.666).abs() < 0.01);
        assert_eq!(cache.gates_in_flight(), 0);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = cache(None);
        let err = cache
            .get_or_fetch(&sig("x"), || async {
                Err(FetchError::Status {
                    status: 503,
                    url: "https://gis.example.com/query".to_string(),
                })
            })
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(cache.stats().fetch_errors(), 1);

        let ok = cache
            .get_or_fetch(&sig("x"), || async { Ok(Bytes::from_static(b"ok")) })
            .await
            .unwrap();
        assert_eq!(ok, Bytes::from_static(b"ok"));
        assert_eq!(cache.stats().stores(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_refetches() {
        let cache = cache(Some(Duration::ZERO));
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        for _ in 0..2 {
            cache
                .get_or_fetch(&sig("1=1"), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Bytes::from_static(b"body"))
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = cache(None);
        cache
            .get_or_fetch(&sig("a"), || async { Ok(Bytes::from_static(b"a")) })
            .await
            .unwrap();
        assert!(cache.invalidate(&sig("a")).await);
        assert!(!cache.invalidate(&sig("a")).await);
    }
}
