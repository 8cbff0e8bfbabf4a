//! Key-value byte store with expiry, behind the HTTP cache.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::CacheError;

/// One cached response.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Hex SHA-256 of the request signature
    pub key: String,
    /// Canonical signature text, kept for debugging
    pub signature: String,
    pub payload: Bytes,
    pub stored_at: DateTime<Utc>,
    /// `None` never expires
    pub ttl: Option<Duration>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, signature: impl Into<String>, payload: Bytes, ttl: Option<Duration>) -> Self {
        Self {
            key: key.into(),
            signature: signature.into(),
            payload,
            stored_at: Utc::now(),
            ttl,
        }
    }

    /// TTLs that reach past the representable date range never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| self.stored_at.checked_add_signed(ttl))
            .map_or(false, |expires| now >= expires)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Backing store for [`crate::HttpCache`].
///
/// Implementations must make `put` atomic per key: a concurrent reader sees
/// either the old entry, the new one, or nothing, never a partial write.
/// Re-storing the same key is idempotent.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch an unexpired entry. Expired entries are dropped and reported as absent.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError>;

    /// Remove an entry; returns whether one existed.
    async fn invalidate(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove every expired entry; returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry() {
        let mut entry = CacheEntry::new("k", "GET x", Bytes::from_static(b"1"), Some(Duration::from_secs(60)));
        let now = entry.stored_at;
        assert!(!entry.is_expired_at(now));
        assert!(entry.is_expired_at(now + chrono::Duration::seconds(61)));

        entry.ttl = None;
        assert!(!entry.is_expired_at(now + chrono::Duration::days(3650)));

        entry.ttl = Some(Duration::from_secs(10_000_000_000 * 3600));
        assert!(!entry.is_expired());
        entry.ttl = Some(Duration::MAX);
        assert!(!entry.is_expired_at(now + chrono::Duration::days(3650)));
    }
}
