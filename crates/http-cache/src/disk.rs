//! Filesystem-backed store.
//!
//! Each entry is one file at `<root>/<key[0..2]>/<key>.entry`:
//!
//! ```text
//! u32 LE header length | JSON header | payload bytes
//! ```
//!
//! Writes go to a uniquely named temp file in the same directory and are
//! renamed into place, so readers never observe a partial entry.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::{CacheEntry, CacheError, CacheStore};

const ENTRY_EXT: &str = "entry";

#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    signature: String,
    stored_at: DateTime<Utc>,
    ttl_secs: Option<u64>,
}

/// Store that persists entries under a root directory.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let shard = key.get(..2).unwrap_or("xx");
        self.root.join(shard).join(format!("{}.{}", key, ENTRY_EXT))
    }

    async fn read_entry(&self, key: &str, path: &Path) -> Result<Option<CacheEntry>, CacheError> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        decode(key, Bytes::from(raw)).map(Some)
    }

    async fn remove(path: &Path) -> Result<bool, CacheError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn encode(entry: &CacheEntry) -> Result<Vec<u8>, CacheError> {
    let header = serde_json::to_vec(&EntryHeader {
        signature: entry.signature.clone(),
        stored_at: entry.stored_at,
        ttl_secs: entry.ttl.map(|d| d.as_secs()),
    })?;
    let mut out = Vec::with_capacity(4 + header.len() + entry.payload.len());
    out.extend_from_slice(&(header.len() as u32).to_le_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(&entry.payload);
    Ok(out)
}

fn decode(key: &str, raw: Bytes) -> Result<CacheEntry, CacheError> {
    let corrupt = |reason: String| CacheError::Corrupt {
        key: key.to_string(),
        reason,
    };

    if raw.len() < 4 {
        return Err(corrupt(format!("entry is only {} bytes", raw.len())));
    }
    let header_len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    let header_end = 4usize
        .checked_add(header_len)
        .filter(|end| *end <= raw.len())
        .ok_or_else(|| corrupt(format!("header length {} exceeds entry", header_len)))?;

    let header: EntryHeader = serde_json::from_slice(&raw[4..header_end])
        .map_err(|e| corrupt(format!("bad header: {}", e)))?;

    Ok(CacheEntry {
        key: key.to_string(),
        signature: header.signature,
        payload: raw.slice(header_end..),
        stored_at: header.stored_at,
        ttl: header.ttl_secs.map(Duration::from_secs),
    })
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(key);
        match self.read_entry(key, &path).await {
            Ok(Some(entry)) if entry.is_expired() => {
                debug!(key = %key, "Dropping expired cache entry");
                Self::remove(&path).await?;
                Ok(None)
            }
            Ok(found) => Ok(found),
            Err(CacheError::Corrupt { reason, .. }) => {
                warn!(key = %key, reason = %reason, "Removing corrupt cache entry");
                Self::remove(&path).await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError> {
        let path = self.entry_path(&entry.key);
        let dir = path.parent().unwrap_or(&self.root).to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let tmp = dir.join(format!(".{}.{}.tmp", entry.key, uuid::Uuid::new_v4()));
        let data = encode(&entry)?;

        let mut file = tokio::fs::File::create(&tmp).await?;
        let written = async {
            file.write_all(&data).await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        Self::remove(&self.entry_path(key)).await
    }

    async fn purge_expired(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        let mut shards = tokio::fs::read_dir(&self.root).await?;
        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(shard.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                    continue;
                }
                let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                    continue;
                };
                let stale = match self.read_entry(&key, &path).await {
                    Ok(Some(entry)) => entry.is_expired(),
                    Ok(None) => false,
                    Err(CacheError::Corrupt { .. }) => true,
                    Err(e) => return Err(e),
                };
                if stale && Self::remove(&path).await? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KEY: &str = "ab12cd34";

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path()).await.unwrap();

        let entry = CacheEntry::new(KEY, "GET https://x/y", Bytes::from_static(b"\x00\x01payload"), None);
        store.put(entry.clone()).await.unwrap();

        assert!(dir.path().join("ab").join("ab12cd34.entry").exists());
        let got = store.get(KEY).await.unwrap().unwrap();
        assert_eq!(got.payload, entry.payload);
        assert_eq!(got.signature, "GET https://x/y");
    }

    #[tokio::test]
    async fn test_put_is_idempotent_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path()).await.unwrap();
        for _ in 0..3 {
            let entry = CacheEntry::new(KEY, "GET a", Bytes::from_static(b"same"), None);
            store.put(entry).await.unwrap();
        }
        let names: Vec<_> = std::fs::read_dir(dir.path().join("ab"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["ab12cd34.entry".to_string()]);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss_and_removed() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path()).await.unwrap();
        std::fs::create_dir_all(dir.path().join("ab")).unwrap();
        let path = dir.path().join("ab").join("ab12cd34.entry");
        std::fs::write(&path, [0xff, 0xff, 0xff, 0x7f, b'{']).unwrap();

        assert!(store.get(KEY).await.unwrap().is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path()).await.unwrap();
        let mut entry = CacheEntry::new(KEY, "GET a", Bytes::from_static(b"old"), Some(Duration::from_secs(60)));
        entry.stored_at = Utc::now() - chrono::Duration::seconds(120);
        store.put(entry).await.unwrap();

        assert!(store.get(KEY).await.unwrap().is_none());
        assert!(!store.invalidate(KEY).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path()).await.unwrap();

        let mut old = CacheEntry::new("00old", "GET a", Bytes::from_static(b"a"), Some(Duration::from_secs(1)));
        old.stored_at = Utc::now() - chrono::Duration::seconds(10);
        store.put(old).await.unwrap();
        store
            .put(CacheEntry::new("11new", "GET b", Bytes::from_static(b"b"), None))
            .await
            .unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.get("11new").await.unwrap().is_some());
    }
}
