//! Content-addressed cache for outbound GIS and geocoding requests.
//!
//! Requests are reduced to a [`RequestSignature`] (method, URL, sorted params,
//! canonical JSON body) whose SHA-256 is the cache key. [`HttpCache`] reads
//! through a pluggable [`CacheStore`]:
//! - [`DiskStore`]: one file per entry, atomic rename on write
//! - [`MemoryStore`]: bounded in-process LRU
//!
//! [`CachedClient`] wraps reqwest so every fetch goes through the cache.

pub mod cache;
pub mod client;
pub mod disk;
pub mod error;
pub mod memory;
pub mod signature;
pub mod store;

pub use cache::{CacheStats, HttpCache};
pub use client::CachedClient;
pub use disk::DiskStore;
pub use error::{CacheError, FetchError};
pub use memory::MemoryStore;
pub use signature::{RequestSignature, CREDENTIAL_PARAMS};
pub use store::{CacheEntry, CacheStore};
