//! Cache storage.
//!
//! `CacheStore` is the boundary to the key-value cache the storefront renders
//! from. `MemoryCacheStore` is the in-process implementation: LRU bounded,
//! with a TTL per entry.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;

use super::config::CacheConfig;
use super::keys::is_store_scoped;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_HIT: &str = "vitrina_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "vitrina_cache_miss_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "vitrina_cache_evict_total";

/// Errors raised by a cache backend.
#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("cache backend unavailable: {message}")]
    Unavailable { message: String },
    #[error("cache value could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CacheStoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Entry counts reported by a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    pub expired: usize,
    pub active: usize,
}

/// Key-value cache collaborator.
///
/// Prefix deletion is a literal `starts_with` match, never a glob. Deleting
/// keys that do not exist is not an error.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheStoreError>;

    /// Store a value. A zero TTL means the value is not cached.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheStoreError>;

    /// Returns whether an entry was removed.
    async fn delete_key(&self, key: &str) -> Result<bool, CacheStoreError>;

    /// Returns the number of entries removed.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize, CacheStoreError>;

    /// Remove every entry scoped to a store.
    async fn invalidate_store(&self, store_id: &str) -> Result<usize, CacheStoreError>;

    /// Keys of all live entries.
    async fn keys(&self) -> Result<Vec<String>, CacheStoreError>;

    async fn stats(&self) -> Result<CacheStats, CacheStoreError>;

    /// Drop expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize, CacheStoreError>;

    async fn clear(&self) -> Result<(), CacheStoreError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Bytes,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// In-memory LRU cache with per-entry expiry.
pub struct MemoryCacheStore {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.capacity_non_zero())),
        }
    }

    fn remove_matching(&self, op: &'static str, predicate: impl Fn(&str) -> bool) -> usize {
        let mut entries = mutex_lock(&self.entries, SOURCE, op);
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, _)| predicate(key.as_str()))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            entries.pop(key);
        }
        doomed.len()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheStoreError> {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");

        let lookup = entries
            .get(key)
            .map(|entry| (!entry.is_expired(now)).then(|| entry.value.clone()));
        let hit = match lookup {
            Some(Some(value)) => Some(value),
            Some(None) => {
                entries.pop(key);
                None
            }
            None => None,
        };

        if hit.is_some() {
            counter!(METRIC_CACHE_HIT).increment(1);
        } else {
            counter!(METRIC_CACHE_MISS).increment(1);
        }
        Ok(hit)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheStoreError> {
        if ttl.is_zero() {
            return Ok(());
        }

        let entry = CacheEntry {
            value,
            expires_at: Instant::now().checked_add(ttl),
        };
        let evicted = mutex_lock(&self.entries, SOURCE, "set").push(key.to_string(), entry);
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!(METRIC_CACHE_EVICT).increment(1);
        }
        Ok(())
    }

    async fn delete_key(&self, key: &str) -> Result<bool, CacheStoreError> {
        Ok(mutex_lock(&self.entries, SOURCE, "delete_key")
            .pop(key)
            .is_some())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize, CacheStoreError> {
        Ok(self.remove_matching("delete_by_prefix", |key| key.starts_with(prefix)))
    }

    async fn invalidate_store(&self, store_id: &str) -> Result<usize, CacheStoreError> {
        Ok(self.remove_matching("invalidate_store", |key| {
            is_store_scoped(key, store_id)
        }))
    }

    async fn keys(&self) -> Result<Vec<String>, CacheStoreError> {
        let now = Instant::now();
        let entries = mutex_lock(&self.entries, SOURCE, "keys");
        Ok(entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn stats(&self) -> Result<CacheStats, CacheStoreError> {
        let now = Instant::now();
        let entries = mutex_lock(&self.entries, SOURCE, "stats");
        let total = entries.len();
        let expired = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .count();
        Ok(CacheStats {
            total,
            expired,
            active: total - expired,
        })
    }

    async fn purge_expired(&self) -> Result<usize, CacheStoreError> {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "purge_expired");
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        Ok(expired.len())
    }

    async fn clear(&self) -> Result<(), CacheStoreError> {
        mutex_lock(&self.entries, SOURCE, "clear").clear();
        Ok(())
    }
}
