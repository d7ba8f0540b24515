//! Cache manager facade.
//!
//! Thin, non-failing wrapper over a [`CacheStore`]. Backend errors are logged
//! and reported as "nothing removed" so that cache maintenance can never fail
//! the write that triggered it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::config::{CacheConfig, TtlCategory, TtlPolicy};
use super::keys;
use super::store::{CacheStats, CacheStore};

pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    ttl: TtlPolicy,
    development: bool,
    dev_cache_enabled: AtomicBool,
}

impl CacheManager {
    pub fn new(config: &CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            ttl: config.ttl_policy(),
            development: config.development,
            dev_cache_enabled: AtomicBool::new(config.dev_cache_enabled),
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    fn should_use_cache(&self) -> bool {
        !self.development || self.dev_cache_enabled.load(Ordering::Relaxed)
    }

    // ========================================================================
    // TTL policy
    // ========================================================================

    pub fn ttl(&self, category: TtlCategory, kind: Option<&str>) -> Duration {
        self.ttl.ttl(category, kind)
    }

    pub fn data_ttl(&self, kind: Option<&str>) -> Duration {
        self.ttl(TtlCategory::Data, kind)
    }

    pub fn template_ttl(&self) -> Duration {
        self.ttl(TtlCategory::Template, None)
    }

    pub fn page_ttl(&self, kind: Option<&str>) -> Duration {
        self.ttl(TtlCategory::Page, kind)
    }

    pub fn domain_ttl(&self) -> Duration {
        self.ttl(TtlCategory::Domain, None)
    }

    // ========================================================================
    // Reads and writes
    // ========================================================================

    /// Fetch and decode a cached JSON value.
    ///
    /// Undecodable entries are treated as misses.
    pub async fn get_cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.should_use_cache() {
            return None;
        }

        let bytes = match self.store.get(key).await {
            Ok(bytes) => bytes?,
            Err(err) => {
                warn!(key, error = %err, "Cache read failed");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(key, error = %err, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Encode and store a JSON value. Zero TTLs are never cached.
    pub async fn set_cached<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        if !self.should_use_cache() || ttl.is_zero() {
            return;
        }

        let encoded = match serde_json::to_vec(value) {
            Ok(encoded) => Bytes::from(encoded),
            Err(err) => {
                warn!(key, error = %err, "Cache value could not be encoded");
                return;
            }
        };

        if let Err(err) = self.store.set(key, encoded, ttl).await {
            warn!(key, error = %err, "Cache write failed");
        }
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Remove one exact key. Returns the number of entries removed (0 or 1).
    pub async fn delete_key(&self, key: &str) -> usize {
        match self.store.delete_key(key).await {
            Ok(removed) => usize::from(removed),
            Err(err) => {
                warn!(key, error = %err, "Cache key deletion failed");
                0
            }
        }
    }

    /// Remove every key starting with `prefix`.
    pub async fn delete_by_prefix(&self, prefix: &str) -> usize {
        match self.store.delete_by_prefix(prefix).await {
            Ok(removed) => removed,
            Err(err) => {
                warn!(prefix, error = %err, "Cache prefix deletion failed");
                0
            }
        }
    }

    /// Remove everything cached for a store.
    pub async fn invalidate_store_cache(&self, store_id: &str) -> usize {
        match self.store.invalidate_store(store_id).await {
            Ok(removed) => {
                debug!(store_id, removed, "Store cache invalidated");
                removed
            }
            Err(err) => {
                warn!(store_id, error = %err, "Store cache invalidation failed");
                0
            }
        }
    }

    /// Remove a product entry together with the lists that may embed it.
    pub async fn invalidate_product_cache(&self, store_id: &str, product_id: &str) -> usize {
        let mut removed = self.delete_key(&keys::product_key(store_id, product_id)).await;
        removed += self.delete_by_prefix(&keys::products_prefix(store_id)).await;
        removed += self
            .delete_by_prefix(&keys::featured_products_prefix(store_id))
            .await;
        removed
    }

    pub async fn invalidate_domain_cache(&self, domain: &str) -> usize {
        self.delete_key(&keys::domain_key(domain)).await
    }

    /// Remove the raw and compiled forms of one template.
    pub async fn invalidate_template_cache(&self, store_id: &str, template_name: &str) -> usize {
        self.delete_key(&keys::template_key(store_id, template_name))
            .await
            + self
                .delete_key(&keys::compiled_template_key(store_id, template_name))
                .await
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    pub async fn clear_cache(&self) {
        if let Err(err) = self.store.clear().await {
            warn!(error = %err, "Cache clear failed");
        }
    }

    pub async fn clean_expired_cache(&self) -> usize {
        match self.store.purge_expired().await {
            Ok(removed) => removed,
            Err(err) => {
                warn!(error = %err, "Expired cache purge failed");
                0
            }
        }
    }

    pub async fn cache_stats(&self) -> CacheStats {
        if !self.should_use_cache() {
            return CacheStats::default();
        }
        match self.store.stats().await {
            Ok(stats) => stats,
            Err(err) => {
                warn!(error = %err, "Cache stats unavailable");
                CacheStats::default()
            }
        }
    }

    // ========================================================================
    // Development toggles
    // ========================================================================

    pub fn set_dev_cache_enabled(&self, enabled: bool) {
        self.dev_cache_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_dev_cache_enabled(&self) -> bool {
        self.dev_cache_enabled.load(Ordering::Relaxed)
    }
}
