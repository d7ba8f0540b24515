//! Cache invalidation service.
//!
//! Entry point for every content mutation. Builds the plan for the event,
//! applies it through the [`CacheManager`] and records statistics. Nothing
//! here returns an error: invalidation runs after the authoritative write and
//! must never fail it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use super::lock::{rw_read, rw_write};
use super::manager::CacheManager;
use super::planner::{InvalidationPlan, InvalidationRequest, Purge};
use super::rules::ChangeType;

const SOURCE: &str = "cache::invalidation";

pub(crate) const METRIC_INVALIDATIONS: &str = "vitrina_cache_invalidations_total";
pub(crate) const METRIC_PURGED_ENTRIES: &str = "vitrina_cache_purged_entries_total";
pub(crate) const METRIC_INVALIDATION_MS: &str = "vitrina_cache_invalidation_ms";

/// Snapshot of the invalidation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationStats {
    pub total_invalidations: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_invalidation: Option<OffsetDateTime>,
}

#[derive(Default)]
struct StatsRecorder {
    total: AtomicU64,
    last: RwLock<Option<OffsetDateTime>>,
}

impl StatsRecorder {
    fn record(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        *rw_write(&self.last, SOURCE, "record") = Some(OffsetDateTime::now_utc());
    }

    fn snapshot(&self) -> InvalidationStats {
        InvalidationStats {
            total_invalidations: self.total.load(Ordering::Relaxed),
            last_invalidation: *rw_read(&self.last, SOURCE, "snapshot"),
        }
    }
}

/// Outcome of one invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationReport {
    pub plan: InvalidationPlan,
    pub purged: usize,
}

pub struct CacheInvalidationService {
    manager: Arc<CacheManager>,
    stats: StatsRecorder,
}

impl CacheInvalidationService {
    pub fn new(manager: Arc<CacheManager>) -> Self {
        Self {
            manager,
            stats: StatsRecorder::default(),
        }
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    /// Invalidate everything a change may have made stale.
    #[instrument(skip_all, fields(change_type = %change, store_id = %store_id))]
    pub async fn invalidate_cache(
        &self,
        change: ChangeType,
        store_id: &str,
        entity_id: Option<&str>,
        path: Option<&str>,
    ) -> InvalidationReport {
        let started_at = Instant::now();
        let request = InvalidationRequest::new(change, store_id)
            .with_entity(entity_id)
            .with_path(path);
        let plan = InvalidationPlan::for_request(&request);

        let mut purged = 0;
        for purge in &plan.purges {
            purged += self.apply(purge).await;
        }

        self.stats.record();
        counter!(METRIC_INVALIDATIONS, "change_type" => change.as_str()).increment(1);
        counter!(METRIC_PURGED_ENTRIES).increment(purged as u64);
        histogram!(METRIC_INVALIDATION_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        info!(
            entity_id = entity_id.unwrap_or_default(),
            path = path.unwrap_or_default(),
            description = change.rule().description,
            cascade = plan.page_cascade,
            deletions = plan.len(),
            purged,
            "Cache invalidated"
        );

        InvalidationReport { plan, purged }
    }

    /// String-typed entry point for callers outside the type system.
    ///
    /// Unknown change types are a logged no-op and leave the stats untouched.
    pub async fn invalidate_cache_str(
        &self,
        change_type: &str,
        store_id: &str,
        entity_id: Option<&str>,
        path: Option<&str>,
    ) -> Option<InvalidationReport> {
        match change_type.parse::<ChangeType>() {
            Ok(change) => Some(
                self.invalidate_cache(change, store_id, entity_id, path)
                    .await,
            ),
            Err(err) => {
                warn!(change_type, store_id, error = %err, "Ignoring unknown change type");
                None
            }
        }
    }

    /// Remove everything cached for a store.
    pub async fn invalidate_store_cache(&self, store_id: &str) -> usize {
        info!(store_id, "Invalidating all cache for store");
        self.manager.invalidate_store_cache(store_id).await
    }

    pub async fn invalidate_product_cache(&self, store_id: &str, product_id: &str) -> usize {
        info!(store_id, product_id, "Invalidating product cache");
        self.manager
            .invalidate_product_cache(store_id, product_id)
            .await
    }

    pub fn stats(&self) -> InvalidationStats {
        self.stats.snapshot()
    }

    async fn apply(&self, purge: &Purge) -> usize {
        let removed = match purge {
            Purge::Key(key) => self.manager.delete_key(key).await,
            Purge::Prefix(prefix) => self.manager.delete_by_prefix(prefix).await,
        };
        debug!(%purge, removed, "Applied purge");
        removed
    }
}
