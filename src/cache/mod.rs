//! Vitrina Cache System
//!
//! Storefront cache and the invalidation engine that keeps it honest:
//!
//! - **Key namespace** (`keys`): the only place cache keys are spelled out
//! - **Manager** (`CacheManager`): non-failing facade over a `CacheStore`
//! - **Invalidation** (`CacheInvalidationService`): change event → plan → purge
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `vitrina.toml`:
//!
//! ```toml
//! [cache]
//! capacity = 10000
//! development = false
//! dev_cache_enabled = true
//! ```

mod config;
mod invalidation;
pub mod keys;
mod lock;
mod manager;
mod planner;
mod rules;
mod store;

pub(crate) use lock::{mutex_lock, rw_read, rw_write};

pub use config::{CacheConfig, TtlCategory, TtlPolicy};
pub use invalidation::{CacheInvalidationService, InvalidationReport, InvalidationStats};
pub use manager::CacheManager;
pub use planner::{
    InvalidationPlan, InvalidationRequest, Purge, entity_purges, path_cascade, path_purges,
    pattern_purge, pattern_purges, template_type,
};
pub use rules::{ChangeType, InvalidationRule, PatternTag, UnknownChangeType, rule};
pub use store::{CacheStats, CacheStore, CacheStoreError, MemoryCacheStore};

pub(crate) mod metric_names {
    pub(crate) use super::invalidation::{
        METRIC_INVALIDATION_MS, METRIC_INVALIDATIONS, METRIC_PURGED_ENTRIES,
    };
    pub(crate) use super::store::{METRIC_CACHE_EVICT, METRIC_CACHE_HIT, METRIC_CACHE_MISS};
}
