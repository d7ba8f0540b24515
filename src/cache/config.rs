//! Cache configuration.
//!
//! Controls store capacity, development toggles and the TTL policy via
//! `vitrina.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_CAPACITY: usize = 10_000;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

const DEV_TTL: Duration = Duration::from_secs(30 * 60);

/// Cache configuration from `vitrina.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries held by the in-memory store before LRU eviction.
    pub capacity: usize,
    /// Development mode: uniform TTLs and the dev cache toggle apply.
    pub development: bool,
    /// In development mode, whether reads and writes hit the cache at all.
    pub dev_cache_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            development: false,
            dev_cache_enabled: true,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            capacity: settings.capacity.get(),
            development: settings.development,
            dev_cache_enabled: settings.dev_cache_enabled,
        }
    }
}

impl CacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// TTL policy matching this configuration.
    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            development: self.development,
        }
    }
}

/// Top-level grouping of cached artifacts for TTL purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlCategory {
    /// API data: product lists, searches, carts, navigation.
    Data,
    /// Raw and compiled templates.
    Template,
    /// Rendered HTML.
    Page,
    /// Domain → store resolution.
    Domain,
}

/// Per-category TTLs with per-type overrides.
///
/// A zero TTL means the entry must not be cached.
#[derive(Debug, Clone, Copy, Default)]
pub struct TtlPolicy {
    development: bool,
}

impl TtlPolicy {
    pub fn ttl(&self, category: TtlCategory, kind: Option<&str>) -> Duration {
        if self.development {
            return DEV_TTL;
        }

        let override_ttl = kind.and_then(|kind| match (category, kind) {
            (TtlCategory::Data, "search") => Some(10 * MINUTE),
            (TtlCategory::Data, "cart") => Some(5 * MINUTE),
            (TtlCategory::Data, "navigation") => Some(30 * MINUTE),
            (TtlCategory::Page, "index") => Some(15 * MINUTE),
            (TtlCategory::Page, "product") => Some(HOUR),
            (TtlCategory::Page, "collection") => Some(45 * MINUTE),
            (TtlCategory::Page, "policies") => Some(DAY),
            (TtlCategory::Page, "cart") => Some(Duration::ZERO),
            (TtlCategory::Page, "404") => Some(DAY),
            _ => None,
        });

        override_ttl.unwrap_or(match category {
            TtlCategory::Data => 15 * MINUTE,
            TtlCategory::Template => HOUR,
            TtlCategory::Page => 30 * MINUTE,
            TtlCategory::Domain => 30 * MINUTE,
        })
    }
}
