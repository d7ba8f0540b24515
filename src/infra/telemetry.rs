use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::metric_names as cache_metrics;
use crate::config::{LogFormat, LoggingSettings};
use crate::sync::metric_names as sync_metrics;

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for every metric the crate emits. Safe to call repeatedly.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            cache_metrics::METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of cache hits."
        );
        describe_counter!(
            cache_metrics::METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of cache misses, expired entries included."
        );
        describe_counter!(
            cache_metrics::METRIC_CACHE_EVICT,
            Unit::Count,
            "Total number of cache evictions due to capacity."
        );
        describe_counter!(
            cache_metrics::METRIC_INVALIDATIONS,
            Unit::Count,
            "Total number of processed invalidation events, by change type."
        );
        describe_counter!(
            cache_metrics::METRIC_PURGED_ENTRIES,
            Unit::Count,
            "Total number of cache entries removed by invalidation."
        );
        describe_histogram!(
            cache_metrics::METRIC_INVALIDATION_MS,
            Unit::Milliseconds,
            "Invalidation latency in milliseconds."
        );
        describe_counter!(
            sync_metrics::METRIC_SYNC_EVENTS,
            Unit::Count,
            "Total number of file events handled by the synchronizer, by event and outcome."
        );
        describe_histogram!(
            sync_metrics::METRIC_SYNC_EVENT_MS,
            Unit::Milliseconds,
            "File event handling latency in milliseconds."
        );
    });
}
