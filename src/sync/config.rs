//! Synchronizer configuration.

use std::path::PathBuf;
use std::time::Duration;

use super::changes::DEFAULT_RECENT_CHANGES_LIMIT;

const DEFAULT_REGION: &str = "us-east-2";
const DEFAULT_STABILITY_THRESHOLD: Duration = Duration::from_millis(300);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Every synchronized directory must resolve inside this root.
    pub sandbox_root: PathBuf,
    /// Bucket used when `start` does not name one.
    pub bucket_name: Option<String>,
    pub region: String,
    pub watch: WatchConfig,
    pub recent_changes_limit: usize,
}

/// Watcher tuning.
#[derive(Debug, Clone, Copy)]
pub struct WatchConfig {
    /// A file must stay unchanged this long before its event is delivered.
    pub stability_threshold: Duration,
    /// How often pending files are re-examined.
    pub poll_interval: Duration,
    /// Skip the `add` events of the initial scan.
    pub ignore_initial: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            stability_threshold: DEFAULT_STABILITY_THRESHOLD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            ignore_initial: false,
        }
    }
}

impl SyncConfig {
    pub fn new(sandbox_root: impl Into<PathBuf>) -> Self {
        Self {
            sandbox_root: sandbox_root.into(),
            bucket_name: None,
            region: DEFAULT_REGION.to_string(),
            watch: WatchConfig::default(),
            recent_changes_limit: DEFAULT_RECENT_CHANGES_LIMIT,
        }
    }

    pub fn with_bucket(mut self, bucket_name: impl Into<String>) -> Self {
        self.bucket_name = Some(bucket_name.into());
        self
    }
}

impl From<&crate::config::SyncSettings> for SyncConfig {
    fn from(settings: &crate::config::SyncSettings) -> Self {
        Self {
            sandbox_root: settings.sandbox_root.clone(),
            bucket_name: settings.bucket_name.clone(),
            region: settings.region.clone(),
            watch: WatchConfig {
                stability_threshold: settings.stability_threshold,
                poll_interval: settings.poll_interval,
                ignore_initial: settings.ignore_initial,
            },
            recent_changes_limit: settings.recent_changes_limit.get(),
        }
    }
}
