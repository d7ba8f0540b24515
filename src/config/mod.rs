//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{CliArgs, Command, GlobalOverrides, PlanArgs, SyncArgs, SyncTarget, WatchArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "vitrina";
const DEFAULT_CACHE_CAPACITY: usize = 10_000;
const DEFAULT_REGION: &str = "us-east-2";
const DEFAULT_STABILITY_THRESHOLD_MS: u64 = 300;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_RECENT_CHANGES_LIMIT: usize = 50;
const DEFAULT_STORAGE_ROOT: &str = "storage";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub sync: SyncSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub capacity: NonZeroUsize,
    pub development: bool,
    pub dev_cache_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Every synchronized directory must resolve inside this root.
    pub sandbox_root: PathBuf,
    pub bucket_name: Option<String>,
    pub region: String,
    /// Quiet period a file must observe before its event is delivered.
    pub stability_threshold: Duration,
    pub poll_interval: Duration,
    /// Skip the `add` events of the initial scan.
    pub ignore_initial: bool,
    pub recent_changes_limit: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub root: PathBuf,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("VITRINA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_global_overrides(&cli.overrides);
    if let Some(target) = cli.command.sync_target() {
        raw.apply_sync_target(target);
    }
    if matches!(cli.command, Command::Sync(_)) {
        raw.sync.ignore_initial = Some(true);
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    sync: RawSyncSettings,
    storage: RawStorageSettings,
}

impl RawSettings {
    fn apply_global_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(root) = overrides.storage_root.as_ref() {
            self.storage.root = Some(root.clone());
        }
        if let Some(root) = overrides.sandbox_root.as_ref() {
            self.sync.sandbox_root = Some(root.clone());
        }
    }

    fn apply_sync_target(&mut self, target: &SyncTarget) {
        if let Some(bucket) = target.bucket.as_ref() {
            self.sync.bucket_name = Some(bucket.clone());
        }
        if let Some(region) = target.region.as_ref() {
            self.sync.region = Some(region.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            sync,
            storage,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let sync = build_sync_settings(sync)?;
        let storage = build_storage_settings(storage)?;

        Ok(Self {
            logging,
            cache,
            sync,
            storage,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let capacity = non_zero_usize(
        cache.capacity.unwrap_or(DEFAULT_CACHE_CAPACITY as u64),
        "cache.capacity",
    )?;

    Ok(CacheSettings {
        capacity,
        development: cache.development.unwrap_or(false),
        dev_cache_enabled: cache.dev_cache_enabled.unwrap_or(true),
    })
}

fn build_sync_settings(sync: RawSyncSettings) -> Result<SyncSettings, LoadError> {
    let sandbox_root = match sync.sandbox_root {
        Some(root) if root.as_os_str().is_empty() => {
            return Err(LoadError::invalid(
                "sync.sandbox_root",
                "path must not be empty",
            ));
        }
        Some(root) => root,
        None => std::env::current_dir().map_err(|err| {
            LoadError::invalid(
                "sync.sandbox_root",
                format!("failed to resolve current directory: {err}"),
            )
        })?,
    };

    let bucket_name = sync.bucket_name.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let region = sync
        .region
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_REGION.to_string());

    let stability_ms = sync
        .stability_threshold_ms
        .unwrap_or(DEFAULT_STABILITY_THRESHOLD_MS);

    let poll_ms = sync.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
    if poll_ms == 0 {
        return Err(LoadError::invalid(
            "sync.poll_interval_ms",
            "must be greater than zero",
        ));
    }

    let recent_changes_limit = non_zero_usize(
        sync.recent_changes_limit
            .unwrap_or(DEFAULT_RECENT_CHANGES_LIMIT as u64),
        "sync.recent_changes_limit",
    )?;

    Ok(SyncSettings {
        sandbox_root,
        bucket_name,
        region,
        stability_threshold: Duration::from_millis(stability_ms),
        poll_interval: Duration::from_millis(poll_ms),
        ignore_initial: sync.ignore_initial.unwrap_or(false),
        recent_changes_limit,
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let root = storage
        .root
        .unwrap_or_else(|| Path::new(DEFAULT_STORAGE_ROOT).to_path_buf());
    if root.as_os_str().is_empty() {
        return Err(LoadError::invalid("storage.root", "path must not be empty"));
    }

    Ok(StorageSettings { root })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    capacity: Option<u64>,
    development: Option<bool>,
    dev_cache_enabled: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSyncSettings {
    sandbox_root: Option<PathBuf>,
    bucket_name: Option<String>,
    region: Option<String>,
    stability_threshold_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    ignore_initial: Option<bool>,
    recent_changes_limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    root: Option<PathBuf>,
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
