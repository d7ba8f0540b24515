//! Template Dev Synchronizer
//!
//! Live mirroring of a local theme directory into object storage:
//!
//! - **Sandbox** (`paths`): every directory and file is checked against a
//!   single configured root before it is touched
//! - **Watcher** (`DirectoryWatcher`): add/change/unlink events, delivered
//!   once a file has stopped changing
//! - **Synchronizer** (`TemplateDevSynchronizer`): upload or delete, then
//!   invalidate the template and page caches
//!
//! ## Configuration
//!
//! ```toml
//! [sync]
//! sandbox_root = "/home/dev/templates"
//! bucket_name = "storefront-templates"
//! stability_threshold_ms = 300
//! poll_interval_ms = 100
//! ```

mod assets;
mod changes;
mod config;
mod content;
mod error;
pub mod paths;
mod synchronizer;
mod watcher;

pub use assets::{
    AssetError, AssetProcessor, ProcessedAsset, StandardAssetProcessor, is_processable_asset,
};
pub use changes::{DEFAULT_RECENT_CHANGES_LIMIT, FileChange, FileEvent, RecentChanges};
pub use config::{SyncConfig, WatchConfig};
pub use content::{content_type, is_binary_content_type, is_binary_path};
pub use error::SyncError;
pub use paths::is_safe_path;
pub use synchronizer::{ActiveTarget, ChangeObserver, SyncOptions, TemplateDevSynchronizer};
pub use watcher::{DirectoryWatcher, WatchEvent, walk_files};

pub(crate) mod metric_names {
    pub(crate) use super::synchronizer::{METRIC_SYNC_EVENT_MS, METRIC_SYNC_EVENTS};
}
