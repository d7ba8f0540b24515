use std::path::PathBuf;

use thiserror::Error;

use crate::infra::storage::StorageError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("illegal local directory `{}`: only directories within `{}` are allowed", .dir.display(), .root.display())]
    IllegalDirectory { dir: PathBuf, root: PathBuf },
    #[error("local directory `{}` does not exist", .0.display())]
    DirectoryNotFound(PathBuf),
    #[error("configuration error: {message}")]
    Configuration { message: String },
    #[error("synchronizer is not active")]
    NotActive,
    #[error("unsafe path `{}`", .0.display())]
    UnsafePath(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("file watcher failed: {0}")]
    Watch(#[from] notify::Error),
}

impl SyncError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
