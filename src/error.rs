use thiserror::Error;

use crate::{config::LoadError, infra::error::InfraError, sync::SyncError};

/// Top-level error of the `vitrina` binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("output could not be encoded: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl AppError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) | AppError::Sync(SyncError::Configuration { .. }) => 78,
            AppError::Sync(SyncError::IllegalDirectory { .. } | SyncError::DirectoryNotFound(_)) => {
                66
            }
            _ => 1,
        }
    }
}
