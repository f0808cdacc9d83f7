//! Asset store error types

use thiserror::Error;

/// Error type for asset store, registry and extractor operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid asset path '{path}'")]
    InvalidPath { path: String },

    #[error("Invalid application id '{app_id}'")]
    InvalidAppId { app_id: String },

    #[error("Application not found: {app_id}")]
    AppNotFound { app_id: String },

    #[error("Archive error: {reason}")]
    Archive { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Manifest serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal store error: {reason}")]
    Internal { reason: String },
}

impl StoreError {
    /// Check if the caller supplied a bad path or id
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidPath { .. } | StoreError::InvalidAppId { .. }
        )
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Internal {
            reason: format!("blocking task failed: {}", err),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
