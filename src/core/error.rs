//! Error types for the sync core
//!
//! Every variant maps onto one HTTP status in the server layer.

use thiserror::Error;

use super::types::ManifestSnapshot;
use crate::store::StoreError;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for push and manifest operations
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// The caller's manifest version is stale; carries the current state
    #[error("Manifest conflict: current version is '{}'", .0.asset_manifest_etag)]
    ManifestConflict(Box<ManifestSnapshot>),

    #[error("No application available")]
    NoApplicationAvailable,

    #[error("Bad request: {reason}")]
    BadRequest { reason: String },

    #[error("Transfer failed: {reason}")]
    TransferFailure { reason: String },

    #[error("Transfer timed out after {timeout_ms}ms waiting for body data")]
    TransferTimeout { timeout_ms: u64 },

    #[error("Archive extraction failed: {reason}")]
    Extraction { reason: String },

    #[error("Asset store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    pub fn bad_request(reason: impl Into<String>) -> Self {
        SyncError::BadRequest {
            reason: reason.into(),
        }
    }

    pub fn transfer(reason: impl Into<String>) -> Self {
        SyncError::TransferFailure {
            reason: reason.into(),
        }
    }

    /// Check if this error was raised before any state was touched
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SyncError::MethodNotAllowed
                | SyncError::ManifestConflict(_)
                | SyncError::NoApplicationAvailable
                | SyncError::BadRequest { .. }
        )
    }

    /// Check if this error happened while moving bytes into the store
    pub fn is_transfer_failure(&self) -> bool {
        !self.is_client_error()
    }
}
