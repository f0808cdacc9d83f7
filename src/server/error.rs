//! Server error types and HTTP status mapping

use std::net::SocketAddr;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::core::error::SyncError;
use crate::store::StoreError;

/// Errors from running the listener itself
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Server bind failed on {addr}: {reason}")]
    BindFailed { addr: SocketAddr, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {reason}")]
    Internal { reason: String },
}

/// HTTP status for a sync failure
pub fn status_code(err: &SyncError) -> StatusCode {
    match err {
        SyncError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        SyncError::ManifestConflict(_) => StatusCode::CONFLICT,
        SyncError::NoApplicationAvailable => StatusCode::PRECONDITION_FAILED,
        SyncError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        SyncError::Store(StoreError::AppNotFound { .. }) => StatusCode::PRECONDITION_FAILED,
        SyncError::Store(e) if e.is_invalid_input() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = status_code(&self);
        match self {
            SyncError::MethodNotAllowed => (status, "Method Not Allowed\n").into_response(),
            SyncError::ManifestConflict(snapshot) => (status, Json(*snapshot)).into_response(),
            SyncError::NoApplicationAvailable => (status, "No apps available\n").into_response(),
            other => {
                if status.is_server_error() {
                    tracing::error!("Request failed: {}", other);
                } else {
                    tracing::warn!("Request rejected: {}", other);
                }
                (status, format!("{}\n", other)).into_response()
            }
        }
    }
}
