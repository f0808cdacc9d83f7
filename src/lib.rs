//! harness-sync - asset push server for app harness development
//!
//! This crate lets a development tool on the local network push assets into
//! applications installed in a harness:
//! - Versioned per-application asset manifests with conflict detection
//! - Streamed single-file pushes and ordered zip bundle pushes
//! - Push sessions with progress reporting
//! - Application install, launch and uninstall
//! - Layered configuration and structured logging

pub mod core;
pub mod logging;
pub mod server;
pub mod store;
pub mod sync;

#[cfg(test)]
mod test_support;

// Re-export commonly used items
pub use crate::core::config::HarnessConfig;
pub use crate::core::error::{Result, SyncError};
pub use crate::server::{HarnessServer, RunningServer, ServerError};
pub use crate::store::{AppRegistry, AssetStore, FsAssetStore, LocalAppRegistry, ZipExtractor};
pub use crate::sync::{SyncOptions, SyncService};
