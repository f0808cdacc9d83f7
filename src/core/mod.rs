//! Core Module
//!
//! Shared building blocks for the harness:
//! - Configuration loading
//! - Error types
//! - Manifest payload types and protocol constants

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    ConfigError, HarnessConfig, PlatformInfo, ServerConfig, StorageConfig, TransferConfig,
};
pub use error::{Result, SyncError};
pub use types::{AssetManifest, ManifestEtag, ManifestSnapshot, PROTOCOL_VER};
