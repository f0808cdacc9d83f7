//! Configuration for the harness server
//!
//! Sources are layered with the `config` crate, later ones winning:
//! - Built-in defaults
//! - An optional JSON/TOML file
//! - `HARNESS__*` environment variables (`HARNESS__SERVER__PORT=2525`)

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::types::DEFAULT_APP_TYPE;
use crate::logging::LoggingConfig;

/// Port the harness listens on unless configured otherwise
pub const DEFAULT_PORT: u16 = 2424;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub platform: PlatformInfo,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind; the harness is reached from other machines on the LAN
    pub bind_address: IpAddr,
    pub port: u16,
}

/// Where applications and in-flight uploads live on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// One sub-directory per installed application
    pub apps_root: PathBuf,
    /// Staged uploads and extracted archives; `None` uses the system temp dir
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

/// Upload limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Longest wait for the next body chunk before a push is abandoned
    pub chunk_timeout_secs: u64,
    /// Largest accepted request body
    pub max_body_bytes: usize,
}

/// Identity reported to pushing clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub platform: String,
    pub runtime_version: String,
    pub harness_version: String,
    pub supported_app_types: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let apps_root = directories::ProjectDirs::from("org", "harness", "harness-sync")
            .map(|dirs| dirs.data_dir().join("apps"))
            .unwrap_or_else(|| PathBuf::from("apps"));

        Self {
            apps_root,
            staging_dir: None,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_timeout_secs: 30,
            max_body_bytes: 512 * 1024 * 1024, // 512 MB
        }
    }
}

impl TransferConfig {
    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }
}

impl Default for PlatformInfo {
    fn default() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            runtime_version: env!("CARGO_PKG_VERSION").to_string(),
            harness_version: env!("CARGO_PKG_VERSION").to_string(),
            supported_app_types: vec![DEFAULT_APP_TYPE.to_string()],
        }
    }
}

impl PlatformInfo {
    pub fn user_agent(&self) -> String {
        format!("harness-sync/{} ({})", self.harness_version, self.platform)
    }
}

impl HarnessConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let loaded: HarnessConfig = builder
            .add_source(
                config::Environment::with_prefix("HARNESS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must not be 0".to_string()));
        }
        if self.platform.supported_app_types.is_empty() {
            return Err(ConfigError::Invalid(
                "platform.supported_app_types must not be empty".to_string(),
            ));
        }
        if self.transfer.chunk_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "transfer.chunk_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
