//! harness-sync server
//!
//! Usage: `harness-server [CONFIG_FILE]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use harness_sync::logging::{init_fallback_logging, LoggingSystem};
use harness_sync::{
    HarnessConfig, HarnessServer, LocalAppRegistry, SyncOptions, SyncService, ZipExtractor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = HarnessConfig::load(config_path.as_deref())
        .context("failed to load harness configuration")?;

    // Keep the guard alive so file logs are flushed on exit
    let _logging_system = match LoggingSystem::init(config.logging.clone()) {
        Ok(system) => Some(system),
        Err(e) => {
            eprintln!("Failed to initialize logging system: {}. Using basic logging.", e);
            init_fallback_logging();
            None
        }
    };

    tracing::info!(
        "Starting harness-sync {} (apps in {:?})",
        env!("CARGO_PKG_VERSION"),
        config.storage.apps_root
    );

    let registry = LocalAppRegistry::open(&config.storage.apps_root)
        .await
        .with_context(|| format!("failed to open apps root {:?}", config.storage.apps_root))?;
    let service = SyncService::new(
        Arc::new(registry),
        Arc::new(ZipExtractor::new()),
        SyncOptions::from_config(&config),
    );
    let server = HarnessServer::new(&config, Arc::new(service));

    server
        .start(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Shutdown requested"),
                Err(e) => {
                    tracing::error!("Failed to listen for shutdown signal: {}", e);
                    futures::future::pending::<()>().await;
                }
            }
        })
        .await?;

    Ok(())
}
