//! Staged temporary resources
//!
//! Uploads land in a staged file (and archives in a staged directory) before
//! anything is committed to an asset store. Staged resources are `tempfile`
//! guards: they are removed when dropped, which covers early returns, errors
//! and cancelled requests. [`discard`] removes them eagerly so the caller can
//! observe and log failures.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use tokio::io::AsyncWriteExt;

use super::transport::ChunkSource;
use crate::core::error::{Result, SyncError};

const STAGING_PREFIX: &str = "push-";

/// Where staged resources are created
#[derive(Debug, Clone, Default)]
pub struct StagingArea {
    dir: Option<PathBuf>,
}

impl StagingArea {
    /// `None` stages under the system temp directory
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub async fn stage_file(&self) -> io::Result<NamedTempFile> {
        let dir = self.dir();
        run_blocking(move || {
            std::fs::create_dir_all(&dir)?;
            tempfile::Builder::new()
                .prefix(STAGING_PREFIX)
                .suffix(".part")
                .tempfile_in(dir)
        })
        .await
    }

    pub async fn stage_dir(&self) -> io::Result<TempDir> {
        let dir = self.dir();
        run_blocking(move || {
            std::fs::create_dir_all(&dir)?;
            tempfile::Builder::new().prefix(STAGING_PREFIX).tempdir_in(dir)
        })
        .await
    }
}

async fn run_blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

/// Bounds applied while streaming a request body
#[derive(Debug, Clone, Copy)]
pub struct TransferLimits {
    pub chunk_timeout: Duration,
    pub max_bytes: u64,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            chunk_timeout: Duration::from_secs(30),
            max_bytes: u64::MAX,
        }
    }
}

/// Stream `source` into the staged file, returning the number of bytes written
///
/// Every chunk read is bounded by `limits.chunk_timeout`.
pub async fn pipe_to_file<C>(
    source: &mut C,
    staged: &NamedTempFile,
    limits: &TransferLimits,
) -> Result<u64>
where
    C: ChunkSource + ?Sized,
{
    let mut file = tokio::fs::File::from_std(staged.reopen()?);
    let mut written: u64 = 0;

    loop {
        let chunk = tokio::time::timeout(limits.chunk_timeout, source.next_chunk())
            .await
            .map_err(|_| SyncError::TransferTimeout {
                timeout_ms: limits.chunk_timeout.as_millis() as u64,
            })??;

        let Some(chunk) = chunk else {
            break;
        };

        written += chunk.len() as u64;
        if written > limits.max_bytes {
            return Err(SyncError::transfer(format!(
                "body exceeds the {} byte limit",
                limits.max_bytes
            )));
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    tracing::debug!("Staged {} bytes at {:?}", written, staged.path());
    Ok(written)
}

/// Remove staged resources now, logging anything that could not be deleted
pub async fn discard(file: Option<NamedTempFile>, dir: Option<TempDir>) {
    let result = tokio::task::spawn_blocking(move || {
        if let Some(file) = file {
            let path = file.path().to_path_buf();
            if let Err(e) = file.close() {
                tracing::warn!("Failed to delete staged file {:?}: {}", path, e);
            }
        }
        if let Some(dir) = dir {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!("Failed to delete staged directory {:?}: {}", path, e);
            }
        }
    })
    .await;

    if let Err(e) = result {
        tracing::error!("Staged resource cleanup task failed: {}", e);
    }
}
