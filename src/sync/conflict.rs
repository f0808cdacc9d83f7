//! Manifest version checks for mutating requests

use crate::core::config::PlatformInfo;
use crate::core::error::{Result, SyncError};
use crate::core::types::{ManifestSnapshot, EMPTY_MANIFEST_ETAG, PROTOCOL_VER};
use crate::store::Application;

/// Rejects mutations made against a stale view of an application's manifest
#[derive(Debug, Clone)]
pub struct ConflictGuard {
    platform: PlatformInfo,
}

impl ConflictGuard {
    pub fn new(platform: PlatformInfo) -> Self {
        Self { platform }
    }

    /// Full manifest state of `app`, or the empty snapshot when there is none
    pub async fn snapshot(&self, app: Option<&Application>) -> ManifestSnapshot {
        let (asset_manifest, asset_manifest_etag) = match app {
            Some(app) => {
                let manifest = app.store().manifest().await;
                (Some(manifest.files), manifest.etag)
            }
            None => (None, EMPTY_MANIFEST_ETAG.to_string()),
        };

        ManifestSnapshot {
            asset_manifest,
            asset_manifest_etag,
            platform: self.platform.platform.clone(),
            runtime_ver: self.platform.runtime_version.clone(),
            protocol_ver: PROTOCOL_VER,
        }
    }

    /// Pass when `supplied` is absent or matches the current manifest version
    ///
    /// An empty string counts as absent.
    pub async fn check(&self, app: &Application, supplied: Option<&str>) -> Result<()> {
        let Some(supplied) = supplied.filter(|etag| !etag.is_empty()) else {
            return Ok(());
        };

        let snapshot = self.snapshot(Some(app)).await;
        if snapshot.asset_manifest_etag == supplied {
            return Ok(());
        }

        tracing::info!(
            "Manifest conflict for {}: client has {}, current is {}",
            app.id(),
            supplied,
            snapshot.asset_manifest_etag
        );
        Err(SyncError::ManifestConflict(Box::new(snapshot)))
    }
}
