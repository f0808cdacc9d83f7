//! Zip bundle import
//!
//! A zip push carries a whole set of assets plus an embedded
//! `zipassetmanifest.json` mapping each path to `{"etag": ...}`. Entries are
//! committed one at a time in the order the manifest lists them, so a failure
//! part way leaves a deterministic prefix applied.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use super::conflict::ConflictGuard;
use super::importer::commit_file;
use super::session::{PushNotifier, PushScope, UpdateSession};
use super::staging::{discard, pipe_to_file, StagingArea, TransferLimits};
use super::transport::ChunkSource;
use crate::core::error::{Result, SyncError};
use crate::core::types::ManifestEtag;
use crate::store::{validate_asset_path, Application, ArchiveExtractor};

/// Manifest embedded at the root of every pushed archive
pub const ZIP_MANIFEST_FILE: &str = "zipassetmanifest.json";

/// One entry of the embedded archive manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkManifestEntry {
    pub etag: String,
}

/// Parameters of a zip-push request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipPushRequest {
    pub manifest_etag: Option<String>,
    pub expect_bytes: Option<u64>,
}

/// Read the embedded manifest of an extracted archive, keeping document order
pub async fn read_zip_manifest(dir: &Path) -> Result<Vec<(String, BulkManifestEntry)>> {
    let raw = tokio::fs::read(dir.join(ZIP_MANIFEST_FILE))
        .await
        .map_err(|e| SyncError::transfer(format!("cannot read {}: {}", ZIP_MANIFEST_FILE, e)))?;

    let entries: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&raw)?;
    entries
        .into_iter()
        .map(|(path, value)| -> Result<(String, BulkManifestEntry)> {
            Ok((path, serde_json::from_value(value)?))
        })
        .collect()
}

/// Imports archives pushed with `/zippush`
#[derive(Clone)]
pub struct BulkImporter {
    guard: ConflictGuard,
    staging: StagingArea,
    limits: TransferLimits,
    notifier: PushNotifier,
    extractor: Arc<dyn ArchiveExtractor>,
}

impl BulkImporter {
    pub fn new(
        guard: ConflictGuard,
        staging: StagingArea,
        limits: TransferLimits,
        notifier: PushNotifier,
        extractor: Arc<dyn ArchiveExtractor>,
    ) -> Self {
        Self {
            guard,
            staging,
            limits,
            notifier,
            extractor,
        }
    }

    /// Import every entry of the pushed archive and return the resulting manifest version
    ///
    /// The push session always ends `Idle` once this returns.
    pub async fn zip_push<C>(
        &self,
        app: &Application,
        request: &ZipPushRequest,
        body: &mut C,
    ) -> Result<ManifestEtag>
    where
        C: ChunkSource + ?Sized,
    {
        let _push = app.lock_for_push().await;
        if app.is_removed() {
            return Err(SyncError::NoApplicationAvailable);
        }

        let outcome = self.run(app, request, body).await;
        app.with_session(UpdateSession::reset);

        if let Err(ref e) = outcome {
            tracing::error!("Zip push for {} failed: {}", app.id(), e);
        }
        outcome
    }

    async fn run<C>(
        &self,
        app: &Application,
        request: &ZipPushRequest,
        body: &mut C,
    ) -> Result<ManifestEtag>
    where
        C: ChunkSource + ?Sized,
    {
        self.guard.check(app, request.manifest_etag.as_deref()).await?;

        let declared = body.content_length();
        let scope = PushScope::begin(
            app,
            request.expect_bytes.or(declared),
            request.expect_bytes.is_some(),
        );

        let received = self.import_archive(app, body).await?;
        scope.complete(declared.unwrap_or(received), &self.notifier);

        Ok(ManifestEtag::new(app.store().manifest_etag().await))
    }

    async fn import_archive<C>(&self, app: &Application, body: &mut C) -> Result<u64>
    where
        C: ChunkSource + ?Sized,
    {
        let archive = self.staging.stage_file().await?;
        let extract_dir = match self.staging.stage_dir().await {
            Ok(dir) => dir,
            Err(e) => {
                discard(Some(archive), None).await;
                return Err(e.into());
            }
        };

        let result = async {
            let received = pipe_to_file(body, &archive, &self.limits).await?;

            tracing::info!("Extracting update zip for {} ({} bytes)", app.id(), received);
            self.extractor
                .extract(archive.path(), extract_dir.path())
                .await
                .map_err(|e| SyncError::Extraction {
                    reason: e.to_string(),
                })?;

            let entries = read_zip_manifest(extract_dir.path()).await?;
            for (path, entry) in &entries {
                let relative = validate_asset_path(path).map_err(|e| {
                    SyncError::transfer(format!("archive manifest entry rejected: {}", e))
                })?;
                commit_file(app, &extract_dir.path().join(relative), path, &entry.etag).await?;
            }

            tracing::info!("Imported {} file(s) into {}", entries.len(), app.id());
            Ok::<u64, SyncError>(received)
        }
        .await;

        discard(Some(archive), Some(extract_dir)).await;
        result
    }
}

impl std::fmt::Debug for BulkImporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkImporter")
            .field("staging", &self.staging)
            .field("limits", &self.limits)
            .finish()
    }
}
