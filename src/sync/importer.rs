//! Single-file import
//!
//! Streams one request body into a staged file and commits it into the
//! application's asset store.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::conflict::ConflictGuard;
use super::session::{PushNotifier, PushScope};
use super::staging::{discard, pipe_to_file, StagingArea, TransferLimits};
use super::transport::ChunkSource;
use crate::core::error::{Result, SyncError};
use crate::core::types::{commit_path, ManifestEtag};
use crate::store::{validate_asset_path, Application};

/// Parameters of a put-file request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutFileRequest {
    /// Destination path relative to the application root
    pub path: String,
    /// ETag to record for the file
    pub etag: String,
    /// Manifest version the client believes is current
    pub manifest_etag: Option<String>,
    /// Total bytes of the push this request starts
    pub expect_bytes: Option<u64>,
}

impl PutFileRequest {
    pub fn validate(&self) -> Result<()> {
        if self.path.is_empty() || self.etag.is_empty() {
            return Err(SyncError::bad_request(
                "Request is missing path or etag query params",
            ));
        }
        validate_asset_path(&self.path).map_err(|e| SyncError::bad_request(e.to_string()))?;
        Ok(())
    }
}

/// Commit a staged file into `app`'s store
///
/// The generated bootstrap plugin list is stored under its renamed sibling.
pub async fn commit_file(app: &Application, source: &Path, dest: &str, etag: &str) -> Result<()> {
    let target = commit_path(dest);
    tracing::info!("Adding file: {} to {}", target, app.id());
    app.store().add_file(source, target, etag).await?;
    Ok(())
}

/// Imports single files pushed with `/putfile`
#[derive(Debug, Clone)]
pub struct SingleFileImporter {
    guard: ConflictGuard,
    staging: StagingArea,
    limits: TransferLimits,
    notifier: PushNotifier,
}

impl SingleFileImporter {
    pub fn new(
        guard: ConflictGuard,
        staging: StagingArea,
        limits: TransferLimits,
        notifier: PushNotifier,
    ) -> Self {
        Self {
            guard,
            staging,
            limits,
            notifier,
        }
    }

    /// Import one file and return the manifest version after the commit
    pub async fn put_file<C>(
        &self,
        app: &Application,
        request: &PutFileRequest,
        body: &mut C,
    ) -> Result<ManifestEtag>
    where
        C: ChunkSource + ?Sized,
    {
        request.validate()?;

        let _push = app.lock_for_push().await;
        if app.is_removed() {
            return Err(SyncError::NoApplicationAvailable);
        }
        self.guard.check(app, request.manifest_etag.as_deref()).await?;

        let declared = body.content_length();
        let scope = PushScope::begin(
            app,
            request.expect_bytes.or(declared),
            request.expect_bytes.is_some(),
        );

        let received = self.transfer(app, request, body).await?;
        scope.complete(declared.unwrap_or(received), &self.notifier);

        Ok(ManifestEtag::new(app.store().manifest_etag().await))
    }

    async fn transfer<C>(
        &self,
        app: &Application,
        request: &PutFileRequest,
        body: &mut C,
    ) -> Result<u64>
    where
        C: ChunkSource + ?Sized,
    {
        let staged = self.staging.stage_file().await?;

        let result = async {
            let received = pipe_to_file(body, &staged, &self.limits).await?;
            commit_file(app, staged.path(), &request.path, &request.etag).await?;
            Ok::<u64, SyncError>(received)
        }
        .await;

        discard(Some(staged), None).await;
        if let Err(ref e) = result {
            tracing::error!("Put file {} for {} failed: {}", request.path, app.id(), e);
        }
        result
    }
}
