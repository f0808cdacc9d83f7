//! Push protocol operations
//!
//! [`SyncService`] resolves the target application through the registry and
//! hands off to the importers. The HTTP layer is a thin shell around it.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::bulk::{BulkImporter, ZipPushRequest};
use super::conflict::ConflictGuard;
use super::importer::{PutFileRequest, SingleFileImporter};
use super::session::PushNotifier;
use super::staging::{StagingArea, TransferLimits};
use super::transport::ChunkSource;
use crate::core::config::{HarnessConfig, PlatformInfo};
use crate::core::error::{Result, SyncError};
use crate::core::types::{ManifestEtag, ManifestSnapshot, PROTOCOL_VER};
use crate::store::{validate_asset_path, AppHandle, AppRegistry, AppSummary, ArchiveExtractor};

/// Everything besides the collaborators needed to build a [`SyncService`]
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub platform: PlatformInfo,
    pub staging: StagingArea,
    pub limits: TransferLimits,
    pub notifier: PushNotifier,
}

impl SyncOptions {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            platform: config.platform.clone(),
            staging: StagingArea::new(config.storage.staging_dir.clone()),
            limits: TransferLimits {
                chunk_timeout: config.transfer.chunk_timeout(),
                max_bytes: config.transfer.max_body_bytes as u64,
            },
            notifier: PushNotifier::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: PushNotifier) -> Self {
        self.notifier = notifier;
        self
    }
}

/// Payload of `/info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarnessInfo {
    pub platform: String,
    pub runtime_ver: String,
    pub protocol_ver: u32,
    pub harness_ver: String,
    pub supported_app_types: Vec<String>,
    pub user_agent: String,
    pub active_app_id: Option<String>,
    pub app_list: Vec<AppSummary>,
}

/// The asset push protocol
pub struct SyncService {
    registry: Arc<dyn AppRegistry>,
    guard: ConflictGuard,
    files: SingleFileImporter,
    bulk: BulkImporter,
    platform: PlatformInfo,
}

impl SyncService {
    pub fn new(
        registry: Arc<dyn AppRegistry>,
        extractor: Arc<dyn ArchiveExtractor>,
        options: SyncOptions,
    ) -> Self {
        let guard = ConflictGuard::new(options.platform.clone());
        let files = SingleFileImporter::new(
            guard.clone(),
            options.staging.clone(),
            options.limits,
            options.notifier.clone(),
        );
        let bulk = BulkImporter::new(
            guard.clone(),
            options.staging,
            options.limits,
            options.notifier,
            extractor,
        );

        Self {
            registry,
            guard,
            files,
            bulk,
            platform: options.platform,
        }
    }

    pub fn registry(&self) -> &Arc<dyn AppRegistry> {
        &self.registry
    }

    pub fn platform(&self) -> &PlatformInfo {
        &self.platform
    }

    /// Manifest snapshot of an application (the first one when `app_id` is `None`)
    pub async fn get_manifest(&self, app_id: Option<&str>) -> ManifestSnapshot {
        let app = self.registry.get_app_by_id(app_id).await;
        self.guard.snapshot(app.as_deref()).await
    }

    /// Delete `paths` from an application's store
    ///
    /// A missing application is logged and treated as already clean.
    pub async fn delete_files(
        &self,
        app_id: Option<&str>,
        manifest_etag: Option<&str>,
        paths: &[String],
    ) -> Result<()> {
        let Some(app) = self.registry.get_app_by_id(app_id).await else {
            tracing::warn!(
                "Tried to delete files from non-existent app: {}",
                app_id.unwrap_or("<default>")
            );
            return Ok(());
        };

        for path in paths {
            validate_asset_path(path).map_err(|e| SyncError::bad_request(e.to_string()))?;
        }

        let _push = app.lock_for_push().await;
        if app.is_removed() {
            return Err(SyncError::NoApplicationAvailable);
        }
        self.guard.check(&app, manifest_etag).await?;

        for path in paths {
            tracing::info!("Deleting file: {} from {}", path, app.id());
            app.store().delete_file(path).await?;
        }
        Ok(())
    }

    /// Uninstall one application, or all of them when `all` is set
    pub async fn delete_app(&self, app_id: Option<&str>, all: bool) -> Result<()> {
        if all {
            tracing::info!("Uninstalling all applications");
            self.registry.uninstall_all().await?;
            return Ok(());
        }

        match self.registry.get_app_by_id(app_id).await {
            Some(app) => self.registry.uninstall_app(&app).await?,
            None => tracing::debug!(
                "Nothing to uninstall for {}",
                app_id.unwrap_or("<default>")
            ),
        }
        Ok(())
    }

    /// Import one file, installing the application first if it is new
    pub async fn put_file<C>(
        &self,
        app_id: Option<&str>,
        app_type: &str,
        request: &PutFileRequest,
        body: &mut C,
    ) -> Result<ManifestEtag>
    where
        C: ChunkSource + ?Sized,
    {
        request.validate()?;
        let app = self.push_target(app_id, app_type).await?;
        self.files.put_file(&app, request, body).await
    }

    /// Import an archive, installing the application first if it is new
    pub async fn zip_push<C>(
        &self,
        app_id: Option<&str>,
        app_type: &str,
        request: &ZipPushRequest,
        body: &mut C,
    ) -> Result<ManifestEtag>
    where
        C: ChunkSource + ?Sized,
    {
        let app = self.push_target(app_id, app_type).await?;
        self.bulk.zip_push(&app, request, body).await
    }

    pub async fn info(&self) -> HarnessInfo {
        let active_app_id = self
            .registry
            .active_app()
            .await
            .map(|app| app.id().to_string());
        let app_list = self
            .registry
            .list_apps()
            .await
            .iter()
            .map(|app| app.summary())
            .collect();

        HarnessInfo {
            platform: self.platform.platform.clone(),
            runtime_ver: self.platform.runtime_version.clone(),
            protocol_ver: PROTOCOL_VER,
            harness_ver: self.platform.harness_version.clone(),
            supported_app_types: self.platform.supported_app_types.clone(),
            user_agent: self.platform.user_agent(),
            active_app_id,
            app_list,
        }
    }

    /// Launch an application (the first one when `app_id` is `None`)
    pub async fn launch(&self, app_id: Option<&str>) -> Result<()> {
        let app = self
            .registry
            .get_app_by_id(app_id)
            .await
            .ok_or(SyncError::NoApplicationAvailable)?;
        self.registry.launch_app(&app).await?;
        Ok(())
    }

    async fn push_target(&self, app_id: Option<&str>, app_type: &str) -> Result<AppHandle> {
        if !self
            .platform
            .supported_app_types
            .iter()
            .any(|supported| supported == app_type)
        {
            return Err(SyncError::bad_request(format!(
                "Unsupported app type: {}",
                app_type
            )));
        }

        self.registry
            .get_or_install(app_id, app_type)
            .await?
            .ok_or(SyncError::NoApplicationAvailable)
    }
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("platform", &self.platform)
            .field("files", &self.files)
            .field("bulk", &self.bulk)
            .finish()
    }
}
