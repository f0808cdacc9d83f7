//! Local application registry
//!
//! Every application is a sub-directory of the apps root holding an
//! `app.json` metadata file and an [`FsAssetStore`] under `store/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock as SyncRwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::app::{AppHandle, Application};
use super::error::{StoreError, StoreResult};
use super::fs::FsAssetStore;
use super::traits::AppRegistry;

pub const APP_METADATA_FILE: &str = "app.json";
pub const APP_STORE_DIR: &str = "store";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppMetadata {
    app_id: String,
    app_type: String,
    installed_at: DateTime<Utc>,
}

/// Registry of applications installed on this machine
pub struct LocalAppRegistry {
    apps_root: PathBuf,
    apps: RwLock<Vec<(AppHandle, DateTime<Utc>)>>,
    active_app: SyncRwLock<Option<String>>,
}

impl LocalAppRegistry {
    /// Open the registry, loading every application found under `apps_root`
    pub async fn open(apps_root: impl Into<PathBuf>) -> StoreResult<Self> {
        let apps_root = apps_root.into();
        tokio::fs::create_dir_all(&apps_root).await?;

        let mut apps = Vec::new();
        let mut entries = tokio::fs::read_dir(&apps_root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let metadata_path = entry.path().join(APP_METADATA_FILE);
            let raw = match tokio::fs::read(&metadata_path).await {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!("Skipping {:?}: no {}", entry.path(), APP_METADATA_FILE);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let metadata: AppMetadata = serde_json::from_slice(&raw)?;
            let store = FsAssetStore::open(entry.path().join(APP_STORE_DIR)).await?;
            apps.push((
                Application::new(metadata.app_id, metadata.app_type, Arc::new(store)),
                metadata.installed_at,
            ));
        }

        apps.sort_by(|(a, a_at), (b, b_at)| a_at.cmp(b_at).then_with(|| a.id().cmp(b.id())));
        tracing::info!("Loaded {} application(s) from {:?}", apps.len(), apps_root);

        Ok(Self {
            apps_root,
            apps: RwLock::new(apps),
            active_app: SyncRwLock::new(None),
        })
    }

    pub fn apps_root(&self) -> &Path {
        &self.apps_root
    }

    /// Install an empty application
    pub async fn install(&self, app_id: &str, app_type: &str) -> StoreResult<AppHandle> {
        let mut apps = self.apps.write().await;
        if let Some((app, _)) = apps.iter().find(|(app, _)| app.id() == app_id) {
            return Ok(app.clone());
        }

        let app_dir = self.app_dir(app_id)?;
        tokio::fs::create_dir_all(&app_dir).await?;

        let metadata = AppMetadata {
            app_id: app_id.to_string(),
            app_type: app_type.to_string(),
            installed_at: Utc::now(),
        };
        tokio::fs::write(
            app_dir.join(APP_METADATA_FILE),
            serde_json::to_vec_pretty(&metadata)?,
        )
        .await?;

        let store = FsAssetStore::open(app_dir.join(APP_STORE_DIR)).await?;
        let app = Application::new(app_id, app_type, Arc::new(store));
        apps.push((app.clone(), metadata.installed_at));

        tracing::info!("Installed application {} ({})", app_id, app_type);
        Ok(app)
    }

    fn app_dir(&self, app_id: &str) -> StoreResult<PathBuf> {
        let valid = !app_id.is_empty()
            && !app_id.starts_with('.')
            && app_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if !valid {
            return Err(StoreError::InvalidAppId {
                app_id: app_id.to_string(),
            });
        }
        Ok(self.apps_root.join(app_id))
    }

    async fn remove(&self, app: &AppHandle) -> StoreResult<()> {
        // Wait for any push to this application to finish first
        let _push = app.lock_for_push().await;
        if !app.mark_removed() {
            return Ok(());
        }

        self.apps
            .write()
            .await
            .retain(|(a, _)| !Arc::ptr_eq(a, app));
        {
            let mut active = self.active_app.write();
            if active.as_deref() == Some(app.id()) {
                *active = None;
            }
        }

        match tokio::fs::remove_dir_all(self.app_dir(app.id())?).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!("Uninstalled application {}", app.id());
        Ok(())
    }
}

#[async_trait]
impl AppRegistry for LocalAppRegistry {
    async fn get_app_by_id(&self, app_id: Option<&str>) -> Option<AppHandle> {
        let apps = self.apps.read().await;
        let entry = match app_id {
            Some(id) => apps.iter().find(|(app, _)| app.id() == id),
            None => apps.first(),
        };
        entry.map(|(app, _)| app.clone())
    }

    async fn get_or_install(
        &self,
        app_id: Option<&str>,
        app_type: &str,
    ) -> StoreResult<Option<AppHandle>> {
        match app_id {
            Some(id) => {
                if let Some(app) = self.get_app_by_id(Some(id)).await {
                    return Ok(Some(app));
                }
                self.install(id, app_type).await.map(Some)
            }
            None => Ok(self.get_app_by_id(None).await),
        }
    }

    async fn list_apps(&self) -> Vec<AppHandle> {
        self.apps
            .read()
            .await
            .iter()
            .map(|(app, _)| app.clone())
            .collect()
    }

    async fn active_app(&self) -> Option<AppHandle> {
        let active = self.active_app.read().clone()?;
        self.get_app_by_id(Some(&active)).await
    }

    async fn launch_app(&self, app: &AppHandle) -> StoreResult<()> {
        if self.get_app_by_id(Some(app.id())).await.is_none() {
            return Err(StoreError::AppNotFound {
                app_id: app.id().to_string(),
            });
        }
        *self.active_app.write() = Some(app.id().to_string());
        tracing::info!("Launching application {}", app.id());
        Ok(())
    }

    async fn uninstall_app(&self, app: &AppHandle) -> StoreResult<()> {
        self.remove(app).await
    }

    async fn uninstall_all(&self) -> StoreResult<()> {
        for app in self.list_apps().await {
            self.remove(&app).await?;
        }
        Ok(())
    }
}
