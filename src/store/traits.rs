//! Capabilities the sync core is built against
//!
//! The core never touches application storage directly; it is handed
//! implementations of these traits at construction time.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use super::app::AppHandle;
use super::error::{StoreError, StoreResult};
use crate::core::types::AssetManifest;

/// Manifest mapping together with the version it was read at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreManifest {
    pub files: AssetManifest,
    pub etag: String,
}

/// Per-application asset storage with ETag bookkeeping
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Current mapping and manifest version, read atomically
    async fn manifest(&self) -> StoreManifest;

    /// Current manifest version
    async fn manifest_etag(&self) -> String;

    /// Copy `source` into the store at `dest`, recording `etag` for it
    async fn add_file(&self, source: &Path, dest: &str, etag: &str) -> StoreResult<()>;

    /// Remove `path` from the store; unknown paths are not an error
    async fn delete_file(&self, path: &str) -> StoreResult<()>;
}

/// Unpacks an uploaded archive into a directory
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    async fn extract(&self, archive: &Path, dest: &Path) -> StoreResult<()>;
}

/// Lookup, install and removal of applications
#[async_trait]
pub trait AppRegistry: Send + Sync {
    /// Find an application by id, or the first installed one when `app_id` is `None`
    async fn get_app_by_id(&self, app_id: Option<&str>) -> Option<AppHandle>;

    /// Like [`AppRegistry::get_app_by_id`], but installs an empty application
    /// of `app_type` when a named one does not exist yet
    async fn get_or_install(
        &self,
        app_id: Option<&str>,
        app_type: &str,
    ) -> StoreResult<Option<AppHandle>>;

    /// All installed applications, in install order
    async fn list_apps(&self) -> Vec<AppHandle>;

    /// The most recently launched application
    async fn active_app(&self) -> Option<AppHandle>;

    async fn launch_app(&self, app: &AppHandle) -> StoreResult<()>;

    async fn uninstall_app(&self, app: &AppHandle) -> StoreResult<()>;

    async fn uninstall_all(&self) -> StoreResult<()>;
}

/// Normalize a relative asset path, rejecting anything that could escape the store
pub fn validate_asset_path(path: &str) -> StoreResult<PathBuf> {
    let invalid = || StoreError::InvalidPath {
        path: path.to_string(),
    };

    let candidate = Path::new(path);
    if path.is_empty() || candidate.is_absolute() {
        return Err(invalid());
    }

    let mut clean = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return Err(invalid()),
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(invalid());
    }
    Ok(clean)
}
