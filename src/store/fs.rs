//! Filesystem-backed asset store
//!
//! Layout of an application directory:
//! - `assetmanifest.json`: persisted mapping plus version counter
//! - `assets/`: the pushed files, at their relative paths
//!
//! The manifest version is a counter bumped only when the mapping changes.
//! Files and the manifest are written to a sibling temp file and renamed
//! into place, so readers never see a half-written file. The in-memory
//! manifest only changes once the new one is on disk.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::error::StoreResult;
use super::traits::{validate_asset_path, AssetStore, StoreManifest};
use crate::core::types::AssetManifest;

pub const MANIFEST_FILE: &str = "assetmanifest.json";
pub const ASSETS_DIR: &str = "assets";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedManifest {
    #[serde(default)]
    version: u64,
    #[serde(default)]
    files: AssetManifest,
}

/// Asset store rooted at one application directory
pub struct FsAssetStore {
    root: PathBuf,
    state: RwLock<PersistedManifest>,
}

impl FsAssetStore {
    /// Open (or create) a store at `root`
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join(ASSETS_DIR)).await?;

        let manifest_path = root.join(MANIFEST_FILE);
        let state = match tokio::fs::read(&manifest_path).await {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedManifest::default(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(
            "Opened asset store at {:?} ({} files, version {})",
            root,
            state.files.len(),
            state.version
        );

        Ok(Self {
            root,
            state: RwLock::new(state),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join(ASSETS_DIR)
    }

    /// On-disk location of a relative asset path
    pub fn asset_path(&self, path: &str) -> StoreResult<PathBuf> {
        Ok(self.assets_dir().join(validate_asset_path(path)?))
    }

    async fn persist(&self, state: &PersistedManifest) -> StoreResult<()> {
        let root = self.root.clone();
        let encoded = serde_json::to_vec_pretty(state)?;
        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&root)?;
            tmp.write_all(&encoded)?;
            tmp.as_file().sync_all()?;
            tmp.persist(root.join(MANIFEST_FILE))
                .map_err(|e| e.error)?;
            Ok(())
        })
        .await?
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn manifest(&self) -> StoreManifest {
        let state = self.state.read().await;
        StoreManifest {
            files: state.files.clone(),
            etag: state.version.to_string(),
        }
    }

    async fn manifest_etag(&self) -> String {
        self.state.read().await.version.to_string()
    }

    async fn add_file(&self, source: &Path, dest: &str, etag: &str) -> StoreResult<()> {
        let target = self.asset_path(dest)?;
        let source = source.to_path_buf();

        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            let parent = target
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            std::fs::create_dir_all(&parent)?;

            let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
            let mut input = std::fs::File::open(&source)?;
            std::io::copy(&mut input, tmp.as_file_mut())?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await??;

        let mut state = self.state.write().await;
        if state.files.get(dest).map(String::as_str) == Some(etag) {
            return Ok(());
        }
        let mut next = state.clone();
        next.files.insert(dest.to_string(), etag.to_string());
        next.version += 1;
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> StoreResult<()> {
        let target = self.asset_path(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut state = self.state.write().await;
        if !state.files.contains_key(path) {
            return Ok(());
        }
        let mut next = state.clone();
        next.files.remove(path);
        next.version += 1;
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }
}
