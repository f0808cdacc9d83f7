//! Application storage capabilities
//!
//! Traits the sync core depends on, plus the implementations the server ships with:
//! - [`FsAssetStore`]: per-application files and manifest on disk
//! - [`LocalAppRegistry`]: one directory per installed application
//! - [`ZipExtractor`]: archive extraction via the `zip` crate

mod app;
mod error;
mod extract;
mod fs;
mod registry;
mod traits;

pub use app::{AppHandle, AppSummary, Application};
pub use error::{StoreError, StoreResult};
pub use extract::ZipExtractor;
pub use fs::{FsAssetStore, ASSETS_DIR, MANIFEST_FILE};
pub use registry::{LocalAppRegistry, APP_METADATA_FILE, APP_STORE_DIR};
pub use traits::{validate_asset_path, AppRegistry, ArchiveExtractor, AssetStore, StoreManifest};
