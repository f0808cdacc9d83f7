//! Wire-level types shared by the sync core and the HTTP layer

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Protocol version reported in every manifest and info payload
pub const PROTOCOL_VER: u32 = 2;

/// Manifest version reported when no application exists
pub const EMPTY_MANIFEST_ETAG: &str = "0";

/// Default application type for pushes that do not name one
pub const DEFAULT_APP_TYPE: &str = "cordova";

/// Generated plugin list that must not overwrite the host's own copy
pub const BOOTSTRAP_PLUGIN_FILE: &str = "www/cordova_plugins.js";

/// Where [`BOOTSTRAP_PLUGIN_FILE`] is stored instead
pub const BOOTSTRAP_PLUGIN_RENAMED: &str = "orig-cordova_plugins.js";

/// Relative asset path -> per-file ETag
pub type AssetManifest = BTreeMap<String, String>;

/// Full manifest state, returned by `/assetmanifest` and on conflicts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSnapshot {
    pub asset_manifest: Option<AssetManifest>,
    pub asset_manifest_etag: String,
    pub platform: String,
    pub runtime_ver: String,
    pub protocol_ver: u32,
}

/// Confirmation payload for successful pushes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEtag {
    pub asset_manifest_etag: String,
}

impl ManifestEtag {
    pub fn new(etag: impl Into<String>) -> Self {
        Self {
            asset_manifest_etag: etag.into(),
        }
    }
}

/// Resolve the store path a pushed file is committed under
pub fn commit_path(dest: &str) -> &str {
    if dest == BOOTSTRAP_PLUGIN_FILE {
        BOOTSTRAP_PLUGIN_RENAMED
    } else {
        dest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_path_renames_bootstrap_file() {
        assert_eq!(commit_path("www/cordova_plugins.js"), "orig-cordova_plugins.js");
        assert_eq!(commit_path("www/index.html"), "www/index.html");
        assert_eq!(commit_path("cordova_plugins.js"), "cordova_plugins.js");
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let mut manifest = AssetManifest::new();
        manifest.insert("www/index.html".to_string(), "e1".to_string());
        let snapshot = ManifestSnapshot {
            asset_manifest: Some(manifest),
            asset_manifest_etag: "7".to_string(),
            platform: "android".to_string(),
            runtime_ver: "3.6.0".to_string(),
            protocol_ver: PROTOCOL_VER,
        };

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["assetManifest"]["www/index.html"], "e1");
        assert_eq!(value["assetManifestEtag"], "7");
        assert_eq!(value["runtimeVer"], "3.6.0");
        assert_eq!(value["protocolVer"], 2);
    }
}
