//! Shared helpers for unit tests

use std::io::Write;
use std::path::Path;

use crate::store::{FsAssetStore, MANIFEST_FILE};

/// Write a zip archive containing `entries` to `path`
pub fn build_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// Zip archive bytes with an embedded `zipassetmanifest.json` listing `files` in order
pub fn build_push_zip(dir: &Path, files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut manifest = serde_json::Map::new();
    for (path, etag, _) in files {
        manifest.insert(path.to_string(), serde_json::json!({ "etag": etag }));
    }
    let manifest = serde_json::to_vec(&serde_json::Value::Object(manifest)).unwrap();

    let mut entries: Vec<(&str, &[u8])> = vec![("zipassetmanifest.json", manifest.as_slice())];
    entries.extend(files.iter().map(|(path, _, data)| (*path, *data)));

    let zip_path = dir.join("push.zip");
    build_zip(&zip_path, &entries);
    let bytes = std::fs::read(&zip_path).unwrap();
    std::fs::remove_file(&zip_path).unwrap();
    bytes
}

/// Open a store at `root` whose persisted manifest is `files` at `version`
pub async fn seeded_store(root: &Path, version: u64, files: &[(&str, &str)]) -> FsAssetStore {
    std::fs::create_dir_all(root).unwrap();
    let files: serde_json::Map<String, serde_json::Value> = files
        .iter()
        .map(|(path, etag)| (path.to_string(), serde_json::Value::from(*etag)))
        .collect();
    let manifest = serde_json::json!({ "version": version, "files": files });
    std::fs::write(root.join(MANIFEST_FILE), manifest.to_string()).unwrap();
    FsAssetStore::open(root).await.unwrap()
}

/// Number of entries directly inside `dir`
pub fn entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|it| it.count()).unwrap_or(0)
}
