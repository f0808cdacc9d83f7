//! Tests for the push protocol
//!
//! Unit tests and property-based tests for:
//! - Push session accounting
//! - Manifest conflict detection
//! - Single-file and zip bundle import
//! - Staged resource cleanup

use super::*;
use crate::core::config::PlatformInfo;
use crate::core::error::SyncError;
use crate::store::{
    AppHandle, Application, AssetStore, FsAssetStore, LocalAppRegistry, StoreManifest,
    StoreResult, ZipExtractor, APP_METADATA_FILE, APP_STORE_DIR,
};
use crate::test_support::{build_push_zip, entry_count, seeded_store};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Fixtures
// ============================================================================

struct TestHarness {
    temp_dir: TempDir,
    service: SyncService,
    registry: Arc<LocalAppRegistry>,
    completions: Arc<Mutex<Vec<PushComplete>>>,
}

impl TestHarness {
    fn staging_dir(&self) -> PathBuf {
        self.temp_dir.path().join("staging")
    }

    async fn app(&self, id: &str) -> AppHandle {
        use crate::store::AppRegistry;
        self.registry.get_app_by_id(Some(id)).await.unwrap()
    }
}

fn test_limits() -> TransferLimits {
    TransferLimits {
        chunk_timeout: Duration::from_millis(200),
        max_bytes: 1024 * 1024,
    }
}

/// Write an installed application with a pre-populated manifest to disk
async fn seed_app(apps_root: &Path, app_id: &str, version: u64, files: &[(&str, &str)]) {
    let app_dir = apps_root.join(app_id);
    std::fs::create_dir_all(&app_dir).unwrap();
    let metadata = serde_json::json!({
        "appId": app_id,
        "appType": "cordova",
        "installedAt": "2024-01-01T00:00:00Z",
    });
    std::fs::write(app_dir.join(APP_METADATA_FILE), metadata.to_string()).unwrap();
    seeded_store(&app_dir.join(APP_STORE_DIR), version, files).await;
}

async fn build_harness(temp_dir: TempDir) -> TestHarness {
    let apps_root = temp_dir.path().join("apps");
    std::fs::create_dir_all(&apps_root).unwrap();

    let registry = Arc::new(LocalAppRegistry::open(&apps_root).await.unwrap());
    let completions = Arc::new(Mutex::new(Vec::new()));
    let sink = completions.clone();
    let options = SyncOptions {
        platform: PlatformInfo::default(),
        staging: StagingArea::new(Some(temp_dir.path().join("staging"))),
        limits: test_limits(),
        notifier: PushNotifier::with_callback(Arc::new(move |event| sink.lock().push(event))),
    };
    let service = SyncService::new(registry.clone(), Arc::new(ZipExtractor::new()), options);

    TestHarness {
        temp_dir,
        service,
        registry,
        completions,
    }
}

/// Harness without any installed application
async fn empty_harness() -> TestHarness {
    build_harness(TempDir::new().unwrap()).await
}

/// Harness with application `a.b.c` at manifest version 7 holding `www/index.html`
async fn seeded_harness() -> TestHarness {
    let temp_dir = TempDir::new().unwrap();
    seed_app(&temp_dir.path().join("apps"), "a.b.c", 7, &[("www/index.html", "e1")]).await;
    build_harness(temp_dir).await
}

fn put_request(path: &str, etag: &str, manifest_etag: Option<&str>) -> PutFileRequest {
    PutFileRequest {
        path: path.to_string(),
        etag: etag.to_string(),
        manifest_etag: manifest_etag.map(str::to_string),
        expect_bytes: None,
    }
}

/// Body that delivers one chunk and then never finishes
struct StallingBody {
    sent: bool,
}

#[async_trait]
impl ChunkSource for StallingBody {
    fn content_length(&self) -> Option<u64> {
        Some(100)
    }

    async fn next_chunk(&mut self) -> crate::core::Result<Option<Bytes>> {
        if !self.sent {
            self.sent = true;
            return Ok(Some(Bytes::from_static(b"partial")));
        }
        futures::future::pending().await
    }
}

/// Body that counts how many chunks the importer pulled
struct CountingBody {
    inner: MemoryChunks,
    pulled: usize,
}

impl CountingBody {
    fn new(chunks: &[&'static str]) -> Self {
        let chunks = chunks.iter().copied().map(Bytes::from).collect();
        Self {
            inner: MemoryChunks::from_chunks(chunks),
            pulled: 0,
        }
    }
}

#[async_trait]
impl ChunkSource for CountingBody {
    fn content_length(&self) -> Option<u64> {
        self.inner.content_length()
    }

    async fn next_chunk(&mut self) -> crate::core::Result<Option<Bytes>> {
        self.pulled += 1;
        self.inner.next_chunk().await
    }
}

/// Asset store that records the order of committed paths
struct RecordingStore {
    inner: FsAssetStore,
    added: Mutex<Vec<String>>,
}

#[async_trait]
impl AssetStore for RecordingStore {
    async fn manifest(&self) -> StoreManifest {
        self.inner.manifest().await
    }

    async fn manifest_etag(&self) -> String {
        self.inner.manifest_etag().await
    }

    async fn add_file(&self, source: &Path, dest: &str, etag: &str) -> StoreResult<()> {
        self.added.lock().push(dest.to_string());
        self.inner.add_file(source, dest, etag).await
    }

    async fn delete_file(&self, path: &str) -> StoreResult<()> {
        self.inner.delete_file(path).await
    }
}

async fn recording_app(temp_dir: &TempDir) -> (AppHandle, Arc<RecordingStore>) {
    let store = Arc::new(RecordingStore {
        inner: FsAssetStore::open(temp_dir.path().join("store")).await.unwrap(),
        added: Mutex::new(Vec::new()),
    });
    let app = Application::new("rec.app", "cordova", store.clone());
    (app, store)
}

fn bulk_importer(temp_dir: &TempDir) -> BulkImporter {
    BulkImporter::new(
        ConflictGuard::new(PlatformInfo::default()),
        StagingArea::new(Some(temp_dir.path().join("staging"))),
        test_limits(),
        PushNotifier::new(),
        Arc::new(ZipExtractor::new()),
    )
}

// ============================================================================
// UpdateSession Tests
// ============================================================================

#[test]
fn test_session_starts_idle() {
    let session = UpdateSession::new();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.progress().is_none());
    assert!(session.last_updated().is_none());
}

#[test]
fn test_session_completes_at_expected_bytes() {
    let mut session = UpdateSession::new();
    session.begin(Some(100), true);
    assert!(session.is_active());
    assert_eq!(session.progress(), Some(0.0));

    assert!(session.account_bytes(40).is_none());
    assert_eq!(session.bytes_received(), 40);
    assert_eq!(session.progress(), Some(0.4));

    let (total, at) = session.account_bytes(60).unwrap();
    assert_eq!(total, 100);
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.last_updated(), Some(at));
    assert!(session.bytes_expected().is_none());
    assert_eq!(session.bytes_received(), 0);
}

#[test]
fn test_session_overshoot_still_completes_once() {
    let mut session = UpdateSession::new();
    session.begin(Some(10), true);
    assert!(session.account_bytes(25).is_some());
    // Already idle, further accounting is ignored
    assert!(session.account_bytes(5).is_none());
}

#[test]
fn test_session_join_versus_restart() {
    let mut session = UpdateSession::new();
    session.begin(Some(100), true);
    session.account_bytes(30);

    // A follow-up request without a hint joins the running push
    session.begin(Some(20), false);
    assert_eq!(session.bytes_expected(), Some(100));
    assert_eq!(session.bytes_received(), 30);

    // An explicit hint starts over
    session.begin(Some(50), true);
    assert_eq!(session.bytes_expected(), Some(50));
    assert_eq!(session.bytes_received(), 0);
}

#[test]
fn test_session_unknown_total() {
    let mut session = UpdateSession::new();
    session.begin(None, true);
    assert!(session.is_active());
    assert!(session.progress().is_none());
    assert!(session.account_bytes(7).is_some());
    assert!(!session.is_active());
}

#[test]
fn test_session_reset_does_not_stamp() {
    let mut session = UpdateSession::new();
    session.begin(Some(10), true);
    session.account_bytes(3);
    session.reset();
    assert!(!session.is_active());
    assert!(session.last_updated().is_none());
}

#[test]
fn test_push_scope_drop_resets_session() {
    let temp_dir = TempDir::new().unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = rt.block_on(FsAssetStore::open(temp_dir.path())).unwrap();
    let app = Application::new("x", "cordova", Arc::new(store));

    {
        let _scope = PushScope::begin(&app, Some(10), true);
        assert!(app.session().is_active());
    }
    assert!(!app.session().is_active());
    assert!(app.session().last_updated().is_none());
}

proptest! {
    /// Progress stays within [0, 1] and received bytes never decrease
    #[test]
    fn prop_progress_bounded_and_monotonic(
        expected in 1u64..10_000,
        chunks in prop::collection::vec(0u64..2_000, 1..20)
    ) {
        let mut session = UpdateSession::new();
        session.begin(Some(expected), true);
        let mut last_received = 0u64;
        let mut completions = 0;

        for n in chunks {
            if let Some((total, _)) = session.account_bytes(n) {
                completions += 1;
                prop_assert!(total >= expected);
                prop_assert!(session.last_updated().is_some());
                break;
            }
            prop_assert!(session.bytes_received() >= last_received);
            prop_assert!(session.bytes_received() < expected);
            last_received = session.bytes_received();
            let progress = session.progress().unwrap();
            prop_assert!((0.0..=1.0).contains(&progress));
        }
        prop_assert!(completions <= 1);
    }

    /// The session goes idle exactly when the expected total is reached
    #[test]
    fn prop_completion_boundary(expected in 1u64..5_000, split in 0u64..5_000) {
        let first = split.min(expected - 1);
        let mut session = UpdateSession::new();
        session.begin(Some(expected), true);

        prop_assert!(session.account_bytes(first).is_none());
        prop_assert!(session.is_active());
        prop_assert!(session.account_bytes(expected - first).is_some());
        prop_assert!(!session.is_active());
    }
}

// ============================================================================
// ConflictGuard Tests
// ============================================================================

#[tokio::test]
async fn test_conflict_guard() {
    let temp_dir = TempDir::new().unwrap();
    let store = seeded_store(temp_dir.path(), 7, &[("www/index.html", "e1")]).await;
    let app = Application::new("a.b.c", "cordova", Arc::new(store));
    let guard = ConflictGuard::new(PlatformInfo::default());

    assert!(guard.check(&app, None).await.is_ok());
    assert!(guard.check(&app, Some("")).await.is_ok());
    assert!(guard.check(&app, Some("7")).await.is_ok());

    match guard.check(&app, Some("6")).await {
        Err(SyncError::ManifestConflict(snapshot)) => {
            assert_eq!(snapshot.asset_manifest_etag, "7");
            assert_eq!(snapshot.protocol_ver, 2);
            let manifest = snapshot.asset_manifest.unwrap();
            assert_eq!(manifest.get("www/index.html"), Some(&"e1".to_string()));
        }
        other => panic!("expected conflict, got {:?}", other),
    }
}

#[tokio::test]
async fn test_snapshot_without_app() {
    let guard = ConflictGuard::new(PlatformInfo::default());
    let snapshot = guard.snapshot(None).await;
    assert!(snapshot.asset_manifest.is_none());
    assert_eq!(snapshot.asset_manifest_etag, "0");
}

// ============================================================================
// Put File Tests
// ============================================================================

#[tokio::test]
async fn test_put_file_then_stale_put_conflicts() {
    let h = seeded_harness().await;

    let mut body = MemoryChunks::from_bytes("console.log(1)");
    let response = h
        .service
        .put_file(
            Some("a.b.c"),
            "cordova",
            &put_request("www/app.js", "e2", Some("7")),
            &mut body,
        )
        .await
        .unwrap();
    assert_ne!(response.asset_manifest_etag, "7");

    let app = h.app("a.b.c").await;
    let manifest = app.store().manifest().await;
    assert_eq!(manifest.files.len(), 2);
    assert_eq!(manifest.files.get("www/index.html"), Some(&"e1".to_string()));
    assert_eq!(manifest.files.get("www/app.js"), Some(&"e2".to_string()));
    assert_eq!(manifest.etag, response.asset_manifest_etag);

    // Second push still believes the manifest is at version 7
    let mut body = MemoryChunks::from_bytes("console.log(2)");
    let err = h
        .service
        .put_file(
            Some("a.b.c"),
            "cordova",
            &put_request("www/app.js", "e3", Some("7")),
            &mut body,
        )
        .await
        .unwrap_err();
    match err {
        SyncError::ManifestConflict(snapshot) => {
            assert_eq!(snapshot.asset_manifest_etag, response.asset_manifest_etag);
            assert_eq!(snapshot.asset_manifest.unwrap(), manifest.files);
        }
        other => panic!("expected conflict, got {:?}", other),
    }
    assert_eq!(app.store().manifest().await, manifest);
    assert_eq!(entry_count(&h.staging_dir()), 0);
}

#[tokio::test]
async fn test_put_file_requires_path_and_etag() {
    let h = empty_harness().await;

    for request in [put_request("", "e1", None), put_request("www/a.js", "", None)] {
        let mut body = MemoryChunks::from_bytes("x");
        let err = h
            .service
            .put_file(Some("new.app"), "cordova", &request, &mut body)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::BadRequest { .. }));
    }
    // Validation happens before the application is created
    use crate::store::AppRegistry;
    assert!(h.registry.list_apps().await.is_empty());
}

#[tokio::test]
async fn test_put_file_rejects_unsafe_path_before_reading_body() {
    let h = seeded_harness().await;

    let mut first = put_request("www/a.js", "a1", None);
    first.expect_bytes = Some(100);
    h.service
        .put_file(Some("a.b.c"), "cordova", &first, &mut MemoryChunks::from_bytes("0123456789"))
        .await
        .unwrap();
    let app = h.app("a.b.c").await;
    let running = app.session();
    assert!(running.is_active());
    assert_eq!(running.bytes_received(), 10);

    let mut body = CountingBody::new(&["ab", "cd", "ef"]);
    let err = h
        .service
        .put_file(Some("a.b.c"), "cordova", &put_request("../escape.js", "x1", None), &mut body)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::BadRequest { .. }));
    assert_eq!(body.pulled, 0);
    assert_eq!(app.session(), running);
    assert_eq!(entry_count(&h.staging_dir()), 0);
}

#[tokio::test]
async fn test_put_file_installs_new_app() {
    let h = empty_harness().await;

    let mut body = MemoryChunks::from_bytes("<html/>");
    h.service
        .put_file(
            Some("com.example.fresh"),
            "cordova",
            &put_request("www/index.html", "e1", None),
            &mut body,
        )
        .await
        .unwrap();

    let app = h.app("com.example.fresh").await;
    let path = h
        .temp_dir
        .path()
        .join("apps/com.example.fresh/store/assets/www/index.html");
    assert_eq!(std::fs::read(path).unwrap(), b"<html/>");
    assert_eq!(app.store().manifest().await.files.len(), 1);
}

#[tokio::test]
async fn test_put_file_without_any_app() {
    let h = empty_harness().await;
    let mut body = MemoryChunks::from_bytes("x");
    let err = h
        .service
        .put_file(None, "cordova", &put_request("www/a.js", "e1", None), &mut body)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NoApplicationAvailable));
}

#[tokio::test]
async fn test_put_file_rejects_unsupported_app_type() {
    let h = empty_harness().await;
    let mut body = MemoryChunks::from_bytes("x");
    let err = h
        .service
        .put_file(Some("a.b.c"), "flutter", &put_request("www/a.js", "e1", None), &mut body)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::BadRequest { .. }));
}

#[tokio::test]
async fn test_put_file_renames_bootstrap_plugin_list() {
    let h = seeded_harness().await;

    let mut body = MemoryChunks::from_bytes("module.exports = []");
    h.service
        .put_file(
            Some("a.b.c"),
            "cordova",
            &put_request("www/cordova_plugins.js", "p1", None),
            &mut body,
        )
        .await
        .unwrap();

    let manifest = h.app("a.b.c").await.store().manifest().await;
    assert_eq!(manifest.files.get("orig-cordova_plugins.js"), Some(&"p1".to_string()));
    assert!(!manifest.files.contains_key("www/cordova_plugins.js"));
}

#[tokio::test]
async fn test_put_file_streams_multiple_chunks() {
    let h = seeded_harness().await;

    let mut body = MemoryChunks::from_chunks(vec![
        Bytes::from_static(b"one "),
        Bytes::from_static(b"two "),
        Bytes::from_static(b"three"),
    ]);
    h.service
        .put_file(Some("a.b.c"), "cordova", &put_request("www/n.txt", "n1", None), &mut body)
        .await
        .unwrap();

    let path = h.temp_dir.path().join("apps/a.b.c/store/assets/www/n.txt");
    assert_eq!(std::fs::read(path).unwrap(), b"one two three");
}

#[tokio::test]
async fn test_put_file_session_spans_requests() {
    let h = seeded_harness().await;

    let mut first = put_request("www/a.js", "a1", None);
    first.expect_bytes = Some(10);
    h.service
        .put_file(Some("a.b.c"), "cordova", &first, &mut MemoryChunks::from_bytes("abcd"))
        .await
        .unwrap();

    let app = h.app("a.b.c").await;
    let session = app.session();
    assert!(session.is_active());
    assert_eq!(session.progress(), Some(0.4));
    assert!(h.completions.lock().is_empty());

    h.service
        .put_file(
            Some("a.b.c"),
            "cordova",
            &put_request("www/b.js", "b1", None),
            &mut MemoryChunks::from_bytes("efghij"),
        )
        .await
        .unwrap();

    let session = app.session();
    assert!(!session.is_active());
    assert!(session.last_updated().is_some());

    let completions = h.completions.lock();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].app_id, "a.b.c");
    assert_eq!(completions[0].bytes_received, 10);
}

#[tokio::test]
async fn test_put_file_timeout_cleans_up() {
    let h = seeded_harness().await;
    let before = h.app("a.b.c").await.store().manifest().await;

    let mut body = StallingBody { sent: false };
    let err = h
        .service
        .put_file(Some("a.b.c"), "cordova", &put_request("www/slow.js", "s1", None), &mut body)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::TransferTimeout { timeout_ms: 200 }));
    assert!(err.is_transfer_failure());
    assert_eq!(entry_count(&h.staging_dir()), 0);

    let app = h.app("a.b.c").await;
    assert!(!app.session().is_active());
    assert_eq!(app.store().manifest().await, before);
}

#[tokio::test]
async fn test_put_file_body_error_cleans_up() {
    let h = seeded_harness().await;

    let chunks: Vec<Result<Bytes, &'static str>> =
        vec![Ok(Bytes::from_static(b"half")), Err("connection reset")];
    let mut body = BodyChunks::new(futures::stream::iter(chunks), Some(8));
    let err = h
        .service
        .put_file(Some("a.b.c"), "cordova", &put_request("www/x.js", "x1", None), &mut body)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::TransferFailure { .. }));
    assert_eq!(entry_count(&h.staging_dir()), 0);
    assert!(!h.app("a.b.c").await.session().is_active());
}

#[tokio::test]
async fn test_put_file_enforces_body_limit() {
    let temp_dir = TempDir::new().unwrap();
    let store = FsAssetStore::open(temp_dir.path().join("store")).await.unwrap();
    let app = Application::new("small", "cordova", Arc::new(store));
    let importer = SingleFileImporter::new(
        ConflictGuard::new(PlatformInfo::default()),
        StagingArea::new(Some(temp_dir.path().join("staging"))),
        TransferLimits {
            chunk_timeout: Duration::from_secs(1),
            max_bytes: 4,
        },
        PushNotifier::new(),
    );

    let err = importer
        .put_file(
            &app,
            &put_request("www/big.bin", "b", None),
            &mut MemoryChunks::from_bytes("too large"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::TransferFailure { .. }));
    assert_eq!(entry_count(&temp_dir.path().join("staging")), 0);
}

#[tokio::test]
async fn test_staging_dir_created_on_demand() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("nested").join("staging");
    let staging = StagingArea::new(Some(dir.clone()));

    let file = staging.stage_file().await.unwrap();
    let extract = staging.stage_dir().await.unwrap();
    assert!(file.path().starts_with(&dir));
    assert!(extract.path().starts_with(&dir));
    assert_eq!(entry_count(&dir), 2);

    discard(Some(file), Some(extract)).await;
    assert_eq!(entry_count(&dir), 0);
}

#[tokio::test]
async fn test_concurrent_puts_to_same_app() {
    let h = Arc::new(seeded_harness().await);

    let mut tasks = Vec::new();
    for i in 0..4 {
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            let request = put_request(&format!("www/f{}.js", i), &format!("e{}", i), None);
            let mut body = MemoryChunks::from_bytes(format!("file {}", i));
            h.service
                .put_file(Some("a.b.c"), "cordova", &request, &mut body)
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let manifest = h.app("a.b.c").await.store().manifest().await;
    assert_eq!(manifest.files.len(), 5);
    assert_eq!(manifest.etag, "11");
}

// ============================================================================
// Zip Push Tests
// ============================================================================

#[tokio::test]
async fn test_zip_push_imports_in_manifest_order() {
    let temp_dir = TempDir::new().unwrap();
    let (app, store) = recording_app(&temp_dir).await;
    let importer = bulk_importer(&temp_dir);

    let zip = build_push_zip(
        temp_dir.path(),
        &[
            ("www/z.js", "ez", b"z"),
            ("www/a.js", "ea", b"a"),
            ("www/m/index.html", "em", b"<m/>"),
            ("www/cordova_plugins.js", "ep", b"[]"),
        ],
    );

    let response = importer
        .zip_push(&app, &ZipPushRequest::default(), &mut MemoryChunks::from_bytes(zip))
        .await
        .unwrap();

    assert_eq!(
        *store.added.lock(),
        vec!["www/z.js", "www/a.js", "www/m/index.html", "orig-cordova_plugins.js"]
    );

    let manifest = app.store().manifest().await;
    assert_eq!(manifest.etag, response.asset_manifest_etag);
    assert_eq!(manifest.files.get("www/z.js"), Some(&"ez".to_string()));
    assert_eq!(manifest.files.get("www/a.js"), Some(&"ea".to_string()));
    assert_eq!(manifest.files.get("www/m/index.html"), Some(&"em".to_string()));
    assert_eq!(manifest.files.get("orig-cordova_plugins.js"), Some(&"ep".to_string()));

    assert_eq!(entry_count(&temp_dir.path().join("staging")), 0);
    assert!(!app.session().is_active());
    assert!(app.session().last_updated().is_some());
}

#[tokio::test]
async fn test_zip_push_stops_at_first_failure() {
    let temp_dir = TempDir::new().unwrap();
    let (app, store) = recording_app(&temp_dir).await;
    let importer = bulk_importer(&temp_dir);

    // The manifest names a file that is not in the archive
    let manifest = serde_json::json!({
        "www/first.js": { "etag": "e1" },
        "www/missing.js": { "etag": "e2" },
        "www/never.js": { "etag": "e3" },
    });
    let archive = temp_dir.path().join("partial.zip");
    let manifest_bytes = manifest.to_string().into_bytes();
    crate::test_support::build_zip(
        &archive,
        &[
            (ZIP_MANIFEST_FILE, manifest_bytes.as_slice()),
            ("www/first.js", b"1"),
            ("www/never.js", b"3"),
        ],
    );
    let zip = std::fs::read(&archive).unwrap();

    let err = importer
        .zip_push(&app, &ZipPushRequest::default(), &mut MemoryChunks::from_bytes(zip))
        .await
        .unwrap_err();
    assert!(err.is_transfer_failure());

    assert_eq!(*store.added.lock(), vec!["www/first.js", "www/missing.js"]);
    let files = app.store().manifest().await.files;
    assert!(files.contains_key("www/first.js"));
    assert!(!files.contains_key("www/never.js"));

    assert_eq!(entry_count(&temp_dir.path().join("staging")), 0);
    assert!(!app.session().is_active());
    assert!(app.session().last_updated().is_none());
}

#[tokio::test]
async fn test_zip_push_rejects_non_archive() {
    let temp_dir = TempDir::new().unwrap();
    let (app, store) = recording_app(&temp_dir).await;
    let importer = bulk_importer(&temp_dir);

    let err = importer
        .zip_push(
            &app,
            &ZipPushRequest::default(),
            &mut MemoryChunks::from_bytes("not a zip at all"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Extraction { .. }));
    assert!(store.added.lock().is_empty());
    assert_eq!(entry_count(&temp_dir.path().join("staging")), 0);
    assert!(!app.session().is_active());
}

#[tokio::test]
async fn test_zip_push_requires_embedded_manifest() {
    let temp_dir = TempDir::new().unwrap();
    let (app, _store) = recording_app(&temp_dir).await;
    let importer = bulk_importer(&temp_dir);

    let archive = temp_dir.path().join("bare.zip");
    crate::test_support::build_zip(&archive, &[("www/index.html", b"<html/>")]);
    let zip = std::fs::read(&archive).unwrap();

    let err = importer
        .zip_push(&app, &ZipPushRequest::default(), &mut MemoryChunks::from_bytes(zip))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::TransferFailure { .. }));
    assert_eq!(entry_count(&temp_dir.path().join("staging")), 0);
}

#[tokio::test]
async fn test_zip_push_rejects_escaping_entry() {
    let temp_dir = TempDir::new().unwrap();
    let (app, store) = recording_app(&temp_dir).await;
    let importer = bulk_importer(&temp_dir);

    let manifest = serde_json::json!({ "../outside.js": { "etag": "e1" } });
    let archive = temp_dir.path().join("slip.zip");
    let manifest_bytes = manifest.to_string().into_bytes();
    crate::test_support::build_zip(&archive, &[(ZIP_MANIFEST_FILE, manifest_bytes.as_slice())]);
    let zip = std::fs::read(&archive).unwrap();

    let err = importer
        .zip_push(&app, &ZipPushRequest::default(), &mut MemoryChunks::from_bytes(zip))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::TransferFailure { .. }));
    assert!(store.added.lock().is_empty());
}

#[tokio::test]
async fn test_zip_push_conflict_touches_nothing() {
    let h = seeded_harness().await;
    let zip = build_push_zip(h.temp_dir.path(), &[("www/app.js", "e9", b"x")]);

    let err = h
        .service
        .zip_push(
            Some("a.b.c"),
            "cordova",
            &ZipPushRequest {
                manifest_etag: Some("3".to_string()),
                expect_bytes: None,
            },
            &mut MemoryChunks::from_bytes(zip),
        )
        .await
        .unwrap_err();

    match err {
        SyncError::ManifestConflict(snapshot) => assert_eq!(snapshot.asset_manifest_etag, "7"),
        other => panic!("expected conflict, got {:?}", other),
    }
    let app = h.app("a.b.c").await;
    assert_eq!(app.store().manifest_etag().await, "7");
    assert!(!app.session().is_active());
    assert_eq!(entry_count(&h.staging_dir()), 0);
}

#[tokio::test]
async fn test_zip_push_through_service_notifies() {
    let h = seeded_harness().await;
    let zip = build_push_zip(
        h.temp_dir.path(),
        &[("www/index.html", "e1b", b"<new/>"), ("www/app.js", "e2", b"go()")],
    );
    let size = zip.len() as u64;

    let response = h
        .service
        .zip_push(
            Some("a.b.c"),
            "cordova",
            &ZipPushRequest {
                manifest_etag: Some("7".to_string()),
                expect_bytes: None,
            },
            &mut MemoryChunks::from_bytes(zip),
        )
        .await
        .unwrap();
    assert_eq!(response.asset_manifest_etag, "9");

    let completions = h.completions.lock();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].bytes_received, size);
}

#[tokio::test]
async fn test_read_zip_manifest_keeps_document_order() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join(ZIP_MANIFEST_FILE),
        r#"{"b.js": {"etag": "2"}, "a.js": {"etag": "1"}, "c.js": {"etag": "3"}}"#,
    )
    .unwrap();

    let entries = read_zip_manifest(temp_dir.path()).await.unwrap();
    let paths: Vec<&str> = entries.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(paths, vec!["b.js", "a.js", "c.js"]);
    assert_eq!(entries[1].1, BulkManifestEntry { etag: "1".to_string() });
}

// ============================================================================
// Manifest, Delete, Info and Launch Tests
// ============================================================================

#[tokio::test]
async fn test_get_manifest() {
    let h = seeded_harness().await;
    let snapshot = h.service.get_manifest(None).await;
    assert_eq!(snapshot.asset_manifest_etag, "7");
    assert_eq!(snapshot.protocol_ver, 2);

    let missing = h.service.get_manifest(Some("nope")).await;
    assert!(missing.asset_manifest.is_none());
    assert_eq!(missing.asset_manifest_etag, "0");
}

#[tokio::test]
async fn test_delete_files() {
    let h = seeded_harness().await;

    let err = h
        .service
        .delete_files(Some("a.b.c"), Some("1"), &["www/index.html".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::ManifestConflict(_)));

    h.service
        .delete_files(Some("a.b.c"), Some("7"), &["www/index.html".to_string()])
        .await
        .unwrap();
    let manifest = h.app("a.b.c").await.store().manifest().await;
    assert!(manifest.files.is_empty());
    assert_eq!(manifest.etag, "8");
}

#[tokio::test]
async fn test_delete_files_unknown_app_is_noop() {
    let h = empty_harness().await;
    h.service
        .delete_files(Some("ghost"), Some("3"), &["www/index.html".to_string()])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_files_rejects_bad_path() {
    let h = seeded_harness().await;
    let err = h
        .service
        .delete_files(Some("a.b.c"), None, &["../../etc/passwd".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::BadRequest { .. }));
    assert_eq!(h.app("a.b.c").await.store().manifest_etag().await, "7");
}

#[tokio::test]
async fn test_delete_app() {
    let h = seeded_harness().await;
    use crate::store::AppRegistry;

    h.service.delete_app(Some("does.not.exist"), false).await.unwrap();
    assert_eq!(h.registry.list_apps().await.len(), 1);

    h.service.delete_app(Some("a.b.c"), false).await.unwrap();
    assert!(h.registry.list_apps().await.is_empty());
}

#[tokio::test]
async fn test_delete_all_apps() {
    let h = seeded_harness().await;
    use crate::store::AppRegistry;
    h.registry.install("x.y.z", "cordova").await.unwrap();

    h.service.delete_app(None, true).await.unwrap();
    assert!(h.registry.list_apps().await.is_empty());
}

#[tokio::test]
async fn test_put_queued_behind_uninstall_is_rejected() {
    let h = Arc::new(seeded_harness().await);
    let app = h.app("a.b.c").await;
    let held = app.lock_for_push().await;

    let uninstall = tokio::spawn({
        let h = h.clone();
        async move { h.service.delete_app(Some("a.b.c"), false).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Resolves the application before the uninstall runs, then waits its turn
    let put = tokio::spawn({
        let h = h.clone();
        async move {
            let request = put_request("www/orphan.js", "eo", None);
            let mut body = MemoryChunks::from_bytes("orphan()");
            h.service
                .put_file(Some("a.b.c"), "cordova", &request, &mut body)
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(held);

    uninstall.await.unwrap().unwrap();
    let err = put.await.unwrap().unwrap_err();
    assert!(matches!(err, SyncError::NoApplicationAvailable));
    assert!(!h.temp_dir.path().join("apps").join("a.b.c").exists());
    assert_eq!(entry_count(&h.staging_dir()), 0);

    let reinstalled = h.registry.install("a.b.c", "cordova").await.unwrap();
    let manifest = reinstalled.store().manifest().await;
    assert!(manifest.files.is_empty());
    assert_eq!(manifest.etag, "0");
}

#[tokio::test]
async fn test_stale_handle_cannot_zip_push() {
    let h = seeded_harness().await;
    let stale = h.app("a.b.c").await;
    h.service.delete_app(Some("a.b.c"), false).await.unwrap();

    let importer = bulk_importer(&h.temp_dir);
    let zip = build_push_zip(h.temp_dir.path(), &[("www/index.html", "e2", b"<html/>")]);
    let err = importer
        .zip_push(&stale, &ZipPushRequest::default(), &mut MemoryChunks::from_bytes(zip))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NoApplicationAvailable));
    assert!(!stale.session().is_active());
    assert!(!h.temp_dir.path().join("apps").join("a.b.c").exists());
}

#[tokio::test]
async fn test_launch_and_info() {
    let h = empty_harness().await;
    assert!(matches!(
        h.service.launch(None).await,
        Err(SyncError::NoApplicationAvailable)
    ));

    h.registry.install("a.b.c", "cordova").await.unwrap();
    h.service.launch(Some("a.b.c")).await.unwrap();

    let info = h.service.info().await;
    assert_eq!(info.protocol_ver, 2);
    assert_eq!(info.active_app_id.as_deref(), Some("a.b.c"));
    assert_eq!(info.supported_app_types, vec!["cordova".to_string()]);
    assert_eq!(info.app_list.len(), 1);
    assert_eq!(info.app_list[0].app_id, "a.b.c");
    assert!(!info.app_list[0].update_in_progress);
}
