//! Push protocol handlers
//!
//! Each handler parses query parameters, adapts the request body and calls
//! into [`SyncService`](crate::sync::SyncService). Failures render through
//! `IntoResponse for SyncError`.

use axum::{
    body::{Body, Bytes},
    extract::{Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use serde::Deserialize;

use super::server::ServerState;
use crate::core::error::{Result, SyncError};
use crate::core::types::{ManifestEtag, ManifestSnapshot, DEFAULT_APP_TYPE};
use crate::sync::{BodyChunks, HarnessInfo, PutFileRequest, ZipPushRequest};

/// `?appId=` on its own
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppParams {
    pub app_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFilesParams {
    pub app_id: Option<String>,
    pub manifest_etag: Option<String>,
}

/// Body of `/deletefiles`
#[derive(Debug, Deserialize)]
pub struct DeleteFilesBody {
    pub paths: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutFileParams {
    pub app_id: Option<String>,
    pub app_type: Option<String>,
    pub path: Option<String>,
    pub etag: Option<String>,
    pub manifest_etag: Option<String>,
    pub expect_bytes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipPushParams {
    pub app_id: Option<String>,
    pub app_type: Option<String>,
    pub manifest_etag: Option<String>,
    pub expect_bytes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAppParams {
    pub app_id: Option<String>,
    pub all: Option<String>,
}

/// `appType`, falling back to the default when absent or empty
fn app_type(param: &Option<String>) -> &str {
    param
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_APP_TYPE)
}

/// Parse an `expectBytes` hint; zero or unparsable values count as absent
pub fn parse_expect_bytes(value: Option<&str>) -> Option<u64> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|n| *n > 0)
}

/// Query flag semantics: present and not `""`, `false` or `0`
pub fn is_truthy(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(v) => !matches!(v.trim(), "" | "false" | "0"),
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Route: GET /assetmanifest
pub async fn asset_manifest(
    State(state): State<ServerState>,
    Query(params): Query<AppParams>,
) -> Json<ManifestSnapshot> {
    Json(state.service.get_manifest(params.app_id.as_deref()).await)
}

/// Route: POST /deletefiles
pub async fn delete_files(
    State(state): State<ServerState>,
    Query(params): Query<DeleteFilesParams>,
    body: Bytes,
) -> Result<StatusCode> {
    let request: DeleteFilesBody = serde_json::from_slice(&body)
        .map_err(|e| SyncError::bad_request(format!("Invalid delete request body: {}", e)))?;

    state
        .service
        .delete_files(
            params.app_id.as_deref(),
            params.manifest_etag.as_deref(),
            &request.paths,
        )
        .await?;
    Ok(StatusCode::OK)
}

/// Route: PUT /putfile
pub async fn put_file(
    State(state): State<ServerState>,
    Query(params): Query<PutFileParams>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<ManifestEtag>> {
    let request = PutFileRequest {
        path: params.path.clone().unwrap_or_default(),
        etag: params.etag.clone().unwrap_or_default(),
        manifest_etag: params.manifest_etag.clone(),
        expect_bytes: parse_expect_bytes(params.expect_bytes.as_deref()),
    };
    let mut chunks = BodyChunks::new(body.into_data_stream(), content_length(&headers));

    let etag = state
        .service
        .put_file(
            params.app_id.as_deref(),
            app_type(&params.app_type),
            &request,
            &mut chunks,
        )
        .await?;
    Ok(Json(etag))
}

/// Route: POST /zippush
pub async fn zip_push(
    State(state): State<ServerState>,
    Query(params): Query<ZipPushParams>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<ManifestEtag>> {
    let request = ZipPushRequest {
        manifest_etag: params.manifest_etag.clone(),
        expect_bytes: parse_expect_bytes(params.expect_bytes.as_deref()),
    };
    let mut chunks = BodyChunks::new(body.into_data_stream(), content_length(&headers));

    let etag = state
        .service
        .zip_push(
            params.app_id.as_deref(),
            app_type(&params.app_type),
            &request,
            &mut chunks,
        )
        .await?;
    Ok(Json(etag))
}

/// Route: POST /deleteapp
pub async fn delete_app(
    State(state): State<ServerState>,
    Query(params): Query<DeleteAppParams>,
) -> Result<StatusCode> {
    state
        .service
        .delete_app(params.app_id.as_deref(), is_truthy(params.all.as_deref()))
        .await?;
    Ok(StatusCode::OK)
}

/// Route: GET /info
pub async fn info(State(state): State<ServerState>) -> Json<HarnessInfo> {
    Json(state.service.info().await)
}

/// Route: POST /launch
pub async fn launch(
    State(state): State<ServerState>,
    Query(params): Query<AppParams>,
) -> Result<StatusCode> {
    state.service.launch(params.app_id.as_deref()).await?;
    Ok(StatusCode::OK)
}

pub async fn health() -> &'static str {
    "OK"
}

/// Fallback for a known path hit with the wrong method
pub async fn method_not_allowed() -> SyncError {
    SyncError::MethodNotAllowed
}

/// Stop intermediaries from caching manifests between pushes
pub async fn response_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}
