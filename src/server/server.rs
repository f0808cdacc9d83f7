//! Harness HTTP server
//!
//! Owns the listener and routing for the push protocol. Handlers share a
//! [`ServerState`] holding the [`SyncService`].

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    middleware,
    routing::{get, post, put},
    Router,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::error::ServerError;
use super::routes::{
    asset_manifest, delete_app, delete_files, health, info, launch, method_not_allowed,
    put_file, response_headers, zip_push,
};
use crate::core::config::{HarnessConfig, ServerConfig};
use crate::sync::SyncService;

/// Shared state for the handlers
#[derive(Clone)]
pub struct ServerState {
    pub service: Arc<SyncService>,
}

/// The harness server
pub struct HarnessServer {
    config: ServerConfig,
    max_body_bytes: usize,
    state: ServerState,
}

impl HarnessServer {
    pub fn new(config: &HarnessConfig, service: Arc<SyncService>) -> Self {
        Self {
            config: config.server.clone(),
            max_body_bytes: config.transfer.max_body_bytes,
            state: ServerState { service },
        }
    }

    /// Address the server binds to
    pub fn addr(&self) -> SocketAddr {
        self.config.socket_addr()
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Build the router with all routes and middleware
    pub fn build_router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers(Any)
            .allow_origin(Any);

        Router::new()
            .route(
                "/assetmanifest",
                get(asset_manifest)
                    .head(method_not_allowed)
                    .fallback(method_not_allowed),
            )
            .route("/deletefiles", post(delete_files).fallback(method_not_allowed))
            .route("/putfile", put(put_file).fallback(method_not_allowed))
            .route("/zippush", post(zip_push).fallback(method_not_allowed))
            .route("/deleteapp", post(delete_app).fallback(method_not_allowed))
            .route(
                "/info",
                get(info).head(method_not_allowed).fallback(method_not_allowed),
            )
            .route("/launch", post(launch).fallback(method_not_allowed))
            .route("/health", get(health))
            .layer(DefaultBodyLimit::max(self.max_body_bytes))
            .layer(middleware::from_fn(response_headers))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(self.state.clone())
    }

    async fn bind(&self) -> Result<tokio::net::TcpListener, ServerError> {
        let addr = self.addr();
        tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed {
                addr,
                reason: e.to_string(),
            })
    }

    /// Serve until `shutdown` resolves
    pub async fn start<F>(&self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = self.bind().await?;
        tracing::info!("Harness server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal {
                reason: e.to_string(),
            })?;

        tracing::info!("Harness server stopped");
        Ok(())
    }

    /// Bind and serve in a background task
    pub async fn start_background(&self) -> Result<RunningServer, ServerError> {
        let listener = self.bind().await?;
        let local_addr = listener.local_addr()?;
        let router = self.build_router();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tracing::info!("Harness server listening on {}", local_addr);
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
                .map_err(|e| ServerError::Internal {
                    reason: e.to_string(),
                })
        });

        Ok(RunningServer {
            local_addr,
            shutdown: Some(shutdown_tx),
            handle,
        })
    }
}

/// Handle to a server started with [`HarnessServer::start_background`]
pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for in-flight requests
    pub async fn shutdown(mut self) -> Result<(), ServerError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.map_err(|e| ServerError::Internal {
            reason: e.to_string(),
        })?
    }
}
