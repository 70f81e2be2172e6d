//! HTTP server implementation using Axum.

use crate::handler::{handle_health, handle_proxy, handle_status};
use axum::{routing::get, Router};
use standards_offline::{ConnectivityTracker, OfflineWorker};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers.
pub struct AppState {
    /// Worker answering intercepted requests
    pub worker: Arc<OfflineWorker>,
    /// Connectivity as seen by the worker's fetcher
    pub connectivity: Arc<ConnectivityTracker>,
}

/// Build the proxy router.
///
/// Control endpoints live under `/__offline/`; every other path is a page
/// request for the worker.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/__offline/health", get(handle_health))
        .route("/__offline/status", get(handle_status))
        .fallback(handle_proxy)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(Arc::new(state))
}

/// Start the proxy HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(state: AppState, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
