//! HTTP Query API
//!
//! `POST /search/hybrid` runs the retrieval pipeline; `GET /health` reports
//! which backends are live.

pub mod handlers;
pub mod state;

use std::net::SocketAddr;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use state::AppState;

/// Default port of the query service
pub const DEFAULT_PORT: u16 = 8000;

/// Default cap on in-flight requests
pub const DEFAULT_MAX_REQUESTS: usize = 64;

/// Build the axum router with all query routes
pub fn build_router(state: AppState, max_requests: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/search/hybrid", post(handlers::search_hybrid))
        .route("/health", get(handlers::health_check))
        .layer(
            ServiceBuilder::new()
                .concurrency_limit(max_requests.max(1))
                .layer(cors),
        )
        .with_state(state)
}

/// Serve until the listener fails or `shutdown` resolves
pub async fn serve(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr: SocketAddr = listener.local_addr()?;
    info!("Query API listening on http://{}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
