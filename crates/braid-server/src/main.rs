//! Braid Query Server
//!
//! Serves hybrid retrieval over HTTP:
//! - Lexical search (SQLite FTS5 or OpenSearch)
//! - Semantic search (Qdrant or a local HNSW index) over cached embeddings
//! - Reciprocal Rank Fusion, metadata filters and recency boost
//! - Cross-encoder reranking with silent fallback
//!
//! Configuration is read from `BRAID_*` environment variables.

use std::sync::Arc;

use anyhow::Context;
use braid_core::{EngineConfig, HybridSearcher};
use braid_server::api::{self, AppState, DEFAULT_MAX_REQUESTS, DEFAULT_PORT};
use braid_server::telemetry::init_tracing;
use tracing::{info, warn};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparsable {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");
    info!("Braid query server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::from_env().context("invalid BRAID_* configuration")?;
    let host: String = env_or("BRAID_HOST", "127.0.0.1".to_string());
    let port: u16 = env_or("BRAID_PORT", DEFAULT_PORT);
    let max_requests: usize = env_or("BRAID_MAX_REQUESTS", DEFAULT_MAX_REQUESTS);

    // Model loading is blocking and may download weights
    let searcher = tokio::task::spawn_blocking(move || HybridSearcher::from_config(config))
        .await
        .context("backend initialization panicked")?;

    let router = api::build_router(AppState::new(Arc::new(searcher)), max_requests);
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("could not bind {host}:{port}"))?;

    api::serve(listener, router, shutdown_signal()).await?;
    info!("Braid query server stopped");
    Ok(())
}
