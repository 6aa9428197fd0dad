//! Query API endpoint handlers

use axum::extract::State;
use axum::response::Json;
use braid_core::{SearchHit, SearchRequest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}

/// Hybrid search. Backend failures lower result quality but never fail the request.
pub async fn search_hybrid(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Json<SearchResponse> {
    let results = state.searcher.search(&request).await;
    Json(SearchResponse { results })
}

/// Liveness plus the backends the searcher is running with
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let searcher = &state.searcher;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "backends": searcher.backend_status(),
        "embedding_cache": searcher.embedder().map(|e| e.stats()),
    }))
}
