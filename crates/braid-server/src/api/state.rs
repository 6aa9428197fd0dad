//! Shared request state

use std::sync::Arc;

use braid_core::HybridSearcher;

/// State handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub searcher: Arc<HybridSearcher>,
}

impl AppState {
    pub fn new(searcher: Arc<HybridSearcher>) -> Self {
        Self { searcher }
    }
}
