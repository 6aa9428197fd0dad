//! Ranked-list adapter contracts
//!
//! Every index is queried through one of two traits. Adapters return hits
//! best-first with higher-is-better scores; the pipeline turns any `Err`
//! into an empty list.

use async_trait::async_trait;

use crate::document::SourceHit;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Adapter error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Index not configured or not reachable
    #[error("Index unavailable: {0}")]
    Unavailable(String),
    /// Response did not have the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Index call timed out after {0} ms")]
    Timeout(u64),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

// ============================================================================
// TRAITS
// ============================================================================

/// Term-based index
#[async_trait]
pub trait LexicalSearch: Send + Sync {
    /// Name used in logs and health output
    fn name(&self) -> &str;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SourceHit>, AdapterError>;
}

/// Nearest-neighbour index over embeddings
#[async_trait]
pub trait VectorSearch: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SourceHit>, AdapterError>;
}

/// Convert a lower-is-better score (distance, BM25 cost) to higher-is-better.
///
/// Negative inputs are clamped to 0, so the result is always in `(0, 1]`.
#[inline]
pub fn distance_to_score(raw: f64) -> f32 {
    (1.0 / (1.0 + raw.max(0.0))) as f32
}
