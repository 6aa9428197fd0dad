//! # Braid Core
//!
//! Hybrid retrieval engine. Braids a lexical ranking and a semantic ranking
//! into one result list:
//!
//! - **Reciprocal Rank Fusion**: `1/(k + rank)` summed across lists, k = 60,
//!   deterministic first-seen tie-breaking
//! - **Metadata Filters**: category, filetype and inclusive date bounds
//! - **Recency Boost**: +0.2 for today's documents, decaying linearly to 0 over a year
//! - **Cross-Encoder Reranking**: min-max normalized blend with the fused score
//!   (alpha = 0.7), silently falling back to fused order
//! - **Embedding Cache**: blake3-keyed over model, role, template and text,
//!   in memory (LRU) or SQLite
//!
//! ## Backends
//!
//! | Concern | Implementations |
//! |---------|-----------------|
//! | Lexical | SQLite FTS5, OpenSearch |
//! | Vector | Qdrant, USearch HNSW (`vector-search`) |
//! | Embeddings | fastembed (`embeddings`), Ollama-compatible HTTP, feature hashing |
//! | Rerank | fastembed cross-encoder (`embeddings`), TEI-compatible HTTP |
//!
//! Backends are chosen once from [`EngineConfig`]. Any backend failure
//! degrades the answer instead of failing the query.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use braid_core::{EngineConfig, HybridSearcher, SearchRequest};
//!
//! let searcher = HybridSearcher::from_config(EngineConfig::from_env()?);
//! let hits = searcher
//!     .search(&SearchRequest::new("refund scam").with_top_k(5))
//!     .await;
//! for hit in hits {
//!     println!("{:.4} {} ({})", hit.score, hit.title, hit.source);
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): Bundle SQLite for the FTS5 index and the cache
//! - `embeddings`: Local embedding model and cross-encoder with fastembed
//! - `vector-search`: In-process HNSW vector index with USearch
//! - `full`: All of the above

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod document;
pub mod embeddings;
pub mod search;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Configuration
pub use config::{
    CacheBackendKind, ConfigError, EmbeddingBackendKind, EngineConfig, LexicalBackendKind,
    RerankBackendKind, VectorBackendKind, DEFAULT_DIMENSIONS, DEFAULT_RERANK_ALPHA,
    DEFAULT_RERANK_WINDOW, DEFAULT_RRF_K, DEFAULT_SOURCE_LIMIT,
};

// Data model
pub use document::{
    CandidateDocument, Payload, SearchFilters, SearchHit, SearchRequest, SourceHit,
    DEFAULT_TOP_K, SNIPPET_CHARS,
};

// Embeddings
pub use embeddings::{
    cosine_similarity, l2_normalize, CacheBackend, CacheKey, CacheStats, EmbeddingBackend,
    EmbeddingCache, EmbeddingError, Role,
};

// Search pipeline
pub use search::{
    reciprocal_rank_fusion, AdapterError, BackendStatus, FilterEngine, FusionEngine,
    HybridSearcher, LexicalSearch, RerankBackend, Reranker, RerankerError, VectorSearch,
};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        CandidateDocument, EngineConfig, HybridSearcher, SearchFilters, SearchHit,
        SearchRequest, SourceHit,
    };

    pub use crate::{EmbeddingCache, LexicalSearch, RerankBackend, Role, VectorSearch};
}
