//! Search Module
//!
//! The retrieval side of the engine:
//! - Lexical adapters: SQLite FTS5 and OpenSearch
//! - Vector adapters: Qdrant and an in-process HNSW index (USearch)
//! - Reciprocal Rank Fusion of the two ranked lists
//! - Metadata filters with a recency boost
//! - Cross-encoder reranking with silent fallback
//! - The hybrid pipeline tying them together

mod adapters;
mod filter;
mod fusion;
mod hybrid;
mod lexical;
mod opensearch;
mod qdrant;
mod reranker;

#[cfg(feature = "vector-search")]
mod vector;

pub use adapters::{distance_to_score, AdapterError, LexicalSearch, VectorSearch};

pub use lexical::{sanitize_fts5_query, PostRecord, SqliteFtsIndex};
pub use opensearch::OpenSearchIndex;
pub use qdrant::QdrantIndex;

#[cfg(feature = "vector-search")]
pub use vector::{
    LocalVectorIndex, LocalVectorIndexConfig, VectorIndexError, DEFAULT_CONNECTIVITY,
    DEFAULT_EXPANSION_ADD, DEFAULT_EXPANSION_SEARCH,
};

pub use fusion::{reciprocal_rank_fusion, FusionEngine};

pub use filter::{parse_date, FilterEngine, DEFAULT_MAX_BOOST, DEFAULT_WINDOW_DAYS};

pub use reranker::{
    min_max_normalize, HttpRerankBackend, RerankBackend, RerankCandidate, RerankedResult,
    Reranker, RerankerError, DEFAULT_RERANK_URL, NORMALIZE_EPSILON,
};

#[cfg(feature = "embeddings")]
pub use reranker::{reset_cross_encoder, CrossEncoderBackend};

pub use hybrid::{BackendStatus, HybridSearcher};
