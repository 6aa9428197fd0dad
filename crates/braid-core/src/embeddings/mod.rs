//! Semantic Embeddings Module
//!
//! Turns query and passage texts into unit-length vectors for the vector index.
//!
//! Supports:
//! - Local ONNX inference via fastembed (`embeddings` feature)
//! - Remote Ollama-compatible endpoints
//! - A deterministic hashing embedder for offline use
//! - A shared, hash-keyed cache in front of whichever backend is configured

mod backend;
mod cache;
mod hashing;
mod http;
mod slot;

#[cfg(feature = "embeddings")]
mod local;

use std::sync::Arc;

pub use backend::{
    cosine_similarity, dot_product, fit_dimensions, l2_norm, l2_normalize, vector_from_bytes,
    vector_to_bytes, EmbeddingBackend, EmbeddingError, Role,
};
pub use cache::{
    CacheBackend, CacheError, CacheKey, CacheStats, EmbeddingCache, EmbeddingSettings,
    MemoryCache, SqliteCache,
};
pub use hashing::HashingEmbeddingBackend;
pub use http::{HttpEmbeddingBackend, DEFAULT_EMBED_URL};
pub use slot::ModelSlot;

#[cfg(feature = "embeddings")]
pub use local::{reset_embedding_model, FastEmbedBackend, MAX_TEXT_LENGTH};

use crate::config::{CacheBackendKind, CacheConfig, EmbeddingBackendKind, EngineConfig};

/// Construct the configured embedding backend
pub fn build_backend(config: &EngineConfig) -> Result<Arc<dyn EmbeddingBackend>, EmbeddingError> {
    let embedding = &config.embedding;
    match embedding.backend {
        #[cfg(feature = "embeddings")]
        EmbeddingBackendKind::FastEmbed => Ok(Arc::new(FastEmbedBackend::try_new(&embedding.model)?)),
        #[cfg(not(feature = "embeddings"))]
        EmbeddingBackendKind::FastEmbed => Err(EmbeddingError::ModelInit(
            "fastembed backend requires the `embeddings` feature".to_string(),
        )),
        EmbeddingBackendKind::Http => Ok(Arc::new(HttpEmbeddingBackend::new(
            embedding.url.clone(),
            embedding.model.clone(),
            embedding.dimensions,
        ))),
        EmbeddingBackendKind::Hashing => Ok(Arc::new(HashingEmbeddingBackend::new(embedding.dimensions))),
    }
}

/// Open the configured cache store.
///
/// A store that cannot be opened is logged and skipped; embedding continues uncached.
pub fn open_store(config: &CacheConfig) -> Option<Arc<dyn CacheBackend>> {
    match config.backend {
        CacheBackendKind::Disabled => None,
        CacheBackendKind::Memory => Some(Arc::new(MemoryCache::new(config.capacity))),
        CacheBackendKind::Sqlite => match SqliteCache::open(&config.path) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                tracing::warn!(path = %config.path.display(), error = %e, "Embedding cache unavailable, running uncached");
                None
            }
        },
    }
}

/// Build the shared embedding cache from configuration
pub fn build_cache(config: &EngineConfig) -> Result<EmbeddingCache, EmbeddingError> {
    let backend = build_backend(config)?;
    Ok(EmbeddingCache::new(
        backend,
        open_store(&config.cache),
        &config.embedding,
        config.timeouts.embedding(),
    ))
}
