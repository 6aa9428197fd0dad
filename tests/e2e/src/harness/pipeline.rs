//! Pipeline builder for scenarios
//!
//! Wires mocks into a [`HybridSearcher`] with small vectors and short
//! timeouts so degradation paths finish quickly.

use std::sync::Arc;

use braid_core::config::RerankBackendKind;
use braid_core::embeddings::HashingEmbeddingBackend;
use braid_core::{
    CacheBackend, EmbeddingBackend, EmbeddingCache, EngineConfig, HybridSearcher, LexicalSearch,
    RerankBackend, Reranker, VectorSearch,
};

/// Vector size used by every test pipeline
pub const TEST_DIMENSIONS: usize = 64;

/// Timeout applied to every backend call in test pipelines
pub const TEST_TIMEOUT_MS: u64 = 250;

/// Builder for an isolated [`HybridSearcher`]
///
/// # Example
///
/// ```rust,ignore
/// let searcher = TestPipeline::new()
///     .lexical(Arc::new(MockLexical::returning(hits)))
///     .reranker(Arc::new(KeywordReranker::new(RerankBehavior::KeywordOverlap)))
///     .build();
/// ```
pub struct TestPipeline {
    pub config: EngineConfig,
    lexical: Option<Arc<dyn LexicalSearch>>,
    vector: Option<Arc<dyn VectorSearch>>,
    embedder: Option<Arc<dyn EmbeddingBackend>>,
    store: Option<Arc<dyn CacheBackend>>,
    reranker: Option<Arc<dyn RerankBackend>>,
}

impl Default for TestPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPipeline {
    pub fn new() -> Self {
        let mut config = EngineConfig::default();
        config.embedding.dimensions = TEST_DIMENSIONS;
        config.rerank.backend = RerankBackendKind::Disabled;
        config.timeouts.adapter_ms = TEST_TIMEOUT_MS;
        config.timeouts.embedding_ms = TEST_TIMEOUT_MS;
        config.timeouts.rerank_ms = TEST_TIMEOUT_MS;
        Self {
            config,
            lexical: None,
            vector: None,
            embedder: None,
            store: None,
            reranker: None,
        }
    }

    pub fn lexical(mut self, lexical: Arc<dyn LexicalSearch>) -> Self {
        self.lexical = Some(lexical);
        self
    }

    pub fn vector(mut self, vector: Arc<dyn VectorSearch>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn store(mut self, store: Arc<dyn CacheBackend>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn reranker(mut self, reranker: Arc<dyn RerankBackend>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Adjust the configuration before building
    pub fn configure(mut self, adjust: impl FnOnce(&mut EngineConfig)) -> Self {
        adjust(&mut self.config);
        self
    }

    /// The embedding cache this pipeline would use
    pub fn cache(&self) -> Arc<EmbeddingCache> {
        let backend = self
            .embedder
            .clone()
            .unwrap_or_else(|| Arc::new(HashingEmbeddingBackend::new(self.config.embedding.dimensions)));
        Arc::new(EmbeddingCache::new(
            backend,
            self.store.clone(),
            &self.config.embedding,
            self.config.timeouts.embedding(),
        ))
    }

    pub fn build(self) -> HybridSearcher {
        let cache = self.cache();
        let reranker = Reranker::new(self.reranker.clone(), &self.config.rerank, self.config.timeouts.rerank());

        let mut searcher = HybridSearcher::new(self.config)
            .with_embedder(cache)
            .with_reranker(reranker);
        if let Some(lexical) = self.lexical {
            searcher = searcher.with_lexical(lexical);
        }
        if let Some(vector) = self.vector {
            searcher = searcher.with_vector(vector);
        }
        searcher
    }
}
