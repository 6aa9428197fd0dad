//! Hybrid Search (Lexical + Semantic + RRF + Rerank)
//!
//! Runs one query through the full pipeline:
//!
//! 1. Lexical and vector adapters, concurrently, each under a timeout
//! 2. Reciprocal Rank Fusion
//! 3. Metadata filters and recency boost
//! 4. Cross-encoder rerank over the window `max(min_window, top_k)`
//!
//! Every backend failure degrades locally. A query never errors; an empty
//! list is a valid answer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::adapters::{AdapterError, LexicalSearch, VectorSearch};
use super::filter::FilterEngine;
use super::fusion::FusionEngine;
use super::lexical::SqliteFtsIndex;
use super::opensearch::OpenSearchIndex;
use super::qdrant::QdrantIndex;
use super::reranker::{RerankCandidate, Reranker};
use crate::config::{EngineConfig, LexicalBackendKind, VectorBackendKind};
use crate::document::{CandidateDocument, SearchHit, SearchRequest, SourceHit};
use crate::embeddings::{build_cache, EmbeddingCache};

#[cfg(feature = "vector-search")]
use super::vector::{LocalVectorIndex, LocalVectorIndexConfig};

/// Which backends a searcher is running with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub lexical: Option<String>,
    pub vector: Option<String>,
    pub embedding: Option<String>,
    pub cache: Option<String>,
    pub reranker: Option<String>,
}

/// Turn an adapter outcome into a ranked list, logging any degradation
fn settle(
    source: &'static str,
    backend: &str,
    timeout: Duration,
    outcome: Result<Result<Vec<SourceHit>, AdapterError>, tokio::time::error::Elapsed>,
) -> Vec<SourceHit> {
    let result = outcome.unwrap_or_else(|_| Err(AdapterError::Timeout(timeout.as_millis() as u64)));
    match result {
        Ok(hits) => {
            tracing::debug!(source, backend, hits = hits.len(), "Source list retrieved");
            hits
        }
        Err(e) => {
            tracing::warn!(source, backend, error = %e, "Source unavailable, continuing without it");
            vec![]
        }
    }
}

/// Query pipeline over pluggable lexical and vector backends
pub struct HybridSearcher {
    lexical: Option<Arc<dyn LexicalSearch>>,
    vector: Option<Arc<dyn VectorSearch>>,
    embedder: Option<Arc<EmbeddingCache>>,
    fusion: FusionEngine,
    filter: FilterEngine,
    reranker: Reranker,
    config: EngineConfig,
}

impl HybridSearcher {
    /// A searcher with no backends; attach them with the `with_*` builders
    pub fn new(config: EngineConfig) -> Self {
        Self {
            lexical: None,
            vector: None,
            embedder: None,
            fusion: FusionEngine::new(config.fusion.rrf_k),
            filter: FilterEngine::from_config(&config.filter),
            reranker: Reranker::disabled(),
            config,
        }
    }

    pub fn with_lexical(mut self, lexical: Arc<dyn LexicalSearch>) -> Self {
        self.lexical = Some(lexical);
        self
    }

    pub fn with_vector(mut self, vector: Arc<dyn VectorSearch>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<EmbeddingCache>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_reranker(mut self, reranker: Reranker) -> Self {
        self.reranker = reranker;
        self
    }

    /// Select every backend once from configuration.
    ///
    /// A backend that is disabled or cannot be constructed is logged and left
    /// out; the searcher still answers with whatever remains.
    pub fn from_config(config: EngineConfig) -> Self {
        let lexical = Self::build_lexical(&config);
        let vector = Self::build_vector(&config);
        let embedder = match vector {
            Some(_) => match build_cache(&config) {
                Ok(cache) => Some(Arc::new(cache)),
                Err(e) => {
                    tracing::warn!(error = %e, "Embedding backend unavailable, vector search disabled");
                    None
                }
            },
            None => None,
        };
        let reranker = Reranker::from_config(&config);

        let mut searcher = Self::new(config).with_reranker(reranker);
        searcher.lexical = lexical;
        searcher.vector = vector;
        searcher.embedder = embedder;

        tracing::info!(status = ?searcher.backend_status(), "Hybrid searcher ready");
        searcher
    }

    fn build_lexical(config: &EngineConfig) -> Option<Arc<dyn LexicalSearch>> {
        let lexical = &config.lexical;
        let built: Result<Arc<dyn LexicalSearch>, AdapterError> = match lexical.backend {
            LexicalBackendKind::Disabled => return None,
            LexicalBackendKind::Sqlite => {
                SqliteFtsIndex::open(&lexical.sqlite_path).map(|i| Arc::new(i) as Arc<dyn LexicalSearch>)
            }
            LexicalBackendKind::OpenSearch => OpenSearchIndex::new(
                &lexical.opensearch_url,
                lexical.opensearch_index.clone(),
                lexical.opensearch_user.clone(),
                lexical.opensearch_password.clone(),
                lexical.opensearch_insecure,
            )
            .map(|i| Arc::new(i) as Arc<dyn LexicalSearch>),
        };
        built
            .inspect_err(|e| tracing::warn!(backend = ?lexical.backend, error = %e, "Lexical backend unavailable"))
            .ok()
    }

    fn build_vector(config: &EngineConfig) -> Option<Arc<dyn VectorSearch>> {
        let vector = &config.vector;
        match vector.backend {
            VectorBackendKind::Disabled => None,
            VectorBackendKind::Qdrant => Some(Arc::new(QdrantIndex::new(
                &vector.qdrant_url,
                vector.qdrant_collection.clone(),
            ))),
            #[cfg(feature = "vector-search")]
            VectorBackendKind::Local => {
                let index_config = LocalVectorIndexConfig::with_dimensions(config.embedding.dimensions);
                match LocalVectorIndex::open(&vector.index_path, index_config) {
                    Ok(index) => Some(Arc::new(index)),
                    Err(e) => {
                        tracing::warn!(path = %vector.index_path.display(), error = %e, "Local vector index unavailable");
                        None
                    }
                }
            }
            #[cfg(not(feature = "vector-search"))]
            VectorBackendKind::Local => {
                tracing::warn!("Local vector index requires the `vector-search` feature");
                None
            }
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn embedder(&self) -> Option<&Arc<EmbeddingCache>> {
        self.embedder.as_ref()
    }

    pub fn reranker(&self) -> &Reranker {
        &self.reranker
    }

    pub fn backend_status(&self) -> BackendStatus {
        BackendStatus {
            lexical: self.lexical.as_deref().map(|l| l.name().to_string()),
            vector: self.vector.as_deref().map(|v| v.name().to_string()),
            embedding: self.embedder.as_deref().map(|e| e.backend_name().to_string()),
            cache: self
                .embedder
                .as_deref()
                .and_then(|e| e.store_name())
                .map(str::to_string),
            reranker: self
                .reranker
                .backend_name()
                .filter(|_| self.reranker.is_active())
                .map(str::to_string),
        }
    }

    async fn lexical_hits(&self, query: &str, limit: usize) -> Vec<SourceHit> {
        let Some(lexical) = &self.lexical else {
            return vec![];
        };
        let timeout = self.config.timeouts.adapter();
        let outcome = tokio::time::timeout(timeout, lexical.search(query, limit)).await;
        settle("lexical", lexical.name(), timeout, outcome)
    }

    async fn vector_hits(&self, query: &str, limit: usize) -> Vec<SourceHit> {
        let (Some(vector), Some(embedder)) = (&self.vector, &self.embedder) else {
            return vec![];
        };
        let embedding = match embedder.embed_query(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(backend = embedder.backend_name(), error = %e, "Query embedding failed, skipping vector search");
                return vec![];
            }
        };
        let timeout = self.config.timeouts.adapter();
        let outcome = tokio::time::timeout(timeout, vector.search(&embedding, limit)).await;
        settle("vector", vector.name(), timeout, outcome)
    }

    /// Run the pipeline, returning ranked candidates with `final_score` set
    pub async fn search_documents(&self, request: &SearchRequest) -> Vec<CandidateDocument> {
        let query = request.query.trim();
        if query.is_empty() || request.top_k == 0 {
            return vec![];
        }
        let started = Instant::now();
        let limit = self.config.fusion.source_limit.max(request.top_k);

        let (lexical, vector) = tokio::join!(self.lexical_hits(query, limit), self.vector_hits(query, limit));

        let fused = self.fusion.fuse(&lexical, &vector);
        let mut filtered = self.filter.apply(fused, request.filters.as_ref());
        filtered.truncate(self.config.rerank.min_window.max(request.top_k));

        let candidates: Vec<RerankCandidate> = filtered
            .iter()
            .map(|doc| RerankCandidate {
                id: doc.id.clone(),
                fused_score: doc.fused_score,
                text: doc.text(),
            })
            .collect();
        let ranked = self.reranker.rerank(query, &candidates, request.top_k).await;

        // Fused ids are unique, so each ranked id claims exactly one document
        let mut by_id: HashMap<String, CandidateDocument> =
            filtered.into_iter().map(|doc| (doc.id.clone(), doc)).collect();
        let results: Vec<CandidateDocument> = ranked
            .into_iter()
            .filter_map(|r| {
                by_id.remove(&r.id).map(|mut doc| {
                    doc.final_score = Some(r.final_score);
                    doc
                })
            })
            .collect();

        tracing::info!(
            lexical = lexical.len(),
            vector = vector.len(),
            results = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Hybrid search complete"
        );
        results
    }

    /// Run the pipeline and render hits for callers
    pub async fn search(&self, request: &SearchRequest) -> Vec<SearchHit> {
        self.search_documents(request)
            .await
            .iter()
            .map(SearchHit::from_candidate)
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
