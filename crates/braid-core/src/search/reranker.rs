//! Candidate Reranking Module
//!
//! ## Two-Stage Retrieval with Cross-Encoder
//!
//! 1. Stage 1: fuse and filter the lexical and vector lists (fast, high recall)
//! 2. Stage 2: score the top window with a cross-encoder and blend that score
//!    with the fused score (slower, high precision)
//!
//! Both score arrays are min-max normalized before blending:
//! `combined = alpha * cross_encoder + (1 - alpha) * fused`.
//!
//! Reranking is a refinement, never a requirement. When it is disabled, has
//! no backend, or the backend fails or times out, candidates are returned in
//! fused-score order instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::config::{EngineConfig, RerankBackendKind, RerankConfig, DEFAULT_RERANK_ALPHA};

#[cfg(feature = "embeddings")]
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};

#[cfg(feature = "embeddings")]
use crate::embeddings::ModelSlot;

// ============================================================================
// CONSTANTS
// ============================================================================

/// TEI serves on this port by default
pub const DEFAULT_RERANK_URL: &str = "http://localhost:8080";

/// Arrays whose spread is below this normalize to all 0.5
pub const NORMALIZE_EPSILON: f64 = 1e-9;

// ============================================================================
// TYPES
// ============================================================================

/// Reranker error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum RerankerError {
    /// Failed to initialize the reranker model
    #[error("Reranker initialization failed: {0}")]
    ModelInit(String),
    /// Backend call failed
    #[error("Reranking failed: {0}")]
    RerankFailed(String),
    /// Backend returned the wrong number of scores
    #[error("Reranker returned {got} scores for {expected} texts")]
    ShapeMismatch { expected: usize, got: usize },
    #[error("Reranker timed out after {0} ms")]
    Timeout(u64),
}

/// One filtered candidate handed to the reranker
#[derive(Debug, Clone, PartialEq)]
pub struct RerankCandidate {
    pub id: String,
    pub fused_score: f64,
    pub text: String,
}

/// A reranked result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankedResult {
    pub id: String,
    /// Blended score, or the fused score on the fallback path
    pub final_score: f64,
    /// Position in the reranker input
    pub original_rank: usize,
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Min-max normalize to `[0, 1]`.
///
/// An array whose values are all equal (within [`NORMALIZE_EPSILON`])
/// becomes all 0.5.
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let Some(first) = values.first() else {
        return vec![];
    };
    let (min, max) = values
        .iter()
        .fold((*first, *first), |(lo, hi), v| (lo.min(*v), hi.max(*v)));

    let spread = max - min;
    if spread.abs() < NORMALIZE_EPSILON {
        return vec![0.5; values.len()];
    }
    values.iter().map(|v| (v - min) / spread).collect()
}

// ============================================================================
// BACKENDS
// ============================================================================

/// A cross-encoder style scorer: one relevance score per text, in input order
#[async_trait]
pub trait RerankBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, RerankerError>;
}

/// A loaded cross-encoder and the name it was loaded under
#[cfg(feature = "embeddings")]
pub struct LoadedCrossEncoder {
    name: String,
    model: std::sync::Mutex<TextRerank>,
}

#[cfg(feature = "embeddings")]
static CROSS_ENCODER: ModelSlot<LoadedCrossEncoder> = ModelSlot::new();

/// Drop the process-wide cross-encoder (tests, model swaps)
#[cfg(feature = "embeddings")]
pub fn reset_cross_encoder() -> bool {
    CROSS_ENCODER.reset()
}

#[cfg(feature = "embeddings")]
fn resolve_reranker(name: &str) -> Result<RerankerModel, RerankerError> {
    match name.to_lowercase().as_str() {
        "bge-reranker-base" | "baai/bge-reranker-base" => Ok(RerankerModel::BGERerankerBase),
        "bge-reranker-v2-m3" | "rozgo/bge-reranker-v2-m3" => Ok(RerankerModel::BGERerankerV2M3),
        "jina-reranker-v1-turbo-en" | "jinaai/jina-reranker-v1-turbo-en" => {
            Ok(RerankerModel::JINARerankerV1TurboEn)
        }
        other => Err(RerankerError::ModelInit(format!(
            "Unsupported cross-encoder model: {other}"
        ))),
    }
}

/// Local cross-encoder via fastembed, shared process-wide
#[cfg(feature = "embeddings")]
pub struct CrossEncoderBackend {
    model: Arc<LoadedCrossEncoder>,
}

#[cfg(feature = "embeddings")]
impl CrossEncoderBackend {
    /// Load the model (downloads on first use) or reuse the loaded one
    pub fn try_new(model_name: &str) -> Result<Self, RerankerError> {
        let model = CROSS_ENCODER.get_or_try_init(|| {
            let options = RerankInitOptions::new(resolve_reranker(model_name)?)
                .with_show_download_progress(false);
            TextRerank::try_new(options)
                .map(|model| LoadedCrossEncoder {
                    name: model_name.to_string(),
                    model: std::sync::Mutex::new(model),
                })
                .map_err(|e| RerankerError::ModelInit(e.to_string()))
        })?;

        if model.name != model_name {
            return Err(RerankerError::ModelInit(format!(
                "{} is already loaded; reset the cross-encoder before loading {}",
                model.name, model_name
            )));
        }
        tracing::info!(model = model_name, "Cross-encoder reranker loaded");
        Ok(Self { model })
    }
}

#[cfg(feature = "embeddings")]
#[async_trait]
impl RerankBackend for CrossEncoderBackend {
    fn name(&self) -> &str {
        &self.model.name
    }

    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, RerankerError> {
        let loaded = Arc::clone(&self.model);
        let query = query.to_string();
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = loaded
                .model
                .lock()
                .map_err(|e| RerankerError::RerankFailed(format!("Lock poisoned: {e}")))?;
            let documents: Vec<&str> = texts.iter().map(String::as_str).collect();
            let ranked = model
                .rerank(query.as_str(), &documents, false, None)
                .map_err(|e| RerankerError::RerankFailed(e.to_string()))?;

            // fastembed returns results sorted by score; restore input order
            let mut scores: Vec<Option<f32>> = vec![None; texts.len()];
            for result in ranked {
                if let Some(slot) = scores.get_mut(result.index) {
                    *slot = Some(result.score);
                }
            }
            let got = scores.iter().filter(|s| s.is_some()).count();
            scores
                .into_iter()
                .collect::<Option<Vec<f32>>>()
                .ok_or(RerankerError::ShapeMismatch {
                    expected: texts.len(),
                    got,
                })
        })
        .await
        .map_err(|e| RerankerError::RerankFailed(format!("Rerank task failed: {e}")))?
    }
}

#[derive(Serialize)]
struct TeiRerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    raw_scores: bool,
}

#[derive(Deserialize)]
struct TeiRerankScore {
    index: usize,
    score: f32,
}

/// Remote cross-encoder behind a TEI-compatible `/rerank` endpoint
pub struct HttpRerankBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpRerankBackend {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
        }
    }

    /// Reorder `(index, score)` pairs into input order
    fn scores_in_order(expected: usize, scored: Vec<TeiRerankScore>) -> Result<Vec<f32>, RerankerError> {
        let got = scored.len();
        let mut scores: Vec<Option<f32>> = vec![None; expected];
        for item in scored {
            match scores.get_mut(item.index) {
                Some(slot @ None) => *slot = Some(item.score),
                _ => return Err(RerankerError::ShapeMismatch { expected, got }),
            }
        }
        scores
            .into_iter()
            .collect::<Option<Vec<f32>>>()
            .ok_or(RerankerError::ShapeMismatch { expected, got })
    }
}

#[async_trait]
impl RerankBackend for HttpRerankBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, RerankerError> {
        let response = self
            .client
            .post(format!("{}/rerank", self.url))
            .json(&TeiRerankRequest {
                query,
                texts,
                raw_scores: false,
            })
            .send()
            .await
            .map_err(|e| RerankerError::RerankFailed(format!("HTTP error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RerankerError::RerankFailed(format!("{} returned {status}", self.url)));
        }

        let scored: Vec<TeiRerankScore> = response
            .json()
            .await
            .map_err(|e| RerankerError::RerankFailed(format!("JSON parse error: {e}")))?;

        Self::scores_in_order(texts.len(), scored)
    }
}

// ============================================================================
// RERANKER SERVICE
// ============================================================================

/// Blends cross-encoder relevance into the fused ranking
pub struct Reranker {
    backend: Option<Arc<dyn RerankBackend>>,
    enabled: bool,
    alpha: f64,
    timeout: Duration,
    permits: Semaphore,
}

impl Reranker {
    pub fn new(backend: Option<Arc<dyn RerankBackend>>, config: &RerankConfig, timeout: Duration) -> Self {
        Self {
            backend,
            enabled: config.enabled,
            alpha: config.alpha.clamp(0.0, 1.0),
            timeout,
            permits: Semaphore::new(config.max_concurrency.max(1)),
        }
    }

    /// Build the configured backend.
    ///
    /// A backend that cannot be constructed is logged and the reranker runs in
    /// fallback mode.
    pub fn from_config(config: &EngineConfig) -> Self {
        let rerank = &config.rerank;
        let backend: Option<Arc<dyn RerankBackend>> = match rerank.backend {
            RerankBackendKind::Disabled => None,
            RerankBackendKind::Http => Some(Arc::new(HttpRerankBackend::new(
                rerank.url.as_deref().unwrap_or(DEFAULT_RERANK_URL),
            ))),
            #[cfg(feature = "embeddings")]
            RerankBackendKind::CrossEncoder => match CrossEncoderBackend::try_new(&rerank.model) {
                Ok(backend) => Some(Arc::new(backend)),
                Err(e) => {
                    tracing::warn!(model = %rerank.model, error = %e, "Cross-encoder unavailable, reranking disabled");
                    None
                }
            },
            #[cfg(not(feature = "embeddings"))]
            RerankBackendKind::CrossEncoder => {
                tracing::warn!("Cross-encoder requires the `embeddings` feature, reranking disabled");
                None
            }
        };
        Self::new(backend, rerank, config.timeouts.rerank())
    }

    /// A reranker that always takes the fallback path
    pub fn disabled() -> Self {
        Self {
            backend: None,
            enabled: false,
            alpha: DEFAULT_RERANK_ALPHA,
            timeout: Duration::from_secs(1),
            permits: Semaphore::new(1),
        }
    }

    /// Whether a backend will be consulted
    pub fn is_active(&self) -> bool {
        self.enabled && self.backend.is_some()
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_deref().map(|b| b.name())
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Order by fused score (stable) and keep the first `top_k`
    pub fn fallback(candidates: &[RerankCandidate], top_k: usize) -> Vec<RerankedResult> {
        let mut results: Vec<RerankedResult> = candidates
            .iter()
            .enumerate()
            .map(|(rank, c)| RerankedResult {
                id: c.id.clone(),
                final_score: c.fused_score,
                original_rank: rank,
            })
            .collect();
        results.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
        results.truncate(top_k);
        results
    }

    /// Rerank, falling back silently to fused order on any failure
    pub async fn rerank(&self, query: &str, candidates: &[RerankCandidate], top_k: usize) -> Vec<RerankedResult> {
        if !self.is_active() || candidates.is_empty() || top_k == 0 {
            return Self::fallback(candidates, top_k);
        }

        match self.try_rerank(query, candidates, top_k).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(
                    backend = self.backend_name().unwrap_or("none"),
                    error = %e,
                    candidates = candidates.len(),
                    "Rerank failed, using fused order"
                );
                Self::fallback(candidates, top_k)
            }
        }
    }

    /// Rerank, surfacing backend failures
    pub async fn try_rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        top_k: usize,
    ) -> Result<Vec<RerankedResult>, RerankerError> {
        let backend = self
            .backend
            .as_ref()
            .ok_or_else(|| RerankerError::ModelInit("no rerank backend configured".to_string()))?;

        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let raw = {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| RerankerError::RerankFailed("rerank admission closed".to_string()))?;
            tokio::time::timeout(self.timeout, backend.score(query, &texts))
                .await
                .map_err(|_| RerankerError::Timeout(self.timeout.as_millis() as u64))??
        };

        if raw.len() != candidates.len() {
            return Err(RerankerError::ShapeMismatch {
                expected: candidates.len(),
                got: raw.len(),
            });
        }
        if raw.iter().any(|s| !s.is_finite()) {
            return Err(RerankerError::RerankFailed("non-finite score".to_string()));
        }

        let cross: Vec<f64> = raw.iter().map(|s| f64::from(*s)).collect();
        let fused: Vec<f64> = candidates.iter().map(|c| c.fused_score).collect();
        let cross = min_max_normalize(&cross);
        let fused = min_max_normalize(&fused);

        let mut results: Vec<RerankedResult> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| RerankedResult {
                id: c.id.clone(),
                final_score: self.alpha * cross[i] + (1.0 - self.alpha) * fused[i],
                original_rank: i,
            })
            .collect();

        results.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
        results.truncate(top_k);
        tracing::debug!(candidates = candidates.len(), returned = results.len(), "Reranked candidates");
        Ok(results)
    }
}

// ============================================================================
// TESTS
// ============================================================================
