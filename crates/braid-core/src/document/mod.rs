//! Document module - per-query ranking data
//!
//! Candidates are created for a single query, mutated only by the pipeline
//! invocation that created them, and dropped once the response is built.

mod query;

pub use query::{SearchFilters, SearchHit, SearchRequest, DEFAULT_TOP_K, SNIPPET_CHARS};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Semantic fields attached to a hit: title, snippet/text, tags, category,
/// filetype, date/posted_at, source locator, post id, chunk id...
pub type Payload = serde_json::Map<String, Value>;

/// Read a payload field as a string.
///
/// Numbers and booleans are rendered; null, missing, and empty strings are `None`.
pub fn payload_string(payload: &Payload, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// The document date: `date`, falling back to `posted_at`
pub fn payload_date(payload: &Payload) -> Option<String> {
    payload_string(payload, "date").or_else(|| payload_string(payload, "posted_at"))
}

// ============================================================================
// SOURCE HIT
// ============================================================================

/// One entry of a ranked list returned by a lexical or vector adapter.
///
/// Scores are higher-is-better; adapters convert distance-like scores before
/// returning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHit {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub payload: Payload,
}

impl SourceHit {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
            payload: Payload::new(),
        }
    }

    /// Attach a payload field
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }
}

// ============================================================================
// CANDIDATE DOCUMENT
// ============================================================================

/// A retrievable unit flowing through fusion, filtering and reranking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateDocument {
    /// Join key across both source lists; never rewritten
    pub id: String,
    /// Present only if the document appeared in the lexical list
    pub lexical_score: Option<f32>,
    /// Present only if the document appeared in the vector list
    pub vector_score: Option<f32>,
    /// RRF score, plus recency boost once filtered
    pub fused_score: f64,
    /// Set by the reranker only
    pub final_score: Option<f64>,
    pub payload: Payload,
}

impl CandidateDocument {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            lexical_score: None,
            vector_score: None,
            fused_score: 0.0,
            final_score: None,
            payload: Payload::new(),
        }
    }

    /// Text handed to the cross-encoder: chunk `text`, else `snippet`, else empty
    pub fn text(&self) -> String {
        payload_string(&self.payload, "text")
            .or_else(|| payload_string(&self.payload, "snippet"))
            .unwrap_or_default()
    }

    pub fn field(&self, key: &str) -> Option<String> {
        payload_string(&self.payload, key)
    }

    pub fn date(&self) -> Option<String> {
        payload_date(&self.payload)
    }

    /// Score used for presentation: the reranked score when present
    pub fn score(&self) -> f64 {
        self.final_score.unwrap_or(self.fused_score)
    }
}

// ============================================================================
// TESTS
// ============================================================================
