//! Query entrypoint types

use serde::{Deserialize, Serialize};

use super::CandidateDocument;

/// Results returned when the caller does not ask for a count
pub const DEFAULT_TOP_K: usize = 20;

/// Maximum snippet length, in characters
pub const SNIPPET_CHARS: usize = 300;

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// Metadata filters; every field is optional and they are AND-combined
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    pub category: Option<String>,
    pub filetype: Option<String>,
    /// Inclusive lower bound, `YYYY-MM-DD`
    pub date_from: Option<String>,
    /// Inclusive upper bound, `YYYY-MM-DD`
    pub date_to: Option<String>,
}

impl SearchFilters {
    /// True when no field constrains anything
    pub fn is_empty(&self) -> bool {
        [
            &self.category,
            &self.filetype,
            &self.date_from,
            &self.date_to,
        ]
        .iter()
        .all(|f| f.as_deref().is_none_or(str::is_empty))
    }
}

/// A hybrid search request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub filters: Option<SearchFilters>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: DEFAULT_TOP_K,
            filters: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = Some(filters);
        self
    }
}

/// One ranked result as returned to callers (citation context for answer
/// generation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    /// At most 300 characters of source text
    pub snippet: String,
    /// Human-readable locator
    pub source: String,
    pub title: String,
    pub post_id: Option<String>,
    pub filetype: Option<String>,
    pub posted_at: Option<String>,
    pub category: Option<String>,
}

impl SearchHit {
    /// Render a ranked candidate
    pub fn from_candidate(doc: &CandidateDocument) -> Self {
        let title = doc
            .field("title")
            .or_else(|| doc.field("post_id"))
            .unwrap_or_else(|| doc.id.clone());

        let snippet: String = doc.text().chars().take(SNIPPET_CHARS).collect();

        let source = doc.field("source").unwrap_or_else(|| {
            let chunk = doc.field("chunk_id").unwrap_or_else(|| "?".to_string());
            format!("{title}#chunk:{chunk}")
        });

        // Lexical rows are keyed `post:<rowid>` and may not carry the post id
        let post_id = doc.field("post_id").or_else(|| {
            doc.id
                .strip_prefix("post:")
                .filter(|rest| !rest.is_empty())
                .map(str::to_string)
        });

        Self {
            id: doc.id.clone(),
            score: doc.score(),
            snippet,
            source,
            title,
            post_id,
            filetype: doc.field("filetype"),
            posted_at: doc.date(),
            category: doc.field("category"),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
