//! Remote embedding backend (Ollama-compatible `/api/embed`)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::backend::{EmbeddingBackend, EmbeddingError, Role};

/// Default endpoint when none is configured
pub const DEFAULT_EMBED_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedding backend calling a remote model server.
///
/// Timeouts are applied by the cache layer, not here.
pub struct HttpEmbeddingBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl HttpEmbeddingBackend {
    pub fn new(base_url: Option<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, model, dimensions)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: Option<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_EMBED_URL.to_string());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions,
        }
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingBackend {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String], role: Role) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::EmbeddingFailed(format!("HTTP error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "{url} returned {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::EmbeddingFailed(format!("JSON parse error: {e}")))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        debug!(model = %self.model, role = %role, count = texts.len(), "Remote embeddings received");
        Ok(parsed.embeddings)
    }
}
