//! Qdrant vector adapter (REST)

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::adapters::{AdapterError, VectorSearch};
use crate::document::{Payload, SourceHit};

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Payload>,
}

/// Vector adapter over a Qdrant collection of chunks.
///
/// Scores are cosine similarities, already higher-is-better.
pub struct QdrantIndex {
    client: reqwest::Client,
    url: String,
    collection: String,
}

impl QdrantIndex {
    pub fn new(url: &str, collection: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            collection: collection.into(),
        }
    }

    fn to_source_hit(point: ScoredPoint) -> Result<SourceHit, AdapterError> {
        let point_id = match point.id {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => return Err(AdapterError::Malformed(format!("unexpected point id {other}"))),
        };
        let payload = point.payload.unwrap_or_default();
        // Chunks indexed with an explicit document id keep it as the join key
        let id = payload
            .get("doc_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or(point_id);

        Ok(SourceHit {
            id,
            score: point.score,
            payload,
        })
    }
}

#[async_trait]
impl VectorSearch for QdrantIndex {
    fn name(&self) -> &str {
        "qdrant"
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SourceHit>, AdapterError> {
        if limit == 0 {
            return Ok(vec![]);
        }

        let url = format!("{}/collections/{}/points/search", self.url, self.collection);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "vector": vector,
                "limit": limit,
                "with_payload": true,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Unavailable(format!(
                "collection {} returned {status}",
                self.collection
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Malformed(e.to_string()))?;

        parsed.result.into_iter().map(Self::to_source_hit).collect()
    }
}
