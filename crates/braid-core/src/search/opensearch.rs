//! OpenSearch lexical adapter

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::adapters::{AdapterError, LexicalSearch};
use crate::document::{Payload, SourceHit, SNIPPET_CHARS};

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f32>,
    #[serde(rename = "_source", default)]
    source: Payload,
    #[serde(default)]
    highlight: Option<Highlight>,
}

#[derive(Deserialize, Default)]
struct Highlight {
    #[serde(default)]
    body: Vec<String>,
}

/// Lexical adapter over an OpenSearch index of posts
pub struct OpenSearchIndex {
    client: reqwest::Client,
    url: String,
    index: String,
    credentials: Option<(String, String)>,
}

impl OpenSearchIndex {
    pub fn new(
        url: &str,
        index: impl Into<String>,
        user: Option<String>,
        password: Option<String>,
        insecure: bool,
    ) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure)
            .build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            index: index.into(),
            credentials: user.zip(password),
        })
    }

    /// Request body: fuzzy field match plus phrase-prefix, body/title highlights
    pub fn query_body(query: &str, limit: usize) -> Value {
        json!({
            "size": limit,
            "query": {
                "bool": {
                    "should": [
                        {
                            "multi_match": {
                                "query": query,
                                "fields": ["title^2", "body", "tags^1.5", "category"],
                                "type": "most_fields",
                                "operator": "and",
                                "fuzziness": "AUTO"
                            }
                        },
                        {
                            "multi_match": {
                                "query": query,
                                "fields": ["title^2", "body"],
                                "type": "phrase_prefix"
                            }
                        }
                    ]
                }
            },
            "highlight": {
                "fields": {
                    "body": { "fragment_size": 150, "number_of_fragments": 1 },
                    "title": { "fragment_size": 80, "number_of_fragments": 1 }
                }
            },
            "_source": ["title", "body", "tags", "category", "filetype", "posted_at"]
        })
    }

    fn to_source_hit(raw: RawHit) -> SourceHit {
        let src = raw.source;
        let fragment = raw.highlight.and_then(|h| h.body.into_iter().next());
        let snippet = fragment.unwrap_or_else(|| {
            src.get("body")
                .and_then(Value::as_str)
                .map(|b| b.chars().take(SNIPPET_CHARS).collect())
                .unwrap_or_default()
        });

        let tags = match src.get("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|t| t.as_str().map(str::to_string).unwrap_or_else(|| t.to_string()))
                .collect::<Vec<_>>()
                .join(","),
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        };

        let field = |key: &str| src.get(key).cloned().unwrap_or(Value::Null);
        let mut payload = Payload::new();
        payload.insert("title".into(), field("title"));
        payload.insert("snippet".into(), Value::String(snippet));
        payload.insert("tags".into(), Value::String(tags));
        payload.insert("category".into(), field("category"));
        payload.insert("filetype".into(), field("filetype"));
        payload.insert("date".into(), field("posted_at"));

        SourceHit {
            id: raw.id,
            score: raw.score.unwrap_or(0.0),
            payload,
        }
    }
}

#[async_trait]
impl LexicalSearch for OpenSearchIndex {
    fn name(&self) -> &str {
        "opensearch"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SourceHit>, AdapterError> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let mut request = self
            .client
            .post(format!("{}/{}/_search", self.url, self.index))
            .json(&Self::query_body(query, limit));
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Unavailable(format!(
                "{} returned {status}",
                self.index
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Malformed(e.to_string()))?;

        Ok(parsed.hits.hits.into_iter().map(Self::to_source_hit).collect())
    }
}
