//! Scripted lexical and vector adapters

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use braid_core::search::AdapterError;
use braid_core::{LexicalSearch, SourceHit, VectorSearch};

/// What a mock adapter does when called
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return these hits (truncated to the requested limit)
    Hits(Vec<SourceHit>),
    /// Fail as if the index were unreachable
    Unavailable,
    /// Fail as if the response had the wrong shape
    Malformed,
    /// Never answer
    Hang,
}

impl MockBehavior {
    async fn run(&self, limit: usize) -> Result<Vec<SourceHit>, AdapterError> {
        match self {
            MockBehavior::Hits(hits) => Ok(hits.iter().take(limit).cloned().collect()),
            MockBehavior::Unavailable => Err(AdapterError::Unavailable("connection refused".into())),
            MockBehavior::Malformed => Err(AdapterError::Malformed("expected an array of hits".into())),
            MockBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Ok(vec![])
            }
        }
    }
}

/// Lexical adapter with a scripted answer and call accounting
pub struct MockLexical {
    behavior: MockBehavior,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl MockLexical {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn returning(hits: Vec<SourceHit>) -> Self {
        Self::new(MockBehavior::Hits(hits))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Query texts received, in call order
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LexicalSearch for MockLexical {
    fn name(&self) -> &str {
        "mock-lexical"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SourceHit>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        self.behavior.run(limit).await
    }
}

/// Vector adapter with a scripted answer and call accounting
pub struct MockVector {
    behavior: MockBehavior,
    calls: AtomicUsize,
    last_vector: Mutex<Option<Vec<f32>>>,
}

impl MockVector {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            last_vector: Mutex::new(None),
        }
    }

    pub fn returning(hits: Vec<SourceHit>) -> Self {
        Self::new(MockBehavior::Hits(hits))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The query vector of the most recent call
    pub fn last_vector(&self) -> Option<Vec<f32>> {
        self.last_vector.lock().ok().and_then(|v| v.clone())
    }
}

#[async_trait]
impl VectorSearch for MockVector {
    fn name(&self) -> &str {
        "mock-vector"
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SourceHit>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_vector.lock() {
            *last = Some(vector.to_vec());
        }
        self.behavior.run(limit).await
    }
}
