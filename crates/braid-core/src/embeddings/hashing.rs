//! Feature-hashing embedder
//!
//! Each lower-cased alphanumeric token is hashed with blake3 into one of
//! `dimensions` buckets with a hash-derived sign. Texts sharing vocabulary
//! land near each other, which is enough for offline operation and tests.
//! No model, no network, fully deterministic.

use async_trait::async_trait;

use super::backend::{EmbeddingBackend, EmbeddingError, Role, l2_normalize};

/// Deterministic bag-of-tokens embedder
#[derive(Debug, Clone)]
pub struct HashingEmbeddingBackend {
    dimensions: usize,
}

impl HashingEmbeddingBackend {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Embed one text synchronously
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let bucket = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as usize
                % self.dimensions;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingBackend for HashingEmbeddingBackend {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String], _role: Role) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
