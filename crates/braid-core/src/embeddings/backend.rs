//! Embedding backend contract and vector math

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// ROLE
// ============================================================================

/// Which side of an asymmetric embedding model a text is encoded for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Query,
    Passage,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Query => "query",
            Role::Passage => "passage",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "query" => Ok(Role::Query),
            "passage" | "document" => Ok(Role::Passage),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Failed to initialize the embedding model
    #[error("Model initialization failed: {0}")]
    ModelInit(String),
    /// Backend call failed or answered with an unexpected shape
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
    /// Invalid input (empty, too long, etc.)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Backend vectors are shorter than the configured dimensions
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// Backend did not answer in time
    #[error("Embedding backend timed out after {0} ms")]
    Timeout(u64),
}

// ============================================================================
// BACKEND TRAIT
// ============================================================================

/// A model that turns texts into vectors.
///
/// Implementations return exactly one vector per input text, in input order.
/// Normalization and dimension fitting happen in the cache layer.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Name used in logs and health output
    fn name(&self) -> &str;

    /// Native output dimensions of the model
    fn dimensions(&self) -> usize;

    async fn embed(&self, texts: &[String], role: Role) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

// ============================================================================
// VECTOR MATH
// ============================================================================

/// Scale a vector to unit length in place. Zero vectors are left untouched.
#[inline]
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Euclidean norm
#[inline]
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Bring a backend vector to the configured size and unit length.
///
/// Longer vectors are Matryoshka-truncated (the leading N dimensions of such
/// models are themselves a valid N-dimensional embedding). Shorter vectors
/// cannot be repaired.
pub fn fit_dimensions(mut vector: Vec<f32>, dimensions: usize) -> Result<Vec<f32>, EmbeddingError> {
    if vector.len() < dimensions {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimensions,
            got: vector.len(),
        });
    }
    vector.truncate(dimensions);
    l2_normalize(&mut vector);
    Ok(vector)
}

/// Compute cosine similarity between two vectors
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 {
        dot_product / denominator
    } else {
        0.0
    }
}

/// Compute dot product between two vectors
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Encode a vector as little-endian f32 bytes
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode little-endian f32 bytes; `None` if the length is not a multiple of 4
pub fn vector_from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

// ============================================================================
// TESTS
// ============================================================================
