//! Local Semantic Embeddings
//!
//! Uses fastembed v5 for local ONNX inference. No external API calls.
//!
//! ## Models
//!
//! - **Default**: Multilingual E5 Large (1024d, trained with `query:` / `passage:` prefixes)
//! - Nomic Embed Text v1.5 (768d, Matryoshka)
//! - BGE Small EN v1.5 (384d)

use std::sync::Mutex;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::backend::{EmbeddingBackend, EmbeddingError, Role};
use super::slot::ModelSlot;

/// Maximum text length for embedding (truncated if longer), in bytes
pub const MAX_TEXT_LENGTH: usize = 8192;

// ============================================================================
// GLOBAL MODEL (with Mutex for fastembed v5 API)
// ============================================================================

/// A loaded model and the name it was loaded under
pub struct LoadedEmbedder {
    name: String,
    model: Mutex<TextEmbedding>,
}

static EMBEDDING_MODEL: ModelSlot<LoadedEmbedder> = ModelSlot::new();

/// Get the fastembed model directory
/// Uses FASTEMBED_CACHE_PATH env var, or falls back to the braid cache directory
fn get_cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return std::path::PathBuf::from(path);
    }
    crate::config::default_cache_dir().join("fastembed")
}

/// Resolve a configured model name to a fastembed model and its native dimensions
fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize), EmbeddingError> {
    match name.to_lowercase().as_str() {
        "multilingual-e5-large" | "intfloat/multilingual-e5-large" => {
            Ok((EmbeddingModel::MultilingualE5Large, 1024))
        }
        "nomic-embed-text-v1.5" | "nomic-ai/nomic-embed-text-v1.5" => {
            Ok((EmbeddingModel::NomicEmbedTextV15, 768))
        }
        "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        other => Err(EmbeddingError::ModelInit(format!(
            "Unsupported local embedding model: {other}"
        ))),
    }
}

/// Load (or reuse) the process-wide embedding model
fn get_model(name: &str) -> Result<std::sync::Arc<LoadedEmbedder>, EmbeddingError> {
    let loaded = EMBEDDING_MODEL.get_or_try_init(|| {
        let (model, _) = resolve_model(name)?;
        let cache_dir = get_cache_dir();

        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            tracing::warn!("Failed to create cache directory {:?}: {}", cache_dir, e);
        }

        let options = InitOptions::new(model)
            .with_show_download_progress(false)
            .with_cache_dir(cache_dir);

        TextEmbedding::try_new(options)
            .map(|model| LoadedEmbedder {
                name: name.to_string(),
                model: Mutex::new(model),
            })
            .map_err(|e| {
                EmbeddingError::ModelInit(format!(
                    "Failed to initialize {name}: {e}. \
                    Ensure ONNX runtime is available and model files can be downloaded."
                ))
            })
    })?;

    if loaded.name != name {
        return Err(EmbeddingError::ModelInit(format!(
            "{} is already loaded; reset the model slot before loading {}",
            loaded.name, name
        )));
    }
    Ok(loaded)
}

/// Drop the process-wide embedding model (tests, model swaps)
pub fn reset_embedding_model() -> bool {
    EMBEDDING_MODEL.reset()
}

// ============================================================================
// BACKEND
// ============================================================================

/// Embedding backend running a fastembed model on the blocking thread pool
pub struct FastEmbedBackend {
    model_name: String,
    dimensions: usize,
}

impl FastEmbedBackend {
    /// Load the model (downloads on first use)
    pub fn try_new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (_, dimensions) = resolve_model(model_name)?;
        get_model(model_name)?;
        tracing::info!(model = model_name, dimensions, "Local embedding model loaded");
        Ok(Self {
            model_name: model_name.to_string(),
            dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for FastEmbedBackend {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String], _role: Role) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let model_name = self.model_name.clone();
        let truncated: Vec<String> = texts.iter().map(|t| truncate_text(t).to_string()).collect();

        // First use may download and initialize the model
        tokio::task::spawn_blocking(move || {
            let loaded = get_model(&model_name)?;
            let mut model = loaded
                .model
                .lock()
                .map_err(|e| EmbeddingError::ModelInit(format!("Lock poisoned: {}", e)))?;
            model
                .embed(truncated, None)
                .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::EmbeddingFailed(format!("Inference task failed: {e}")))?
    }
}

/// Cut a text to at most `MAX_TEXT_LENGTH` bytes on a char boundary
fn truncate_text(text: &str) -> &str {
    if text.len() <= MAX_TEXT_LENGTH {
        return text;
    }
    let mut end = MAX_TEXT_LENGTH;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
