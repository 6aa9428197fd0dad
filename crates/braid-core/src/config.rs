//! Engine Configuration
//!
//! Every tunable of the retrieval pipeline lives here. Values start from
//! defaults and are overlaid from `BRAID_*` environment variables at startup.
//! Backend selection happens once, from these values, and never changes for
//! the lifetime of the process.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default RRF smoothing constant
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Default number of hits requested from each source before fusion
pub const DEFAULT_SOURCE_LIMIT: usize = 50;

/// Default embedding dimensions
pub const DEFAULT_DIMENSIONS: usize = 1024;

/// Default weight of the cross-encoder signal in the final blend
pub const DEFAULT_RERANK_ALPHA: f64 = 0.7;

/// Minimum number of fused candidates handed to the reranker
pub const DEFAULT_RERANK_WINDOW: usize = 20;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Configuration error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable was present but could not be parsed
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    /// Unknown backend name
    #[error("Unknown {component} backend: {name:?}")]
    UnknownBackend { component: &'static str, name: String },
    /// Values parse but are inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// BACKEND KINDS
// ============================================================================

/// Lexical index implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LexicalBackendKind {
    /// SQLite FTS5 table
    Sqlite,
    /// OpenSearch cluster
    OpenSearch,
    Disabled,
}

impl FromStr for LexicalBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "fts5" => Ok(Self::Sqlite),
            "opensearch" | "open-search" => Ok(Self::OpenSearch),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            other => Err(ConfigError::UnknownBackend {
                component: "lexical",
                name: other.to_string(),
            }),
        }
    }
}

/// Vector index implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VectorBackendKind {
    /// Qdrant over HTTP
    Qdrant,
    /// In-process HNSW index (requires the `vector-search` feature)
    Local,
    Disabled,
}

impl FromStr for VectorBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "local" | "usearch" | "hnsw" => Ok(Self::Local),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            other => Err(ConfigError::UnknownBackend {
                component: "vector",
                name: other.to_string(),
            }),
        }
    }
}

/// Embedding model backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingBackendKind {
    /// Local ONNX inference (requires the `embeddings` feature)
    FastEmbed,
    /// Remote Ollama-compatible `/api/embed` endpoint
    Http,
    /// Deterministic feature hashing, no model required
    Hashing,
}

impl Default for EmbeddingBackendKind {
    fn default() -> Self {
        #[cfg(feature = "embeddings")]
        {
            Self::FastEmbed
        }
        #[cfg(not(feature = "embeddings"))]
        {
            Self::Hashing
        }
    }
}

impl FromStr for EmbeddingBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fastembed" | "local" | "onnx" => Ok(Self::FastEmbed),
            "http" | "ollama" | "remote" => Ok(Self::Http),
            "hashing" | "hash" => Ok(Self::Hashing),
            other => Err(ConfigError::UnknownBackend {
                component: "embedding",
                name: other.to_string(),
            }),
        }
    }
}

/// Cross-encoder backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RerankBackendKind {
    /// Local cross-encoder (requires the `embeddings` feature)
    CrossEncoder,
    /// Remote TEI-compatible `/rerank` endpoint
    Http,
    Disabled,
}

impl Default for RerankBackendKind {
    fn default() -> Self {
        #[cfg(feature = "embeddings")]
        {
            Self::CrossEncoder
        }
        #[cfg(not(feature = "embeddings"))]
        {
            Self::Disabled
        }
    }
}

impl FromStr for RerankBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cross-encoder" | "crossencoder" | "fastembed" | "local" => Ok(Self::CrossEncoder),
            "http" | "tei" | "remote" => Ok(Self::Http),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            other => Err(ConfigError::UnknownBackend {
                component: "rerank",
                name: other.to_string(),
            }),
        }
    }
}

/// Embedding cache storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheBackendKind {
    /// In-process LRU
    Memory,
    /// SQLite file, survives restarts
    Sqlite,
    Disabled,
}

impl FromStr for CacheBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "lru" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            other => Err(ConfigError::UnknownBackend {
                component: "cache",
                name: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// SECTIONS
// ============================================================================

/// Rank fusion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// RRF constant (higher = flatter contribution across ranks)
    pub rrf_k: f64,
    /// Hits requested from each source list
    pub source_limit: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
            source_limit: DEFAULT_SOURCE_LIMIT,
        }
    }
}

/// Metadata filter and recency settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Boost given to a document dated today
    pub recency_max_boost: f64,
    /// Age in days at which the boost reaches zero
    pub recency_window_days: i64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            recency_max_boost: 0.2,
            recency_window_days: 365,
        }
    }
}

/// Reranking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    /// Administrative switch; when off the fused order is returned as-is
    pub enabled: bool,
    pub backend: RerankBackendKind,
    /// Cross-encoder model name (local backend) or model id sent to the HTTP backend
    pub model: String,
    /// Base URL of the HTTP backend
    pub url: Option<String>,
    /// Weight of the normalized cross-encoder score
    pub alpha: f64,
    /// The rerank window is `max(min_window, top_k)`
    pub min_window: usize,
    /// Concurrent scorer invocations allowed across all queries
    pub max_concurrency: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: RerankBackendKind::default(),
            model: "bge-reranker-base".to_string(),
            url: None,
            alpha: DEFAULT_RERANK_ALPHA,
            min_window: DEFAULT_RERANK_WINDOW,
            max_concurrency: 4,
        }
    }
}

/// Embedding settings. Every field that changes the produced vector is part
/// of the cache key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackendKind,
    pub model: String,
    /// Base URL of the HTTP backend
    pub url: Option<String>,
    pub dimensions: usize,
    /// Prepend role-specific prefixes before hashing and embedding
    pub use_template: bool,
    pub query_prefix: String,
    pub passage_prefix: String,
    /// Texts per backend call on cache misses
    pub batch_size: usize,
    /// Concurrent backend calls allowed across all queries
    pub max_concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackendKind::default(),
            model: "multilingual-e5-large".to_string(),
            url: None,
            dimensions: DEFAULT_DIMENSIONS,
            use_template: true,
            query_prefix: "query: ".to_string(),
            passage_prefix: "passage: ".to_string(),
            batch_size: 32,
            max_concurrency: 4,
        }
    }
}

/// Embedding cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    /// Maximum entries for the memory backend
    pub capacity: usize,
    /// SQLite file for the sqlite backend
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            capacity: 10_000,
            path: default_cache_dir().join("embeddings.db"),
        }
    }
}

/// Lexical index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalConfig {
    pub backend: LexicalBackendKind,
    pub sqlite_path: PathBuf,
    pub opensearch_url: String,
    pub opensearch_index: String,
    pub opensearch_user: Option<String>,
    #[serde(skip_serializing)]
    pub opensearch_password: Option<String>,
    /// Skip TLS certificate verification (self-signed dev clusters)
    pub opensearch_insecure: bool,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            backend: LexicalBackendKind::Sqlite,
            sqlite_path: default_data_dir().join("ir.db"),
            opensearch_url: "http://localhost:9200".to_string(),
            opensearch_index: "posts".to_string(),
            opensearch_user: None,
            opensearch_password: None,
            opensearch_insecure: false,
        }
    }
}

/// Vector index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub backend: VectorBackendKind,
    pub qdrant_url: String,
    pub qdrant_collection: String,
    /// Index file for the local backend
    pub index_path: PathBuf,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackendKind::Disabled,
            qdrant_url: "http://localhost:6333".to_string(),
            qdrant_collection: "chunks".to_string(),
            index_path: default_data_dir().join("vectors.usearch"),
        }
    }
}

/// Per-call timeouts in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Lexical and vector index calls
    pub adapter_ms: u64,
    pub embedding_ms: u64,
    pub rerank_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            adapter_ms: 5_000,
            embedding_ms: 10_000,
            rerank_ms: 10_000,
        }
    }
}

impl TimeoutConfig {
    pub fn adapter(&self) -> Duration {
        Duration::from_millis(self.adapter_ms)
    }

    pub fn embedding(&self) -> Duration {
        Duration::from_millis(self.embedding_ms)
    }

    pub fn rerank(&self) -> Duration {
        Duration::from_millis(self.rerank_ms)
    }
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fusion: FusionConfig,
    pub filter: FilterConfig,
    pub rerank: RerankConfig,
    pub embedding: EmbeddingConfig,
    pub cache: CacheConfig,
    pub lexical: LexicalConfig,
    pub vector: VectorConfig,
    pub timeouts: TimeoutConfig,
}

impl EngineConfig {
    /// Build from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, overlaying defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Fusion
        if let Some(v) = parse_var(&var, "BRAID_RRF_K")? {
            config.fusion.rrf_k = v;
        }
        if let Some(v) = parse_var(&var, "BRAID_SOURCE_LIMIT")? {
            config.fusion.source_limit = v;
        }

        // Filter
        if let Some(v) = parse_var(&var, "BRAID_RECENCY_MAX_BOOST")? {
            config.filter.recency_max_boost = v;
        }
        if let Some(v) = parse_var(&var, "BRAID_RECENCY_WINDOW_DAYS")? {
            config.filter.recency_window_days = v;
        }

        // Rerank
        if let Some(v) = parse_bool(&var, "BRAID_RERANK_ENABLED")? {
            config.rerank.enabled = v;
        }
        if let Some(v) = var("BRAID_RERANK_BACKEND") {
            config.rerank.backend = v.parse()?;
        }
        if let Some(v) = var("BRAID_RERANK_MODEL") {
            config.rerank.model = v;
        }
        if let Some(v) = var("BRAID_RERANK_URL") {
            config.rerank.url = Some(v);
        }
        if let Some(v) = parse_var(&var, "BRAID_RERANK_ALPHA")? {
            config.rerank.alpha = v;
        }
        if let Some(v) = parse_var(&var, "BRAID_RERANK_MIN_WINDOW")? {
            config.rerank.min_window = v;
        }
        if let Some(v) = parse_var(&var, "BRAID_RERANK_MAX_CONCURRENCY")? {
            config.rerank.max_concurrency = v;
        }

        // Embeddings
        if let Some(v) = var("BRAID_EMBEDDING_BACKEND") {
            config.embedding.backend = v.parse()?;
        }
        if let Some(v) = var("BRAID_EMBEDDING_MODEL") {
            config.embedding.model = v;
        }
        if let Some(v) = var("BRAID_EMBEDDING_URL") {
            config.embedding.url = Some(v);
        }
        if let Some(v) = parse_var(&var, "BRAID_EMBEDDING_DIM")? {
            config.embedding.dimensions = v;
        }
        if let Some(v) = parse_bool(&var, "BRAID_EMBEDDING_TEMPLATE")? {
            config.embedding.use_template = v;
        }
        // Prefixes keep their whitespace, so read them unfiltered
        if let Some(v) = lookup("BRAID_QUERY_PREFIX") {
            config.embedding.query_prefix = v;
        }
        if let Some(v) = lookup("BRAID_PASSAGE_PREFIX") {
            config.embedding.passage_prefix = v;
        }
        if let Some(v) = parse_var(&var, "BRAID_EMBEDDING_BATCH_SIZE")? {
            config.embedding.batch_size = v;
        }
        if let Some(v) = parse_var(&var, "BRAID_EMBEDDING_MAX_CONCURRENCY")? {
            config.embedding.max_concurrency = v;
        }

        // Cache
        if let Some(v) = var("BRAID_CACHE_BACKEND") {
            config.cache.backend = v.parse()?;
        }
        if let Some(v) = parse_var(&var, "BRAID_CACHE_CAPACITY")? {
            config.cache.capacity = v;
        }
        if let Some(v) = var("BRAID_CACHE_PATH") {
            config.cache.path = PathBuf::from(v);
        }

        // Lexical
        if let Some(v) = var("BRAID_LEXICAL_BACKEND") {
            config.lexical.backend = v.parse()?;
        }
        if let Some(v) = var("BRAID_SQLITE_PATH") {
            config.lexical.sqlite_path = PathBuf::from(v);
        }
        if let Some(v) = var("BRAID_OPENSEARCH_URL") {
            config.lexical.opensearch_url = v;
        }
        if let Some(v) = var("BRAID_OPENSEARCH_INDEX") {
            config.lexical.opensearch_index = v;
        }
        if let Some(v) = var("BRAID_OPENSEARCH_USER") {
            config.lexical.opensearch_user = Some(v);
        }
        if let Some(v) = var("BRAID_OPENSEARCH_PASSWORD") {
            config.lexical.opensearch_password = Some(v);
        }
        if let Some(v) = parse_bool(&var, "BRAID_OPENSEARCH_INSECURE")? {
            config.lexical.opensearch_insecure = v;
        }

        // Vector
        if let Some(v) = var("BRAID_VECTOR_BACKEND") {
            config.vector.backend = v.parse()?;
        }
        if let Some(v) = var("BRAID_QDRANT_URL") {
            config.vector.qdrant_url = v;
        }
        if let Some(v) = var("BRAID_QDRANT_COLLECTION") {
            config.vector.qdrant_collection = v;
        }
        if let Some(v) = var("BRAID_VECTOR_INDEX_PATH") {
            config.vector.index_path = PathBuf::from(v);
        }

        // Timeouts
        if let Some(v) = parse_var(&var, "BRAID_ADAPTER_TIMEOUT_MS")? {
            config.timeouts.adapter_ms = v;
        }
        if let Some(v) = parse_var(&var, "BRAID_EMBEDDING_TIMEOUT_MS")? {
            config.timeouts.embedding_ms = v;
        }
        if let Some(v) = parse_var(&var, "BRAID_RERANK_TIMEOUT_MS")? {
            config.timeouts.rerank_ms = v;
        }

        config.validate()
    }

    /// Reject unusable values and clamp the ones with a natural range
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.fusion.rrf_k <= 0.0 || !self.fusion.rrf_k.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "rrf_k must be a positive number, got {}",
                self.fusion.rrf_k
            )));
        }
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid(
                "embedding dimensions must be non-zero".to_string(),
            ));
        }
        if self.fusion.source_limit == 0 {
            return Err(ConfigError::Invalid(
                "source_limit must be non-zero".to_string(),
            ));
        }
        if !self.rerank.alpha.is_finite() {
            self.rerank.alpha = DEFAULT_RERANK_ALPHA;
        }
        self.rerank.alpha = self.rerank.alpha.clamp(0.0, 1.0);
        self.rerank.max_concurrency = self.rerank.max_concurrency.max(1);
        self.embedding.max_concurrency = self.embedding.max_concurrency.max(1);
        self.embedding.batch_size = self.embedding.batch_size.max(1);
        self.cache.capacity = self.cache.capacity.max(1);
        self.filter.recency_window_days = self.filter.recency_window_days.max(1);
        Ok(self)
    }
}

fn parse_var<T, F>(var: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

fn parse_bool<F>(var: &F, key: &str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: "expected a boolean".to_string(),
            }),
        },
    }
}

// ============================================================================
// PLATFORM DIRECTORIES
// ============================================================================

/// Platform cache directory for braid (embedding cache, model files)
///
/// macOS: ~/Library/Caches/com.braid.core
/// Linux: ~/.cache/braid
/// Windows: %LOCALAPPDATA%\braid\core\cache
pub fn default_cache_dir() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "braid", "core") {
        return proj_dirs.cache_dir().to_path_buf();
    }
    if let Some(base_dirs) = directories::BaseDirs::new() {
        return base_dirs.home_dir().join(".cache/braid");
    }
    PathBuf::from(".braid_cache")
}

/// Platform data directory for braid (local indexes)
pub fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "braid", "core") {
        return proj_dirs.data_dir().to_path_buf();
    }
    PathBuf::from(".braid_data")
}

// ============================================================================
// TESTS
// ============================================================================
