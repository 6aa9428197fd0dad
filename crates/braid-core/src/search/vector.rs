//! In-process Vector Index
//!
//! Uses USearch for HNSW (Hierarchical Navigable Small World) indexing.
//!
//! Features:
//! - Cosine similarity, reported as `1 - distance`
//! - Incremental upserts and removals
//! - Chunk payloads stored alongside the vectors
//! - Persistence to disk

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::adapters::{AdapterError, VectorSearch};
use crate::document::{Payload, SourceHit};

// ============================================================================
// CONSTANTS
// ============================================================================

/// HNSW connectivity parameter (higher = better recall, more memory)
pub const DEFAULT_CONNECTIVITY: usize = 16;

/// HNSW expansion factor for index building
pub const DEFAULT_EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search (higher = better recall, slower)
pub const DEFAULT_EXPANSION_SEARCH: usize = 64;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Vector index error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum VectorIndexError {
    #[error("Index creation failed: {0}")]
    IndexCreation(String),
    #[error("Failed to add vector: {0}")]
    IndexAdd(String),
    #[error("Search failed: {0}")]
    IndexSearch(String),
    #[error("Persistence failed: {0}")]
    IndexPersistence(String),
    #[error("Invalid dimensions: expected {0}, got {1}")]
    InvalidDimensions(usize, usize),
}

impl From<VectorIndexError> for AdapterError {
    fn from(e: VectorIndexError) -> Self {
        match e {
            VectorIndexError::InvalidDimensions(..) => AdapterError::Malformed(e.to_string()),
            other => AdapterError::Unavailable(other.to_string()),
        }
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the vector index
#[derive(Debug, Clone)]
pub struct LocalVectorIndexConfig {
    pub dimensions: usize,
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
}

impl LocalVectorIndexConfig {
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
        }
    }

    fn options(&self) -> IndexOptions {
        IndexOptions {
            dimensions: self.dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::I8,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false,
        }
    }
}

/// Sidecar file contents: string ids and payloads for each numeric key
#[derive(Default, Serialize, Deserialize)]
struct Mappings {
    key_to_id: HashMap<String, u64>,
    payloads: HashMap<String, Payload>,
    next_id: u64,
}

fn add_err(e: impl std::fmt::Display) -> VectorIndexError {
    VectorIndexError::IndexAdd(e.to_string())
}

fn persist(e: impl std::fmt::Display) -> VectorIndexError {
    VectorIndexError::IndexPersistence(e.to_string())
}

struct Inner {
    index: Index,
    mappings: Mappings,
    id_to_key: HashMap<u64, String>,
}

// ============================================================================
// VECTOR INDEX
// ============================================================================

/// HNSW index over chunk embeddings
pub struct LocalVectorIndex {
    config: LocalVectorIndexConfig,
    inner: Arc<RwLock<Inner>>,
}

impl LocalVectorIndex {
    pub fn new(config: LocalVectorIndexConfig) -> Result<Self, VectorIndexError> {
        let index =
            Index::new(&config.options()).map_err(|e| VectorIndexError::IndexCreation(e.to_string()))?;
        Ok(Self {
            config,
            inner: Arc::new(RwLock::new(Inner {
                index,
                mappings: Mappings::default(),
                id_to_key: HashMap::new(),
            })),
        })
    }

    /// Load from `path` when it exists, otherwise start empty
    pub fn open(path: &Path, config: LocalVectorIndexConfig) -> Result<Self, VectorIndexError> {
        if path.exists() {
            Self::load(path, config)
        } else {
            Self::new(config)
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, VectorIndexError> {
        read_lock(&self.inner)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, VectorIndexError> {
        self.inner
            .write()
            .map_err(|_| VectorIndexError::IndexAdd("index lock poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.read().map(|inner| inner.index.size()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read()
            .map(|inner| inner.mappings.key_to_id.contains_key(key))
            .unwrap_or(false)
    }

    /// Insert or replace the vector and payload stored under `key`
    pub fn upsert(&self, key: &str, vector: &[f32], payload: Payload) -> Result<(), VectorIndexError> {
        if vector.len() != self.config.dimensions {
            return Err(VectorIndexError::InvalidDimensions(
                self.config.dimensions,
                vector.len(),
            ));
        }

        let mut inner = self.write()?;
        if let Some(&existing_id) = inner.mappings.key_to_id.get(key) {
            inner.index.remove(existing_id).map_err(add_err)?;
            let size = inner.index.size();
            inner.index.reserve(size + 1).map_err(add_err)?;
            inner.index.add(existing_id, vector).map_err(add_err)?;
            inner.mappings.payloads.insert(key.to_string(), payload);
            return Ok(());
        }

        // usearch requires capacity to be reserved before add()
        let capacity = inner.index.capacity();
        if inner.index.size() >= capacity {
            inner
                .index
                .reserve(std::cmp::max(capacity * 2, 16))
                .map_err(add_err)?;
        }

        let id = inner.mappings.next_id;
        inner.mappings.next_id += 1;
        inner.index.add(id, vector).map_err(add_err)?;

        inner.mappings.key_to_id.insert(key.to_string(), id);
        inner.mappings.payloads.insert(key.to_string(), payload);
        inner.id_to_key.insert(id, key.to_string());
        Ok(())
    }

    /// Remove a vector by key
    pub fn remove(&self, key: &str) -> Result<bool, VectorIndexError> {
        let mut inner = self.write()?;
        let Some(id) = inner.mappings.key_to_id.remove(key) else {
            return Ok(false);
        };
        inner.id_to_key.remove(&id);
        inner.mappings.payloads.remove(key);
        inner
            .index
            .remove(id)
            .map_err(|e| VectorIndexError::IndexAdd(e.to_string()))?;
        Ok(true)
    }

    /// Nearest neighbours of `query`, best first
    pub fn search_sync(&self, query: &[f32], limit: usize) -> Result<Vec<SourceHit>, VectorIndexError> {
        nearest(&self.inner, self.config.dimensions, query, limit)
    }

    /// Save the index and its `<path>.mappings.json` sidecar
    pub fn save(&self, path: &Path) -> Result<(), VectorIndexError> {
        let path_str = path.to_str().ok_or_else(|| persist("Invalid path"))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(persist)?;
        }

        let inner = self.read()?;
        inner.index.save(path_str).map_err(persist)?;

        let mappings = serde_json::to_string(&inner.mappings).map_err(persist)?;
        std::fs::write(path.with_extension("mappings.json"), mappings)
            .map_err(persist)?;
        Ok(())
    }

    /// Load an index saved with [`LocalVectorIndex::save`]
    pub fn load(path: &Path, config: LocalVectorIndexConfig) -> Result<Self, VectorIndexError> {
        let path_str = path.to_str().ok_or_else(|| persist("Invalid path"))?;

        let index =
            Index::new(&config.options()).map_err(|e| VectorIndexError::IndexCreation(e.to_string()))?;
        index.load(path_str).map_err(persist)?;

        let raw = std::fs::read_to_string(path.with_extension("mappings.json"))
            .map_err(persist)?;
        let mappings: Mappings = serde_json::from_str(&raw).map_err(persist)?;

        let id_to_key = mappings
            .key_to_id
            .iter()
            .map(|(k, &v)| (v, k.clone()))
            .collect();

        Ok(Self {
            config,
            inner: Arc::new(RwLock::new(Inner {
                index,
                mappings,
                id_to_key,
            })),
        })
    }
}

fn read_lock(inner: &RwLock<Inner>) -> Result<std::sync::RwLockReadGuard<'_, Inner>, VectorIndexError> {
    inner
        .read()
        .map_err(|_| VectorIndexError::IndexSearch("index lock poisoned".to_string()))
}

fn nearest(
    inner: &RwLock<Inner>,
    dimensions: usize,
    query: &[f32],
    limit: usize,
) -> Result<Vec<SourceHit>, VectorIndexError> {
    if query.len() != dimensions {
        return Err(VectorIndexError::InvalidDimensions(dimensions, query.len()));
    }

    let inner = read_lock(inner)?;
    if inner.index.size() == 0 || limit == 0 {
        return Ok(vec![]);
    }

    let results = inner
        .index
        .search(query, limit)
        .map_err(|e| VectorIndexError::IndexSearch(e.to_string()))?;

    let mut hits = Vec::with_capacity(results.keys.len());
    for (id, distance) in results.keys.iter().zip(results.distances.iter()) {
        if let Some(key) = inner.id_to_key.get(id) {
            hits.push(SourceHit {
                id: key.clone(),
                score: 1.0 - distance,
                payload: inner.mappings.payloads.get(key).cloned().unwrap_or_default(),
            });
        }
    }
    Ok(hits)
}

#[async_trait]
impl VectorSearch for LocalVectorIndex {
    fn name(&self) -> &str {
        "usearch"
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SourceHit>, AdapterError> {
        // HNSW traversal and lock waits stay off the async workers
        let inner = Arc::clone(&self.inner);
        let dimensions = self.config.dimensions;
        let query = vector.to_vec();
        let hits = tokio::task::spawn_blocking(move || nearest(&inner, dimensions, &query, limit))
            .await
            .map_err(|e| AdapterError::Unavailable(format!("search task failed: {e}")))??;
        Ok(hits)
    }
}

// ============================================================================
// TESTS
// ============================================================================
