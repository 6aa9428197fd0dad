//! Embedding Cache
//!
//! Memoizes vectors under a key derived from everything that affects them:
//! model, role, dimensions, the template switch, both prefixes and the text.
//! Changing any of these produces a new key, so a stale vector is never served
//! under a changed configuration.
//!
//! The cache store is optional and best-effort. A failing store degrades to
//! "always compute, never persist"; it never fails an embedding call.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use rusqlite::{params, params_from_iter, Connection};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::backend::{
    fit_dimensions, vector_from_bytes, vector_to_bytes, EmbeddingBackend, EmbeddingError, Role,
};
use crate::config::EmbeddingConfig;

/// Version tag baked into every key; bump when the derivation changes
const KEY_VERSION: &str = "v1";

/// Max bound parameters per SQLite lookup statement
const SQLITE_LOOKUP_CHUNK: usize = 500;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Cache store error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
    #[error("Cache database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Corrupt cache entry {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

// ============================================================================
// KEYS
// ============================================================================

/// The configuration that determines what vector a text maps to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingSettings {
    pub model: String,
    pub dimensions: usize,
    pub use_template: bool,
    pub query_prefix: String,
    pub passage_prefix: String,
}

impl EmbeddingSettings {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            model: config.model.clone(),
            dimensions: config.dimensions,
            use_template: config.use_template,
            query_prefix: config.query_prefix.clone(),
            passage_prefix: config.passage_prefix.clone(),
        }
    }

    /// The text actually embedded: the role prefix is prepended when templating is on
    pub fn apply_template(&self, role: Role, text: &str) -> String {
        if !self.use_template {
            return text.to_string();
        }
        let prefix = match role {
            Role::Query => &self.query_prefix,
            Role::Passage => &self.passage_prefix,
        };
        format!("{prefix}{text}")
    }
}

/// Stable cache key, rendered as `emb:v1:<blake3 hex>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `text` embedded under `role`.
    ///
    /// Fields are length-prefixed so that no two field tuples share an encoding.
    pub fn derive(settings: &EmbeddingSettings, role: Role, text: &str) -> Self {
        let templated = settings.apply_template(role, text);
        let dimensions = settings.dimensions.to_string();
        let fields: [&str; 7] = [
            &settings.model,
            role.as_str(),
            &dimensions,
            if settings.use_template { "1" } else { "0" },
            &settings.query_prefix,
            &settings.passage_prefix,
            &templated,
        ];

        let mut hasher = blake3::Hasher::new();
        for field in fields {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        Self(format!("emb:{KEY_VERSION}:{}", hasher.finalize().to_hex()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// STORES
// ============================================================================

/// Key/vector storage behind the embedding cache.
///
/// Entries are independent; concurrent writers of the same key write the same
/// value, so last-write-wins is harmless.
pub trait CacheBackend: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, key: &CacheKey) -> Result<Option<Vec<f32>>, CacheError>;

    fn set(&self, key: &CacheKey, vector: &[f32]) -> Result<(), CacheError>;

    /// Bulk lookup, one slot per key in key order
    fn get_many(&self, keys: &[CacheKey]) -> Result<Vec<Option<Vec<f32>>>, CacheError> {
        keys.iter().map(|k| self.get(k)).collect()
    }

    fn set_many(&self, entries: &[(CacheKey, Vec<f32>)]) -> Result<(), CacheError> {
        for (key, vector) in entries {
            self.set(key, vector)?;
        }
        Ok(())
    }

    fn len(&self) -> Result<usize, CacheError>;
}

/// In-process LRU store
pub struct MemoryCache {
    entries: Mutex<LruCache<String, Vec<f32>>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LruCache<String, Vec<f32>>>, CacheError> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Unavailable("cache lock poisoned".to_string()))
    }
}

impl CacheBackend for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Vec<f32>>, CacheError> {
        Ok(self.lock()?.get(key.as_str()).cloned())
    }

    fn set(&self, key: &CacheKey, vector: &[f32]) -> Result<(), CacheError> {
        self.lock()?.put(key.as_str().to_string(), vector.to_vec());
        Ok(())
    }

    fn get_many(&self, keys: &[CacheKey]) -> Result<Vec<Option<Vec<f32>>>, CacheError> {
        let mut entries = self.lock()?;
        Ok(keys.iter().map(|k| entries.get(k.as_str()).cloned()).collect())
    }

    fn set_many(&self, new_entries: &[(CacheKey, Vec<f32>)]) -> Result<(), CacheError> {
        let mut entries = self.lock()?;
        for (key, vector) in new_entries {
            entries.put(key.as_str().to_string(), vector.clone());
        }
        Ok(())
    }

    fn len(&self) -> Result<usize, CacheError> {
        Ok(self.lock()?.len())
    }
}

/// Persistent store in a SQLite file
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Open (creating if needed) the cache database at `path`
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS embedding_cache (
                 key TEXT PRIMARY KEY,
                 vector BLOB NOT NULL,
                 created_at TEXT NOT NULL
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Unavailable("connection lock poisoned".to_string()))
    }
}

fn decode_entry(key: &str, bytes: &[u8]) -> Result<Vec<f32>, CacheError> {
    vector_from_bytes(bytes).ok_or_else(|| CacheError::Corrupt {
        key: key.to_string(),
        reason: format!("blob length {} is not a multiple of 4", bytes.len()),
    })
}

impl CacheBackend for SqliteCache {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Vec<f32>>, CacheError> {
        Ok(self.get_many(std::slice::from_ref(key))?.pop().flatten())
    }

    fn set(&self, key: &CacheKey, vector: &[f32]) -> Result<(), CacheError> {
        self.set_many(&[(key.clone(), vector.to_vec())])
    }

    fn get_many(&self, keys: &[CacheKey]) -> Result<Vec<Option<Vec<f32>>>, CacheError> {
        let conn = self.lock()?;
        let mut found: HashMap<String, Vec<f32>> = HashMap::with_capacity(keys.len());

        for chunk in keys.chunks(SQLITE_LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql =
                format!("SELECT key, vector FROM embedding_cache WHERE key IN ({placeholders})");
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter().map(CacheKey::as_str)), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;

            for row in rows {
                let (key, bytes) = row?;
                match decode_entry(&key, &bytes) {
                    Ok(vector) => {
                        found.insert(key, vector);
                    }
                    Err(e) => warn!(error = %e, "Ignoring corrupt cache entry"),
                }
            }
        }

        Ok(keys.iter().map(|k| found.get(k.as_str()).cloned()).collect())
    }

    fn set_many(&self, entries: &[(CacheKey, Vec<f32>)]) -> Result<(), CacheError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO embedding_cache (key, vector, created_at)
                 VALUES (?1, ?2, ?3)",
            )?;
            let now = chrono::Utc::now().to_rfc3339();
            for (key, vector) in entries {
                stmt.execute(params![key.as_str(), vector_to_bytes(vector), now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn len(&self) -> Result<usize, CacheError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM embedding_cache", [], |r| r.get(0))?;
        Ok(count.max(0) as usize)
    }
}

// ============================================================================
// EMBEDDING CACHE
// ============================================================================

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub backend_calls: u64,
    pub write_failures: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    backend_calls: AtomicU64,
    write_failures: AtomicU64,
}

/// Read-through cache in front of an embedding backend, shared across queries
pub struct EmbeddingCache {
    backend: Arc<dyn EmbeddingBackend>,
    store: Option<Arc<dyn CacheBackend>>,
    settings: EmbeddingSettings,
    batch_size: usize,
    timeout: Duration,
    permits: Semaphore,
    counters: Counters,
}

impl EmbeddingCache {
    pub fn new(
        backend: Arc<dyn EmbeddingBackend>,
        store: Option<Arc<dyn CacheBackend>>,
        config: &EmbeddingConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            store,
            settings: EmbeddingSettings::from_config(config),
            batch_size: config.batch_size.max(1),
            timeout,
            permits: Semaphore::new(config.max_concurrency.max(1)),
            counters: Counters::default(),
        }
    }

    pub fn settings(&self) -> &EmbeddingSettings {
        &self.settings
    }

    pub fn dimensions(&self) -> usize {
        self.settings.dimensions
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Name of the cache store, `None` when running uncached
    pub fn store_name(&self) -> Option<&str> {
        self.store.as_deref().map(|s| s.name())
    }

    pub fn key(&self, text: &str, role: Role) -> CacheKey {
        CacheKey::derive(&self.settings, role, text)
    }

    /// Whether a usable vector for `text` is already stored
    pub fn is_cached(&self, text: &str, role: Role) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        matches!(
            store.get(&self.key(text, role)),
            Ok(Some(v)) if v.len() == self.settings.dimensions
        )
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            backend_calls: self.counters.backend_calls.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
        }
    }

    /// Embed a single query text
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(&[text.to_string()], Role::Query)
            .await?
            .pop()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("no vector returned".to_string()))
    }

    /// Embed a batch: one unit-length vector per input, in input order.
    ///
    /// Only cache misses reach the backend. Identical texts in one batch are
    /// computed once.
    pub async fn embed(&self, texts: &[String], role: Role) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let keys: Vec<CacheKey> = texts.iter().map(|t| self.key(t, role)).collect();
        let mut results: Vec<Option<Vec<f32>>> = self.lookup(&keys);

        // First index of each distinct missing key, in input order
        let mut pending: Vec<usize> = Vec::new();
        let mut first_of: HashMap<&CacheKey, usize> = HashMap::new();
        for (i, slot) in results.iter().enumerate() {
            if slot.is_none() && !first_of.contains_key(&keys[i]) {
                first_of.insert(&keys[i], i);
                pending.push(i);
            }
        }

        let hits = results.iter().filter(|r| r.is_some()).count() as u64;
        self.counters.hits.fetch_add(hits, Ordering::Relaxed);
        self.counters
            .misses
            .fetch_add(texts.len() as u64 - hits, Ordering::Relaxed);

        if !pending.is_empty() {
            let mut computed: Vec<(CacheKey, Vec<f32>)> = Vec::with_capacity(pending.len());

            for chunk in pending.chunks(self.batch_size) {
                let inputs: Vec<String> = chunk
                    .iter()
                    .map(|&i| self.settings.apply_template(role, &texts[i]))
                    .collect();
                let vectors = self.call_backend(&inputs, role).await?;
                let entries: Vec<(CacheKey, Vec<f32>)> = chunk
                    .iter()
                    .zip(vectors)
                    .map(|(&i, vector)| (keys[i].clone(), vector))
                    .collect();
                // Persist per chunk so a later failure keeps earlier work
                self.write_back(&entries);
                computed.extend(entries);
            }

            let fresh: HashMap<&CacheKey, &Vec<f32>> = computed.iter().map(|(k, v)| (k, v)).collect();
            for (i, slot) in results.iter_mut().enumerate() {
                if slot.is_none() {
                    *slot = fresh.get(&keys[i]).map(|v| (*v).clone());
                }
            }
        }

        results
            .into_iter()
            .map(|r| r.ok_or_else(|| EmbeddingError::EmbeddingFailed("missing vector".to_string())))
            .collect()
    }

    /// Bulk lookup; any store failure reads as all-miss
    fn lookup(&self, keys: &[CacheKey]) -> Vec<Option<Vec<f32>>> {
        let Some(store) = &self.store else {
            return vec![None; keys.len()];
        };

        match store.get_many(keys) {
            Ok(found) if found.len() == keys.len() => found
                .into_iter()
                .map(|v| v.filter(|v| v.len() == self.settings.dimensions))
                .collect(),
            Ok(found) => {
                warn!(
                    store = store.name(),
                    expected = keys.len(),
                    got = found.len(),
                    "Cache returned wrong number of slots, bypassing"
                );
                vec![None; keys.len()]
            }
            Err(e) => {
                warn!(store = store.name(), error = %e, "Cache lookup failed, bypassing");
                vec![None; keys.len()]
            }
        }
    }

    async fn call_backend(&self, inputs: &[String], role: Role) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| EmbeddingError::EmbeddingFailed("embedding admission closed".to_string()))?;

        self.counters.backend_calls.fetch_add(1, Ordering::Relaxed);
        debug!(backend = self.backend.name(), count = inputs.len(), %role, "Computing embeddings");

        let raw = tokio::time::timeout(self.timeout, self.backend.embed(inputs, role))
            .await
            .map_err(|_| EmbeddingError::Timeout(self.timeout.as_millis() as u64))??;

        if raw.len() != inputs.len() {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "backend returned {} vectors for {} texts",
                raw.len(),
                inputs.len()
            )));
        }

        raw.into_iter()
            .map(|v| fit_dimensions(v, self.settings.dimensions))
            .collect()
    }

    fn write_back(&self, entries: &[(CacheKey, Vec<f32>)]) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.set_many(entries) {
            self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
            warn!(store = store.name(), error = %e, "Cache write failed");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
