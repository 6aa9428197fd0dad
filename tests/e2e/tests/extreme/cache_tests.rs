//! Embedding Cache Tests
//!
//! Key derivation, batch semantics and store failures as seen from outside
//! the crate.

use std::sync::Arc;

use braid_core::embeddings::{l2_norm, CacheBackend, MemoryCache, SqliteCache};
use braid_core::{EmbeddingCache, Role, SearchRequest};
use braid_e2e_tests::harness::{TestPipeline, TEST_DIMENSIONS};
use braid_e2e_tests::mocks::{BrokenCache, CountingEmbedder, MockVector, TestDataFactory, WriteFailingCache};

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn cached_pipeline(embedder: Arc<CountingEmbedder>) -> TestPipeline {
    TestPipeline::new()
        .embedder(embedder)
        .store(Arc::new(MemoryCache::new(1024)))
}

// ============================================================================
// IDEMPOTENCE AND KEYS
// ============================================================================

#[tokio::test]
async fn test_repeat_embed_is_served_from_cache() {
    let embedder = Arc::new(CountingEmbedder::new(TEST_DIMENSIONS));
    let cache = cached_pipeline(embedder.clone()).cache();

    let first = cache.embed(&texts(&["tuition refund"]), Role::Query).await.unwrap();
    let second = cache.embed(&texts(&["tuition refund"]), Role::Query).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(embedder.calls(), 1);
    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.backend_calls, 1);
}

#[tokio::test]
async fn test_role_is_part_of_the_key() {
    let embedder = Arc::new(CountingEmbedder::new(TEST_DIMENSIONS));
    let cache = cached_pipeline(embedder.clone()).cache();

    assert_ne!(cache.key("refund", Role::Query), cache.key("refund", Role::Passage));
    cache.embed_query("refund").await.unwrap();
    cache.embed(&texts(&["refund"]), Role::Passage).await.unwrap();

    // Same text, different role: no cross-role hit
    assert_eq!(embedder.calls(), 2);
    assert_eq!(cache.stats().hits, 0);
}

#[tokio::test]
async fn test_without_template_roles_embed_identically_under_distinct_keys() {
    let embedder = Arc::new(CountingEmbedder::new(TEST_DIMENSIONS));
    let cache = cached_pipeline(embedder.clone())
        .configure(|c| c.embedding.use_template = false)
        .cache();

    assert_ne!(cache.key("refund", Role::Query), cache.key("refund", Role::Passage));
    let query = cache.embed_query("refund").await.unwrap();
    let passage = cache.embed(&texts(&["refund"]), Role::Passage).await.unwrap();
    assert_eq!(query, passage[0]);
}

#[tokio::test]
async fn test_settings_changes_change_the_key() {
    let base = TestPipeline::new().cache().key("refund", Role::Query);
    assert!(base.as_str().starts_with("emb:v1:"));

    let changes: [fn(&mut braid_core::EngineConfig); 4] = [
        |c| c.embedding.model = "bge-m3".to_string(),
        |c| c.embedding.query_prefix = "search_query: ".to_string(),
        |c| c.embedding.passage_prefix = "search_document: ".to_string(),
        |c| c.embedding.dimensions = 128,
    ];
    for change in changes {
        let key = TestPipeline::new().configure(change).cache().key("refund", Role::Query);
        assert_ne!(key, base);
    }
}

// ============================================================================
// BATCHES
// ============================================================================

#[tokio::test]
async fn test_mixed_batch_keeps_order_and_computes_only_misses() {
    let embedder = Arc::new(CountingEmbedder::new(TEST_DIMENSIONS));
    let cache = cached_pipeline(embedder.clone()).cache();

    let warm = cache.embed(&texts(&["b", "d"]), Role::Passage).await.unwrap();
    assert_eq!(embedder.texts_embedded(), 2);

    let batch = cache.embed(&texts(&["a", "b", "c", "d"]), Role::Passage).await.unwrap();

    assert_eq!(batch.len(), 4);
    assert_eq!(batch[1], warm[0]);
    assert_eq!(batch[3], warm[1]);
    assert_eq!(embedder.texts_embedded(), 4);

    let a_alone = cache.embed(&texts(&["a"]), Role::Passage).await.unwrap();
    assert_eq!(batch[0], a_alone[0]);
}

#[tokio::test]
async fn test_duplicate_texts_in_a_batch_are_computed_once() {
    let embedder = Arc::new(CountingEmbedder::new(TEST_DIMENSIONS));
    let cache = cached_pipeline(embedder.clone()).cache();

    let batch = cache.embed(&texts(&["x", "y", "x", "x"]), Role::Passage).await.unwrap();

    assert_eq!(batch.len(), 4);
    assert_eq!(batch[0], batch[2]);
    assert_eq!(batch[0], batch[3]);
    assert_eq!(embedder.texts_embedded(), 2);
}

#[tokio::test]
async fn test_empty_batch_never_reaches_backend() {
    let embedder = Arc::new(CountingEmbedder::new(TEST_DIMENSIONS));
    let cache = cached_pipeline(embedder.clone()).cache();

    assert!(cache.embed(&[], Role::Query).await.unwrap().is_empty());
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_vectors_are_unit_length_with_configured_size() {
    let cache = cached_pipeline(Arc::new(CountingEmbedder::new(TEST_DIMENSIONS))).cache();
    let vectors = cache
        .embed(&texts(&["장학금 신청 기간", "library hours", ""]), Role::Passage)
        .await
        .unwrap();

    for vector in &vectors {
        assert_eq!(vector.len(), TEST_DIMENSIONS);
    }
    assert!((l2_norm(&vectors[0]) - 1.0).abs() < 1e-4);
    assert!((l2_norm(&vectors[1]) - 1.0).abs() < 1e-4);
}

// ============================================================================
// STORE FAILURES
// ============================================================================

#[tokio::test]
async fn test_broken_store_degrades_to_always_compute() {
    let embedder = Arc::new(CountingEmbedder::new(TEST_DIMENSIONS));
    let cache = TestPipeline::new()
        .embedder(embedder.clone())
        .store(Arc::new(BrokenCache))
        .cache();

    let first = cache.embed_query("refund").await.unwrap();
    let second = cache.embed_query("refund").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(embedder.calls(), 2);
    assert!(!cache.is_cached("refund", Role::Query));
    assert_eq!(cache.stats().write_failures, 2);
}

#[tokio::test]
async fn test_failed_writes_are_counted_and_reads_still_served() {
    let embedder = Arc::new(CountingEmbedder::new(TEST_DIMENSIONS));
    let store = Arc::new(WriteFailingCache::new());
    let cache = TestPipeline::new()
        .embedder(embedder.clone())
        .store(store.clone())
        .cache();

    let preloaded = vec![1.0 / (TEST_DIMENSIONS as f32).sqrt(); TEST_DIMENSIONS];
    store.preload(&cache.key("warm", Role::Query), &preloaded);

    assert_eq!(cache.embed_query("warm").await.unwrap(), preloaded);
    assert_eq!(embedder.calls(), 0);

    cache.embed_query("cold").await.unwrap();
    assert_eq!(embedder.calls(), 1);
    assert_eq!(store.write_attempts(), 1);
    assert_eq!(cache.stats().write_failures, 1);
}

#[tokio::test]
async fn test_wrong_size_entry_is_a_miss() {
    let embedder = Arc::new(CountingEmbedder::new(TEST_DIMENSIONS));
    let store = Arc::new(MemoryCache::new(16));
    let cache = TestPipeline::new()
        .embedder(embedder.clone())
        .store(store.clone())
        .cache();

    store.set(&cache.key("refund", Role::Query), &[1.0, 0.0, 0.0]).unwrap();
    assert!(!cache.is_cached("refund", Role::Query));

    let vector = cache.embed_query("refund").await.unwrap();
    assert_eq!(vector.len(), TEST_DIMENSIONS);
    assert_eq!(embedder.calls(), 1);
}

// ============================================================================
// PERSISTENCE AND CONCURRENCY
// ============================================================================

#[tokio::test]
async fn test_sqlite_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("embeddings.db");

    let first_embedder = Arc::new(CountingEmbedder::new(TEST_DIMENSIONS));
    let first = TestPipeline::new()
        .embedder(first_embedder.clone())
        .store(Arc::new(SqliteCache::open(&path).unwrap()))
        .cache();
    let original = first.embed_query("refund").await.unwrap();
    drop(first);

    let second_embedder = Arc::new(CountingEmbedder::new(TEST_DIMENSIONS));
    let second = TestPipeline::new()
        .embedder(second_embedder.clone())
        .store(Arc::new(SqliteCache::open(&path).unwrap()))
        .cache();

    assert!(second.is_cached("refund", Role::Query));
    assert_eq!(second.embed_query("refund").await.unwrap(), original);
    assert_eq!(second_embedder.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_embeds_of_same_text_agree() {
    let cache: Arc<EmbeddingCache> = cached_pipeline(Arc::new(CountingEmbedder::new(TEST_DIMENSIONS))).cache();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.embed_query("shared query").await })
        })
        .collect();

    let mut vectors = Vec::new();
    for handle in handles {
        vectors.push(handle.await.unwrap().unwrap());
    }
    assert!(vectors.windows(2).all(|w| w[0] == w[1]));
    assert!(cache.is_cached("shared query", Role::Query));
}

#[tokio::test]
async fn test_pipeline_reuses_cached_query_vector() {
    let embedder = Arc::new(CountingEmbedder::new(TEST_DIMENSIONS));
    let vector = Arc::new(MockVector::returning(TestDataFactory::ranked(&["a"])));
    let searcher = cached_pipeline(embedder.clone()).vector(vector.clone()).build();

    searcher.search(&SearchRequest::new("refund")).await;
    searcher.search(&SearchRequest::new("refund")).await;

    assert_eq!(embedder.calls(), 1);
    assert_eq!(vector.calls(), 2);
    let stats = searcher.embedder().map(|c| c.stats()).unwrap_or_default();
    assert_eq!(stats.hits, 1);
}
