//! Search Journey Tests
//!
//! A query travels through both adapters, fusion, filtering and reranking.

use std::sync::Arc;

use braid_core::embeddings::l2_norm;
use braid_core::{SearchFilters, SearchRequest};
use braid_e2e_tests::harness::{TestPipeline, TEST_DIMENSIONS};
use braid_e2e_tests::mocks::{
    days_ago, CountingEmbedder, KeywordReranker, MockLexical, MockVector, RerankBehavior,
    TestDataFactory,
};

fn ids<T, F: Fn(&T) -> &str>(items: &[T], id: F) -> Vec<&str> {
    items.iter().map(id).collect()
}

// ============================================================================
// FUSION THROUGH THE PIPELINE
// ============================================================================

#[tokio::test]
async fn test_worked_example_end_to_end() {
    let searcher = TestPipeline::new()
        .lexical(Arc::new(MockLexical::returning(TestDataFactory::scored(&[
            ("d1", 10.0),
            ("d2", 8.0),
        ]))))
        .vector(Arc::new(MockVector::returning(TestDataFactory::scored(&[
            ("d2", 0.9),
            ("d3", 0.8),
        ]))))
        .build();

    let docs = searcher.search_documents(&SearchRequest::new("refund")).await;

    assert_eq!(ids(&docs, |d| d.id.as_str()), vec!["d2", "d1", "d3"]);
    let expected = [1.0 / 62.0 + 1.0 / 61.0, 1.0 / 61.0, 1.0 / 62.0];
    for (doc, want) in docs.iter().zip(expected) {
        assert!((doc.fused_score - want).abs() < 1e-12, "{} fused {}", doc.id, doc.fused_score);
        // Reranking disabled: final score is the fused score
        assert_eq!(doc.final_score, Some(doc.fused_score));
    }
    assert_eq!(docs[0].lexical_score, Some(8.0));
    assert_eq!(docs[0].vector_score, Some(0.9));
}

#[tokio::test]
async fn test_vector_adapter_receives_unit_query_vector() {
    let vector = Arc::new(MockVector::returning(TestDataFactory::ranked(&["c1"])));
    let searcher = TestPipeline::new().vector(vector.clone()).build();

    searcher.search(&SearchRequest::new("tuition refund")).await;

    let query_vector = vector.last_vector().expect("vector adapter was not called");
    assert_eq!(query_vector.len(), TEST_DIMENSIONS);
    assert!((l2_norm(&query_vector) - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn test_vector_payload_overrides_lexical_payload() {
    let lexical = vec![TestDataFactory::post_hit("p1", 3.0, "fraud", "pdf", Some("2024-05-01"))];
    let vector = vec![TestDataFactory::chunk_hit("p1", 0.8, 7, 2, "full chunk text from the pdf")
        .with_field("title", "Chunk title")];

    let hits = TestPipeline::new()
        .lexical(Arc::new(MockLexical::returning(lexical)))
        .vector(Arc::new(MockVector::returning(vector)))
        .build()
        .search(&SearchRequest::new("pdf"))
        .await;

    assert_eq!(hits.len(), 1);
    let hit = &hits[0];
    assert_eq!(hit.title, "Chunk title");
    assert_eq!(hit.snippet, "full chunk text from the pdf");
    // Lexical-only fields survive the overlay
    assert_eq!(hit.category.as_deref(), Some("fraud"));
    assert_eq!(hit.filetype.as_deref(), Some("pdf"));
    assert_eq!(hit.posted_at.as_deref(), Some("2024-05-01"));
    assert_eq!(hit.post_id.as_deref(), Some("7"));
    assert_eq!(hit.source, "Chunk title#chunk:2");
}

// ============================================================================
// RERANKING
// ============================================================================

#[tokio::test]
async fn test_reranker_promotes_relevant_text() {
    let lexical = vec![
        TestDataFactory::chunk_hit("a", 5.0, 1, 0, "campus parking permits"),
        TestDataFactory::chunk_hit("b", 4.0, 2, 0, "library opening hours"),
        TestDataFactory::chunk_hit("c", 3.0, 3, 0, "refund scam reported by students"),
    ];
    let reranker = Arc::new(KeywordReranker::new(RerankBehavior::KeywordOverlap));
    let searcher = TestPipeline::new()
        .lexical(Arc::new(MockLexical::returning(lexical)))
        .reranker(reranker.clone())
        .build();

    let docs = searcher.search_documents(&SearchRequest::new("refund scam")).await;

    assert_eq!(docs[0].id, "c");
    assert_eq!(reranker.calls(), 1);
    for doc in &docs {
        let score = doc.final_score.expect("reranked documents carry a final score");
        assert!((0.0..=1.0).contains(&score));
    }
    // c: full cross-encoder weight, lowest fused rank
    assert!((docs[0].final_score.unwrap_or_default() - 0.7).abs() < 1e-9);
}

#[tokio::test]
async fn test_rerank_window_respects_min_window_and_top_k() {
    let many: Vec<String> = (0..40).map(|i| format!("d{i:02}")).collect();
    let many: Vec<&str> = many.iter().map(String::as_str).collect();
    let lexical = Arc::new(MockLexical::returning(TestDataFactory::ranked(&many)));

    let reranker = Arc::new(KeywordReranker::new(RerankBehavior::KeywordOverlap));
    let searcher = TestPipeline::new()
        .lexical(lexical)
        .reranker(reranker.clone())
        .configure(|c| c.rerank.min_window = 20)
        .build();

    let top3 = searcher.search(&SearchRequest::new("passage").with_top_k(3)).await;
    assert_eq!(top3.len(), 3);

    let top30 = searcher.search(&SearchRequest::new("passage").with_top_k(30)).await;
    assert_eq!(top30.len(), 30);
    assert_eq!(reranker.calls(), 2);
}

// ============================================================================
// FILTERS AND RECENCY
// ============================================================================

#[tokio::test]
async fn test_filters_are_and_combined() {
    let lexical = vec![
        TestDataFactory::post_hit("a", 4.0, "fraud", "pdf", Some("2024-06-01")),
        TestDataFactory::post_hit("b", 3.0, "fraud", "hwp", Some("2024-06-01")),
        TestDataFactory::post_hit("c", 2.0, "notice", "pdf", Some("2024-06-01")),
        TestDataFactory::post_hit("d", 1.0, "fraud", "pdf", Some("2023-01-01")),
        TestDataFactory::post_hit("e", 0.5, "fraud", "pdf", None),
    ];
    let searcher = TestPipeline::new()
        .lexical(Arc::new(MockLexical::returning(lexical)))
        .build();

    let request = SearchRequest::new("refund").with_filters(SearchFilters {
        category: Some("fraud".into()),
        filetype: Some("pdf".into()),
        date_from: Some("2024-01-01".into()),
        date_to: Some("2024-12-31".into()),
    });
    let hits = searcher.search(&request).await;

    // e has no date and is exempt from the date bounds only
    assert_eq!(ids(&hits, |h| h.id.as_str()), vec!["a", "e"]);
}

#[tokio::test]
async fn test_recent_post_outranks_stale_post_with_equal_fusion() {
    // x is lexical rank 1, y is vector rank 1: identical fused scores
    let today = days_ago(0);
    let stale = days_ago(400);
    let lexical = vec![TestDataFactory::post_hit("x", 1.0, "notice", "html", Some(stale.as_str()))];
    let vector = vec![TestDataFactory::post_hit("y", 0.9, "notice", "html", Some(today.as_str()))];

    let docs = TestPipeline::new()
        .lexical(Arc::new(MockLexical::returning(lexical)))
        .vector(Arc::new(MockVector::returning(vector)))
        .build()
        .search_documents(&SearchRequest::new("notice"))
        .await;

    assert_eq!(ids(&docs, |d| d.id.as_str()), vec!["y", "x"]);
    assert!(docs[0].fused_score > docs[1].fused_score);
    assert!((docs[1].fused_score - 1.0 / 61.0).abs() < 1e-12);
}

#[tokio::test]
async fn test_filtered_documents_never_reach_the_reranker() {
    let lexical = vec![
        TestDataFactory::post_hit("keep", 2.0, "fraud", "pdf", None),
        TestDataFactory::post_hit("drop", 1.0, "notice", "pdf", None),
    ];
    let searcher = TestPipeline::new()
        .lexical(Arc::new(MockLexical::returning(lexical)))
        .reranker(Arc::new(KeywordReranker::new(RerankBehavior::KeywordOverlap)))
        .build();

    let request = SearchRequest::new("body").with_filters(SearchFilters {
        category: Some("fraud".into()),
        ..Default::default()
    });
    let docs = searcher.search_documents(&request).await;
    assert_eq!(ids(&docs, |d| d.id.as_str()), vec!["keep"]);
}

// ============================================================================
// QUERY EDGE CASES
// ============================================================================

#[tokio::test]
async fn test_blank_query_touches_no_backend() {
    let lexical = Arc::new(MockLexical::returning(TestDataFactory::ranked(&["a"])));
    let vector = Arc::new(MockVector::returning(TestDataFactory::ranked(&["b"])));
    let embedder = Arc::new(CountingEmbedder::new(TEST_DIMENSIONS));
    let searcher = TestPipeline::new()
        .lexical(lexical.clone())
        .vector(vector.clone())
        .embedder(embedder.clone())
        .build();

    assert!(searcher.search(&SearchRequest::new("")).await.is_empty());
    assert!(searcher.search(&SearchRequest::new(" \t\n")).await.is_empty());
    assert!(searcher.search(&SearchRequest::new("refund").with_top_k(0)).await.is_empty());

    assert_eq!(lexical.calls(), 0);
    assert_eq!(vector.calls(), 0);
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_query_is_trimmed_before_lexical_search() {
    let lexical = Arc::new(MockLexical::returning(vec![]));
    let searcher = TestPipeline::new().lexical(lexical.clone()).build();

    searcher.search(&SearchRequest::new("  refund  ")).await;
    assert_eq!(lexical.queries(), vec!["refund".to_string()]);
}
