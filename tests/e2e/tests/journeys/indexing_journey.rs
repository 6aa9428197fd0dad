//! Indexing Journey Tests
//!
//! Posts are written to a real SQLite FTS5 index and found again through the
//! hybrid pipeline.

use std::sync::Arc;

use braid_core::search::PostRecord;
use braid_core::{LexicalSearch, SearchFilters, SearchRequest};
use braid_e2e_tests::harness::{TestIndexManager, TestPipeline};
use braid_e2e_tests::mocks::{days_ago, MockVector, TestDataFactory};

#[tokio::test]
async fn test_indexed_posts_are_searchable() {
    let db = TestIndexManager::with_announcements();
    let searcher = TestPipeline::new().lexical(db.index.clone()).build();

    let hits = searcher.search(&SearchRequest::new("refund")).await;

    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|h| h.id.starts_with("post:")));
    let post_ids: Vec<&str> = hits.iter().filter_map(|h| h.post_id.as_deref()).collect();
    for id in ["101", "102", "103"] {
        assert!(post_ids.contains(&id), "missing post {id}");
    }
    assert!(hits.iter().all(|h| h.filetype.as_deref() == Some("html")));
}

#[tokio::test]
async fn test_category_filter_over_real_index() {
    let db = TestIndexManager::with_announcements();
    let searcher = TestPipeline::new().lexical(db.index.clone()).build();

    let request = SearchRequest::new("refund").with_filters(SearchFilters {
        category: Some("fraud".into()),
        ..Default::default()
    });
    let hits = searcher.search(&request).await;

    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.category.as_deref() == Some("fraud")));
}

#[tokio::test]
async fn test_date_range_over_real_index() {
    let db = TestIndexManager::with_announcements();
    let searcher = TestPipeline::new().lexical(db.index.clone()).build();

    // Only posts from the last 60 days
    let request = SearchRequest::new("refund").with_filters(SearchFilters {
        date_from: Some(days_ago(60)),
        ..Default::default()
    });
    let hits = searcher.search(&request).await;

    let post_ids: Vec<&str> = hits.iter().filter_map(|h| h.post_id.as_deref()).collect();
    assert_eq!(post_ids.len(), 2);
    assert!(post_ids.contains(&"101"));
    assert!(post_ids.contains(&"103"));
}

#[tokio::test]
async fn test_fresh_post_gets_recency_lift() {
    let db = TestIndexManager::new_temp();
    let post = |title: &str, age: i64, id: &str| PostRecord {
        title: title.to_string(),
        body: "scholarship deadline announcement".to_string(),
        category: "notice".to_string(),
        filetype: "html".to_string(),
        posted_at: Some(days_ago(age)),
        post_id: Some(id.to_string()),
        ..Default::default()
    };
    db.seed(&[post("Old scholarship notice", 500, "1"), post("New scholarship notice", 1, "2")]);

    let docs = TestPipeline::new()
        .lexical(db.index.clone())
        .build()
        .search_documents(&SearchRequest::new("scholarship deadline"))
        .await;

    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].field("post_id").as_deref(), Some("2"));
    assert!(docs[0].fused_score > 0.19);
}

#[tokio::test]
async fn test_lexical_and_vector_join_on_post_id_key() {
    let db = TestIndexManager::with_announcements();
    let direct = db.index.search("library", 5).await.unwrap();
    assert_eq!(direct.len(), 1);
    let library_id = direct[0].id.clone();

    // The vector index stores the same document under the same id
    let vector = vec![TestDataFactory::chunk_hit(&library_id, 0.9, 104, 0, "exam week closing times")];
    let docs = TestPipeline::new()
        .lexical(db.index.clone())
        .vector(Arc::new(MockVector::returning(vector)))
        .build()
        .search_documents(&SearchRequest::new("library"))
        .await;

    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, library_id);
    assert!(docs[0].lexical_score.is_some());
    assert!(docs[0].vector_score.is_some());
    assert_eq!(docs[0].text(), "exam week closing times");
}

#[tokio::test]
async fn test_index_persists_across_handles() {
    let db = TestIndexManager::with_announcements();
    let reopened = db.reopen();

    assert_eq!(reopened.len().unwrap(), 4);
    let hits = reopened.search("phishing", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].payload["post_id"], "102");
    assert!(db.path().exists());
}

#[tokio::test]
async fn test_punctuation_only_query_is_empty_not_an_error() {
    let db = TestIndexManager::with_announcements();
    assert!(db.index.search("!!! ???", 10).await.unwrap().is_empty());

    let hits = TestPipeline::new()
        .lexical(db.index.clone())
        .build()
        .search(&SearchRequest::new("\"*^"))
        .await;
    assert!(hits.is_empty());
}
