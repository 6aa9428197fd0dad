//! Mock backends and test data

mod adapters;

pub use adapters::{MockBehavior, MockLexical, MockVector};
pub use backends::{
    BrokenCache, CountingEmbedder, KeywordReranker, RerankBehavior, WriteFailingCache,
};
pub use fixtures::{days_ago, TestDataFactory};
