//! Test Index Manager
//!
//! Isolated SQLite FTS5 indexes in temporary directories, removed on drop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use braid_core::search::{PostRecord, SqliteFtsIndex};
use tempfile::TempDir;

use crate::mocks::TestDataFactory;

/// Manager for test lexical indexes
pub struct TestIndexManager {
    pub index: Arc<SqliteFtsIndex>,
    /// Kept alive so the database outlives the test body
    _temp_dir: TempDir,
    db_path: PathBuf,
}

impl TestIndexManager {
    /// An empty index in a fresh temporary directory
    pub fn new_temp() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("posts.db");
        let index = SqliteFtsIndex::open(&db_path).expect("Failed to open FTS5 index");
        Self {
            index: Arc::new(index),
            _temp_dir: temp_dir,
            db_path,
        }
    }

    /// An index seeded with [`TestDataFactory::announcement_posts`]
    pub fn with_announcements() -> Self {
        let manager = Self::new_temp();
        manager.seed(&TestDataFactory::announcement_posts());
        manager
    }

    /// Index posts, returning their row ids
    pub fn seed(&self, posts: &[PostRecord]) -> Vec<i64> {
        posts
            .iter()
            .map(|p| self.index.index_post(p).expect("Failed to index post"))
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Reopen the same file through a second handle
    pub fn reopen(&self) -> SqliteFtsIndex {
        SqliteFtsIndex::open(&self.db_path).expect("Failed to reopen FTS5 index")
    }
}
