//! SQLite FTS5 lexical index
//!
//! One FTS5 table holds the searchable post fields; `fts_row_map` ties FTS
//! rowids back to the originating post. Hits are keyed `post:<rowid>`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::adapters::{distance_to_score, AdapterError, LexicalSearch};
use crate::document::{Payload, SourceHit, SNIPPET_CHARS};

const SCHEMA: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS posts USING fts5(
    title, body, tags, category, filetype, posted_at
);

CREATE TABLE IF NOT EXISTS fts_row_map (
    rowid INTEGER PRIMARY KEY,
    post_id TEXT NOT NULL
);
"#;

/// Turn free text into an FTS5 expression: every term quoted, OR-combined.
///
/// Returns `None` when the text has no searchable terms.
pub fn sanitize_fts5_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// A post to be indexed
#[derive(Debug, Clone, Default)]
pub struct PostRecord {
    pub title: String,
    pub body: String,
    pub tags: String,
    pub category: String,
    pub filetype: String,
    /// `YYYY-MM-DD`
    pub posted_at: Option<String>,
    /// Id of the post in the system of record
    pub post_id: Option<String>,
}

/// Lexical adapter over a local FTS5 database
pub struct SqliteFtsIndex {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteFtsIndex {
    /// Open the index file, creating it and its schema if needed
    pub fn open(path: &Path) -> Result<Self, AdapterError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AdapterError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let index = Self {
            conn: Arc::new(Mutex::new(Connection::open(path)?)),
        };
        index.ensure_schema()?;
        Ok(index)
    }

    pub fn open_in_memory() -> Result<Self, AdapterError> {
        let index = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        index.ensure_schema()?;
        Ok(index)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, AdapterError> {
        self.conn
            .lock()
            .map_err(|_| AdapterError::Unavailable("connection lock poisoned".to_string()))
    }

    /// Create the FTS table and row map (idempotent)
    pub fn ensure_schema(&self) -> Result<(), AdapterError> {
        self.lock()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Insert a post, returning its FTS rowid
    pub fn index_post(&self, post: &PostRecord) -> Result<i64, AdapterError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO posts (title, body, tags, category, filetype, posted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                post.title,
                post.body,
                post.tags,
                post.category,
                post.filetype,
                post.posted_at.as_deref().unwrap_or(""),
            ],
        )?;
        let rowid = tx.last_insert_rowid();
        if let Some(post_id) = &post.post_id {
            tx.execute(
                "INSERT OR REPLACE INTO fts_row_map (rowid, post_id) VALUES (?1, ?2)",
                params![rowid, post_id],
            )?;
        }
        tx.commit()?;
        Ok(rowid)
    }

    /// Number of indexed posts
    pub fn len(&self) -> Result<usize, AdapterError> {
        let count: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM posts", [], |r| r.get(0))?;
        Ok(count.max(0) as usize)
    }

    pub fn is_empty(&self) -> Result<bool, AdapterError> {
        Ok(self.len()? == 0)
    }

    /// Post id recorded for an FTS rowid
    pub fn post_id_for(&self, rowid: i64) -> Result<Option<String>, AdapterError> {
        Ok(self
            .lock()?
            .query_row(
                "SELECT post_id FROM fts_row_map WHERE rowid = ?1",
                params![rowid],
                |r| r.get(0),
            )
            .optional()?)
    }

    fn search_blocking(conn: &Connection, expr: &str, limit: usize) -> Result<Vec<SourceHit>, AdapterError> {
        let mut stmt = conn.prepare_cached(
            "SELECT posts.rowid, m.post_id, posts.title, posts.body, posts.tags,
                    posts.category, posts.filetype, posts.posted_at, bm25(posts) AS score
             FROM posts
             LEFT JOIN fts_row_map m ON m.rowid = posts.rowid
             WHERE posts MATCH ?1
             ORDER BY score
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![expr, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, f64>(8)?,
            ))
        })?;

        let mut hits = Vec::new();
        // FTS5 bm25 is negative, more negative = better; shift so the best row is 0
        let mut best: Option<f64> = None;
        for row in rows {
            let (rowid, post_id, title, body, tags, category, filetype, posted_at, raw) = row?;
            let best = *best.get_or_insert(raw);

            let mut payload = Payload::new();
            let snippet: String = body.unwrap_or_default().chars().take(SNIPPET_CHARS).collect();
            payload.insert("snippet".into(), Value::String(snippet));
            for (key, value) in [
                ("title", title),
                ("tags", tags),
                ("category", category),
                ("filetype", filetype),
                ("date", posted_at),
                ("post_id", post_id),
            ] {
                payload.insert(key.into(), value.map(Value::String).unwrap_or(Value::Null));
            }

            hits.push(SourceHit {
                id: format!("post:{rowid}"),
                score: distance_to_score(raw - best),
                payload,
            });
        }
        Ok(hits)
    }
}

#[async_trait]
impl LexicalSearch for SqliteFtsIndex {
    fn name(&self) -> &str {
        "sqlite-fts5"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SourceHit>, AdapterError> {
        let Some(expr) = sanitize_fts5_query(query) else {
            return Ok(vec![]);
        };
        if limit == 0 {
            return Ok(vec![]);
        }

        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| AdapterError::Unavailable("connection lock poisoned".to_string()))?;
            Self::search_blocking(&conn, &expr, limit)
        })
        .await
        .map_err(|e| AdapterError::Unavailable(format!("search task failed: {e}")))?
    }
}
