// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic index source over previously-ingested help content.
//!
//! SQLite-backed with an FTS5 virtual table for BM25 keyword search.
//! Sync triggers keep FTS5 up to date with the articles table. Ingestion
//! itself (crawling, extraction) happens elsewhere; this adapter only
//! searches what is already in the index.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use repflow_core::types::{AdapterType, HealthStatus, SourceErrorKind, SourceResult};
use repflow_core::{ComponentAdapter, RepflowError, SourceAdapter};
use tokio_rusqlite::Connection;
use tracing::{debug, warn};

/// Helper to convert tokio_rusqlite errors into RepflowError::Storage.
fn storage_err(e: tokio_rusqlite::Error) -> RepflowError {
    RepflowError::Storage {
        source: Box::new(e),
    }
}

/// A help article stored in the content index.
#[derive(Debug, Clone)]
pub struct IndexedArticle {
    /// Stable article identifier.
    pub id: String,
    /// Article title.
    pub title: String,
    /// Canonical URL of the article.
    pub url: String,
    /// Extracted article text.
    pub content: String,
    /// ISO 8601 ingestion timestamp.
    pub ingested_at: String,
}

/// Persistent store for ingested content with BM25 search.
pub struct ContentIndex {
    conn: Connection,
}

impl ContentIndex {
    /// Opens (or creates) the index at `path` and ensures its schema.
    pub async fn open(path: &str) -> Result<Self, RepflowError> {
        let conn = Connection::open(path).await.map_err(storage_err)?;
        let index = Self { conn };
        index.ensure_schema().await?;
        Ok(index)
    }

    /// Opens an in-memory index (tests and ephemeral deployments).
    pub async fn open_in_memory() -> Result<Self, RepflowError> {
        let conn = Connection::open_in_memory().await.map_err(storage_err)?;
        let index = Self { conn };
        index.ensure_schema().await?;
        Ok(index)
    }

    async fn ensure_schema(&self) -> Result<(), RepflowError> {
        self.conn
            .call(|conn: &mut rusqlite::Connection| -> Result<(), tokio_rusqlite::Error> {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS articles (
                         id TEXT PRIMARY KEY,
                         title TEXT NOT NULL,
                         url TEXT NOT NULL,
                         content TEXT NOT NULL,
                         ingested_at TEXT NOT NULL
                     );
                     CREATE VIRTUAL TABLE IF NOT EXISTS articles_fts USING fts5(
                         title, content,
                         content='articles', content_rowid='rowid'
                     );
                     CREATE TRIGGER IF NOT EXISTS articles_ai AFTER INSERT ON articles BEGIN
                         INSERT INTO articles_fts(rowid, title, content)
                         VALUES (new.rowid, new.title, new.content);
                     END;
                     CREATE TRIGGER IF NOT EXISTS articles_ad AFTER DELETE ON articles BEGIN
                         INSERT INTO articles_fts(articles_fts, rowid, title, content)
                         VALUES ('delete', old.rowid, old.title, old.content);
                     END;
                     CREATE TRIGGER IF NOT EXISTS articles_au AFTER UPDATE ON articles BEGIN
                         INSERT INTO articles_fts(articles_fts, rowid, title, content)
                         VALUES ('delete', old.rowid, old.title, old.content);
                         INSERT INTO articles_fts(rowid, title, content)
                         VALUES (new.rowid, new.title, new.content);
                     END;",
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    /// Insert or replace an article by id.
    pub async fn ingest(&self, article: &IndexedArticle) -> Result<(), RepflowError> {
        let a = article.clone();
        self.conn
            .call(move |conn| {
                // Delete-then-insert so the FTS sync triggers fire cleanly.
                conn.execute("DELETE FROM articles WHERE id = ?1", [&a.id])?;
                conn.execute(
                    "INSERT INTO articles (id, title, url, content, ingested_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![a.id, a.title, a.url, a.content, a.ingested_at],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    /// Number of indexed articles.
    pub async fn len(&self) -> Result<u64, RepflowError> {
        self.conn
            .call(|conn| {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
                Ok(n as u64)
            })
            .await
            .map_err(storage_err)
    }

    /// BM25 keyword search, best matches first, with raw rank values.
    pub async fn search_bm25(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<(IndexedArticle, f64)>, RepflowError> {
        let Some(match_query) = build_match_query(query) else {
            return Ok(Vec::new());
        };
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT a.id, a.title, a.url, a.content, a.ingested_at,
                            bm25(articles_fts) AS rank
                     FROM articles_fts
                     JOIN articles a ON a.rowid = articles_fts.rowid
                     WHERE articles_fts MATCH ?1
                     ORDER BY rank
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(
                    rusqlite::params![match_query, k as i64],
                    |row| {
                        Ok((
                            IndexedArticle {
                                id: row.get(0)?,
                                title: row.get(1)?,
                                url: row.get(2)?,
                                content: row.get(3)?,
                                ingested_at: row.get(4)?,
                            },
                            row.get::<_, f64>(5)?,
                        ))
                    },
                )?;
                let mut results = Vec::new();
                for row in rows {
                    results.push(row?);
                }
                Ok(results)
            })
            .await
            .map_err(storage_err)
    }
}

/// Builds an FTS5 MATCH expression from free text: alphanumeric tokens,
/// each quoted, joined with OR. Returns None when no tokens survive.
fn build_match_query(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

/// Source adapter over a [`ContentIndex`].
pub struct IndexSource {
    index: Arc<ContentIndex>,
}

impl IndexSource {
    /// Wraps an opened content index.
    pub fn new(index: Arc<ContentIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl ComponentAdapter for IndexSource {
    fn name(&self) -> &str {
        "index"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Source
    }

    async fn health_check(&self) -> Result<HealthStatus, RepflowError> {
        match self.index.len().await {
            Ok(0) => Ok(HealthStatus::Degraded("index is empty".into())),
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), RepflowError> {
        Ok(())
    }
}

#[async_trait]
impl SourceAdapter for IndexSource {
    fn source_tag(&self) -> &str {
        "index"
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
        _deadline: Duration,
    ) -> Result<Vec<SourceResult>, SourceErrorKind> {
        let ranked = self.index.search_bm25(query, k).await.map_err(|e| {
            warn!(error = %e, "index search failed");
            SourceErrorKind::Unavailable
        })?;

        // bm25() ranks are negative, more negative = better. Normalize to
        // a descending relevance in (0, 1] against the best hit.
        let best = ranked
            .iter()
            .map(|(_, rank)| -rank)
            .fold(f64::MIN, f64::max);
        let results: Vec<SourceResult> = ranked
            .into_iter()
            .map(|(article, rank)| {
                let score = -rank;
                let relevance = if best > 0.0 {
                    (score / best).clamp(0.0, 1.0)
                } else {
                    0.5
                };
                SourceResult {
                    source: "index".to_string(),
                    title: article.title,
                    url: article.url,
                    snippet: article.content,
                    relevance,
                }
            })
            .collect();

        debug!(count = results.len(), "index search returned results");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: &str, title: &str, url: &str, content: &str) -> IndexedArticle {
        IndexedArticle {
            id: id.to_string(),
            title: title.to_string(),
            url: url.to_string(),
            content: content.to_string(),
            ingested_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn ingest_and_search_round_trips() {
        let index = ContentIndex::open_in_memory().await.unwrap();
        index
            .ingest(&article(
                "a1",
                "Reset your 401k password",
                "https://www.fidelity.com/help/reset",
                "Steps to reset a forgotten 401k account password online.",
            ))
            .await
            .unwrap();
        index
            .ingest(&article(
                "a2",
                "Open a brokerage account",
                "https://www.fidelity.com/help/brokerage",
                "How to open a new brokerage account.",
            ))
            .await
            .unwrap();

        let source = IndexSource::new(Arc::new(index));
        let results = source
            .search("401k password reset", 5, Duration::from_secs(5))
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].url, "https://www.fidelity.com/help/reset");
        assert!(results[0].relevance > 0.0 && results[0].relevance <= 1.0);
    }

    #[tokio::test]
    async fn reingest_replaces_by_id() {
        let index = ContentIndex::open_in_memory().await.unwrap();
        index
            .ingest(&article("a1", "Old title", "https://x/1", "old content"))
            .await
            .unwrap();
        index
            .ingest(&article("a1", "New title", "https://x/1", "new content"))
            .await
            .unwrap();
        assert_eq!(index.len().await.unwrap(), 1);

        let hits = index.search_bm25("new", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.title, "New title");
    }

    #[tokio::test]
    async fn no_match_returns_empty() {
        let index = ContentIndex::open_in_memory().await.unwrap();
        index
            .ingest(&article("a1", "Something", "https://x/1", "content here"))
            .await
            .unwrap();
        let source = IndexSource::new(Arc::new(index));
        let results = source
            .search("zzzzunmatchable", 5, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn punctuation_only_query_returns_empty() {
        let index = ContentIndex::open_in_memory().await.unwrap();
        let source = IndexSource::new(Arc::new(index));
        let results = source.search("?!#", 5, Duration::from_secs(5)).await.unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn match_query_quotes_tokens() {
        assert_eq!(
            build_match_query("reset my 401k-password").as_deref(),
            Some("\"reset\" OR \"my\" OR \"401k\" OR \"password\"")
        );
        assert!(build_match_query("  ?? ").is_none());
    }

    #[tokio::test]
    async fn empty_index_health_is_degraded() {
        let index = ContentIndex::open_in_memory().await.unwrap();
        let source = IndexSource::new(Arc::new(index));
        match source.health_check().await.unwrap() {
            HealthStatus::Degraded(reason) => assert!(reason.contains("empty")),
            other => panic!("expected Degraded, got {other:?}"),
        }
    }
}
