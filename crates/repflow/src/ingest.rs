// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `repflow ingest` command implementation.
//!
//! Loads help articles from a JSON file into the semantic content index
//! so the index source can serve them during search fan-out.

use std::path::Path;

use repflow_config::RepflowConfig;
use repflow_core::error::RepflowError;
use repflow_sources::{ContentIndex, IndexedArticle};
use serde::Deserialize;
use tracing::info;

use crate::serve::index_path;

/// One article in the ingest file.
#[derive(Debug, Deserialize)]
struct ArticleRecord {
    /// Stable identifier; defaults to the URL when omitted.
    #[serde(default)]
    id: Option<String>,
    title: String,
    url: String,
    content: String,
}

/// Runs the `repflow ingest` command.
pub async fn run_ingest(config: &RepflowConfig, file: &Path) -> Result<(), RepflowError> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| RepflowError::Config(format!("failed to read {}: {e}", file.display())))?;
    let records: Vec<ArticleRecord> = serde_json::from_str(&raw)
        .map_err(|e| RepflowError::Config(format!("invalid ingest file: {e}")))?;

    let index = ContentIndex::open(&index_path(&config.storage.database_path)).await?;
    let now = chrono::Utc::now().to_rfc3339();

    let count = records.len();
    for record in records {
        let article = IndexedArticle {
            id: record.id.unwrap_or_else(|| record.url.clone()),
            title: record.title,
            url: record.url,
            content: record.content,
            ingested_at: now.clone(),
        };
        index.ingest(&article).await?;
    }

    info!(count, total = index.len().await?, "articles ingested");
    println!("ingested {count} articles");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_record_defaults_id_to_none() {
        let record: ArticleRecord = serde_json::from_str(
            r#"{"title": "T", "url": "https://x.example/1", "content": "body"}"#,
        )
        .unwrap();
        assert!(record.id.is_none());
        assert_eq!(record.title, "T");
    }
}
