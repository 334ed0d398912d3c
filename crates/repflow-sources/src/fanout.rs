// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parallel fan-out across registered source adapters.
//!
//! Every adapter runs as its own task bounded by the fan-out deadline.
//! Adapter errors and timeouts are absorbed into a per-source error map;
//! the fan-out itself never fails. The merge is deterministic: relevance
//! descending, ties broken by registration order, then per-source rank.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use repflow_core::types::{SourceErrorKind, SourceResult};
use repflow_core::SourceAdapter;
use tracing::{debug, warn};

/// Limits applied by the fan-out.
#[derive(Debug, Clone)]
pub struct FanOutConfig {
    /// Per-source result cap.
    pub top_k: usize,
    /// Deadline for the whole fan-out; adapters still running at the
    /// deadline are cancelled and recorded as `timeout`.
    pub deadline: Duration,
    /// Per-result snippet truncation budget in bytes.
    pub snippet_byte_budget: usize,
}

/// Merged output of one fan-out invocation.
#[derive(Debug, Clone, Default)]
pub struct FanOutOutcome {
    /// Deduplicated results in merged order.
    pub results: Vec<SourceResult>,
    /// Error kind per source that contributed no results.
    pub errors: BTreeMap<String, SourceErrorKind>,
}

/// Registry of source adapters invoked concurrently per search.
///
/// Registration order is the stable preference order used for merge
/// tie-breaks and duplicate resolution.
pub struct SourceFanOut {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl Default for SourceFanOut {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceFanOut {
    /// Create an empty fan-out.
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Register an adapter at the end of the preference order.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.push(adapter);
    }

    /// Number of registered adapters.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapters are registered.
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Source tags in preference order.
    pub fn source_tags(&self) -> Vec<String> {
        self.adapters
            .iter()
            .map(|a| a.source_tag().to_string())
            .collect()
    }

    /// Search every registered source concurrently and merge the results.
    pub async fn search(&self, query: &str, config: &FanOutConfig) -> FanOutOutcome {
        let mut handles = Vec::with_capacity(self.adapters.len());

        for (pref, adapter) in self.adapters.iter().enumerate() {
            let adapter = Arc::clone(adapter);
            let query = query.to_string();
            let k = config.top_k;
            let deadline = config.deadline;
            handles.push(tokio::spawn(async move {
                let tag = adapter.source_tag().to_string();
                let outcome =
                    tokio::time::timeout(deadline, adapter.search(&query, k, deadline)).await;
                (pref, tag, outcome)
            }));
        }

        let mut outcome = FanOutOutcome::default();
        // (preference order, per-source rank, result)
        let mut collected: Vec<(usize, usize, SourceResult)> = Vec::new();

        for handle in handles {
            match handle.await {
                Ok((pref, tag, Ok(Ok(results)))) => {
                    debug!(source = %tag, count = results.len(), "source returned results");
                    for (rank, mut result) in results.into_iter().take(config.top_k).enumerate()
                    {
                        truncate_snippet(&mut result.snippet, config.snippet_byte_budget);
                        collected.push((pref, rank, result));
                    }
                }
                Ok((_, tag, Ok(Err(kind)))) => {
                    warn!(source = %tag, kind = %kind, "source search failed");
                    repflow_metrics::record_source_error(&tag, &kind.to_string());
                    outcome.errors.insert(tag, kind);
                }
                Ok((_, tag, Err(_elapsed))) => {
                    warn!(source = %tag, "source search timed out");
                    let kind = SourceErrorKind::Timeout;
                    repflow_metrics::record_source_error(&tag, &kind.to_string());
                    outcome.errors.insert(tag, kind);
                }
                Err(e) => {
                    warn!(error = %e, "source task panicked");
                }
            }
        }

        outcome.results = merge(collected);
        outcome
    }
}

/// Deduplicates by canonical URL and sorts into the stable merged order.
fn merge(collected: Vec<(usize, usize, SourceResult)>) -> Vec<SourceResult> {
    // canonical URL -> index into `kept`
    let mut by_url: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<(usize, usize, SourceResult)> = Vec::new();

    for (pref, rank, result) in collected {
        let key = canonical_url(&result.url);
        match by_url.get(&key) {
            None => {
                by_url.insert(key, kept.len());
                kept.push((pref, rank, result));
            }
            Some(&idx) => {
                let (kept_pref, _, kept_result) = &kept[idx];
                // Higher relevance wins; on a tie, the earlier preference
                // order wins.
                let replace = result.relevance > kept_result.relevance
                    || (result.relevance == kept_result.relevance && pref < *kept_pref);
                if replace {
                    kept[idx] = (pref, rank, result);
                }
            }
        }
    }

    kept.sort_by(|(a_pref, a_rank, a), (b_pref, b_rank, b)| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a_pref.cmp(b_pref))
            .then(a_rank.cmp(b_rank))
    });

    kept.into_iter().map(|(_, _, r)| r).collect()
}

/// Canonical form of a URL for dedup: case-insensitive, fragment stripped.
pub fn canonical_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    without_fragment.to_lowercase()
}

/// Truncates a snippet to at most `budget` bytes on a char boundary.
pub fn truncate_snippet(snippet: &mut String, budget: usize) {
    if snippet.len() <= budget {
        return;
    }
    let mut end = budget;
    while end > 0 && !snippet.is_char_boundary(end) {
        end -= 1;
    }
    snippet.truncate(end);
}
