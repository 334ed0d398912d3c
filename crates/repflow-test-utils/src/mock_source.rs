// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock source adapter for deterministic fan-out testing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use repflow_core::types::{AdapterType, HealthStatus, SourceErrorKind, SourceResult};
use repflow_core::{ComponentAdapter, RepflowError, SourceAdapter};

/// A source adapter with a fixed scripted reply and optional latency.
pub struct MockSource {
    tag: String,
    reply: Result<Vec<SourceResult>, SourceErrorKind>,
    delay: Duration,
}

impl MockSource {
    /// A source returning the given results.
    pub fn ok(tag: &str, results: Vec<SourceResult>) -> Arc<Self> {
        Arc::new(Self {
            tag: tag.to_string(),
            reply: Ok(results),
            delay: Duration::ZERO,
        })
    }

    /// A source failing with the given error kind.
    pub fn err(tag: &str, kind: SourceErrorKind) -> Arc<Self> {
        Arc::new(Self {
            tag: tag.to_string(),
            reply: Err(kind),
            delay: Duration::ZERO,
        })
    }

    /// A source that sleeps before replying (for timeout tests).
    pub fn slow(tag: &str, delay: Duration, results: Vec<SourceResult>) -> Arc<Self> {
        Arc::new(Self {
            tag: tag.to_string(),
            reply: Ok(results),
            delay,
        })
    }
}

/// Builds a source result with plausible defaults.
pub fn source_result(source: &str, url: &str, relevance: f64) -> SourceResult {
    SourceResult {
        source: source.to_string(),
        title: format!("Help article at {url}"),
        url: url.to_string(),
        snippet: "Step-by-step guidance for resolving the customer's issue.".to_string(),
        relevance,
    }
}

#[async_trait]
impl ComponentAdapter for MockSource {
    fn name(&self) -> &str {
        &self.tag
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Source
    }

    async fn health_check(&self) -> Result<HealthStatus, RepflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RepflowError> {
        Ok(())
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    fn source_tag(&self) -> &str {
        &self.tag
    }

    async fn search(
        &self,
        _query: &str,
        k: usize,
        _deadline: Duration,
    ) -> Result<Vec<SourceResult>, SourceErrorKind> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply
            .clone()
            .map(|results| results.into_iter().take(k).collect())
    }
}
