// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-crate test doubles for the LLM and source ports.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use repflow_core::types::{
    AdapterType, CompletionRequest, CompletionResponse, HealthStatus, SourceErrorKind,
    SourceResult, TokenUsage,
};
use repflow_core::{ComponentAdapter, LlmProvider, RepflowError, SourceAdapter};
use tokio::sync::Mutex;

/// Scripted LLM provider: replies are popped FIFO; `Err(())` injects a
/// provider failure. Every request is recorded for assertions.
pub struct StubProvider {
    replies: Mutex<VecDeque<Result<String, ()>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl StubProvider {
    pub fn with_replies(replies: Vec<Result<String, ()>>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from(replies)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl ComponentAdapter for StubProvider {
    fn name(&self) -> &str {
        "stub-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, RepflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RepflowError> {
        Ok(())
    }
}

#[async_trait]
impl LlmProvider for StubProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, RepflowError> {
        self.requests.lock().await.push(request.clone());
        let reply = self
            .replies
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok("stub reply".to_string()));
        match reply {
            Ok(text) => Ok(CompletionResponse {
                text,
                model: request.model,
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 20,
                },
            }),
            Err(()) => Err(RepflowError::Provider {
                message: "stubbed provider failure".to_string(),
                source: None,
            }),
        }
    }
}

/// Fixed-reply source adapter for engine tests.
pub struct StubSource {
    tag: String,
    reply: Result<Vec<SourceResult>, SourceErrorKind>,
}

impl StubSource {
    pub fn ok(tag: &str, results: Vec<SourceResult>) -> Arc<Self> {
        Arc::new(Self {
            tag: tag.to_string(),
            reply: Ok(results),
        })
    }

    pub fn err(tag: &str, kind: SourceErrorKind) -> Arc<Self> {
        Arc::new(Self {
            tag: tag.to_string(),
            reply: Err(kind),
        })
    }
}

#[async_trait]
impl ComponentAdapter for StubSource {
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
impl SourceAdapter for StubSource {
    fn source_tag(&self) -> &str {
        &self.tag
    }

    async fn search(
        &self,
        _query: &str,
        _k: usize,
        _deadline: Duration,
    ) -> Result<Vec<SourceResult>, SourceErrorKind> {
        self.reply.clone()
    }
}

/// A plausible source result pointing at the public help site.
pub fn help_result(url: &str, relevance: f64) -> SourceResult {
    SourceResult {
        source: "fidelity".to_string(),
        title: "Help article".to_string(),
        url: url.to_string(),
        snippet: "How to resolve the issue step by step.".to_string(),
        relevance,
    }
}
