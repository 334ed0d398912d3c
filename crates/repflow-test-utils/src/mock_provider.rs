// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider for deterministic testing.
//!
//! `MockProvider` implements `LlmProvider` with pre-configured replies,
//! enabling fast, CI-runnable tests without external API calls. Replies
//! are popped from a FIFO queue; an exhausted queue yields a default text.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use repflow_core::types::{
    AdapterType, CompletionRequest, CompletionResponse, HealthStatus, TokenUsage,
};
use repflow_core::{ComponentAdapter, LlmProvider, RepflowError};
use tokio::sync::Mutex;

/// One scripted reply from the mock provider.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this text.
    Text(String),
    /// Fail with a provider error.
    Error,
}

/// A mock LLM provider that returns pre-configured replies.
pub struct MockProvider {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockProvider {
    /// Create a new mock provider with an empty reply queue.
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock provider pre-loaded with the given replies.
    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a reply to the end of the queue.
    pub async fn push_reply(&self, reply: MockReply) {
        self.replies.lock().await.push_back(reply);
    }

    /// Every request the provider has served, in order.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ComponentAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
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
impl LlmProvider for MockProvider {
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
            .unwrap_or(MockReply::Text("mock reply".to_string()));
        match reply {
            MockReply::Text(text) => Ok(CompletionResponse {
                text,
                model: request.model,
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 20,
                },
            }),
            MockReply::Error => Err(RepflowError::Provider {
                message: "mock provider failure".to_string(),
                source: None,
            }),
        }
    }
}

/// A well-formed query formulation reply.
pub fn query_reply(query: &str) -> MockReply {
    MockReply::Text(format!(
        r#"{{"optimized_query": "{query}", "keywords": ["{query}"], "entities": [], "intent": "customer assistance"}}"#
    ))
}

/// A resolution reply citing the given URLs, long enough to pass guardrails.
pub fn resolution_reply(urls: &[&str]) -> MockReply {
    let citations: String = urls
        .iter()
        .map(|u| format!(" [Source: {u}]"))
        .collect::<Vec<_>>()
        .join("");
    MockReply::Text(format!(
        "To resolve this, follow the documented steps: open the account page, verify \
         your identity, and complete the reset flow. The process takes a few minutes \
         and a confirmation is sent when it finishes.{citations}"
    ))
}

/// An evaluation reply with uniform scores across all five criteria.
pub fn eval_reply(score: u8, feedback: &str) -> MockReply {
    eval_reply_scores([score; 5], feedback)
}

/// An evaluation reply with explicit per-criterion scores.
pub fn eval_reply_scores(scores: [u8; 5], feedback: &str) -> MockReply {
    MockReply::Text(format!(
        r#"{{"accuracy": {}, "relevancy": {}, "factual_grounding": {}, "citation_quality": {}, "clarity": {}, "feedback": "{}"}}"#,
        scores[0], scores[1], scores[2], scores[3], scores[4], feedback
    ))
}
