// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Claude provider adapter for the Repflow orchestrator.
//!
//! This crate implements [`LlmProvider`] for the Anthropic Messages API.
//! Logical model tags (`generator`, `evaluator`) are resolved to the
//! concrete models named in configuration; any other tag is passed
//! through verbatim.

pub mod client;
pub mod types;

use async_trait::async_trait;
use repflow_config::model::AnthropicConfig;
use repflow_core::error::RepflowError;
use repflow_core::traits::{ComponentAdapter, LlmProvider};
use repflow_core::types::{
    AdapterType, CompletionRequest, CompletionResponse, HealthStatus, TokenUsage,
};
use tracing::{debug, info};

use crate::client::AnthropicClient;
use crate::types::{ApiMessage, MessageRequest, ResponseContentBlock};

/// Logical model tag for the resolution generator.
pub const MODEL_TAG_GENERATOR: &str = "generator";

/// Logical model tag for the evaluator.
pub const MODEL_TAG_EVALUATOR: &str = "evaluator";

/// Anthropic Claude provider implementing [`LlmProvider`].
///
/// API key resolution order: config -> `ANTHROPIC_API_KEY` env var -> error.
pub struct AnthropicProvider {
    client: AnthropicClient,
    generator_model: String,
    evaluator_model: String,
}

impl AnthropicProvider {
    /// Creates a new Anthropic provider from the given configuration.
    pub fn new(config: &AnthropicConfig) -> Result<Self, RepflowError> {
        let api_key = resolve_api_key(&config.api_key)?;
        let client = AnthropicClient::new(api_key, config.api_version.clone())?;

        info!(
            generator_model = config.generator_model.as_str(),
            evaluator_model = config.evaluator_model.as_str(),
            "Anthropic provider initialized"
        );

        Ok(Self {
            client,
            generator_model: config.generator_model.clone(),
            evaluator_model: config.evaluator_model.clone(),
        })
    }

    /// Creates a provider with an existing client (for testing).
    #[cfg(test)]
    fn with_client(client: AnthropicClient, generator: &str, evaluator: &str) -> Self {
        Self {
            client,
            generator_model: generator.to_string(),
            evaluator_model: evaluator.to_string(),
        }
    }

    /// Resolves a logical model tag to a concrete model identifier.
    fn resolve_model(&self, tag: &str) -> String {
        match tag {
            MODEL_TAG_GENERATOR => self.generator_model.clone(),
            MODEL_TAG_EVALUATOR => self.evaluator_model.clone(),
            other => other.to_string(),
        }
    }

    /// Converts a [`CompletionRequest`] to a Messages API request.
    fn to_message_request(&self, request: &CompletionRequest) -> MessageRequest {
        MessageRequest {
            model: self.resolve_model(&request.model),
            messages: vec![ApiMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            system: request.system.clone(),
            max_tokens: request.max_tokens,
            temperature: Some(request.temperature),
            stream: false,
        }
    }
}

#[async_trait]
impl ComponentAdapter for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, RepflowError> {
        // A full check would make a lightweight API call, but we avoid
        // consuming tokens on health checks.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RepflowError> {
        debug!("Anthropic provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, RepflowError> {
        let api_request = self.to_message_request(&request);
        let response = self.client.complete_message(&api_request).await?;

        // Concatenate text content blocks.
        let text = response
            .content
            .iter()
            .map(|block| match block {
                ResponseContentBlock::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            text,
            model: response.model,
            usage: TokenUsage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            },
        })
    }
}

/// Resolves the API key from config or environment.
fn resolve_api_key(config_key: &Option<String>) -> Result<String, RepflowError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.clone());
    }

    std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
        RepflowError::Config(
            "Anthropic API key not found. Set anthropic.api_key in config or ANTHROPIC_API_KEY environment variable.".into(),
        )
    })
}
