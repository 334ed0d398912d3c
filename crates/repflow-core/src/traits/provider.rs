// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Language-model provider trait.

use async_trait::async_trait;

use crate::error::RepflowError;
use crate::traits::adapter::ComponentAdapter;
use crate::types::{CompletionRequest, CompletionResponse};

/// Port to a language-model provider.
///
/// The workflow engine depends only on this abstraction; concrete provider
/// selection (and any internal retry against transient API errors) is the
/// implementation's concern. Logical model tags in [`CompletionRequest`]
/// are resolved to concrete models by the provider.
#[async_trait]
pub trait LlmProvider: ComponentAdapter {
    /// Sends a completion request and returns the full response.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, RepflowError>;
}
