// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query formulation: turn the transcript into an optimized search query.
//!
//! Delegated to the language-model port at low temperature. On retries the
//! prompt carries every prior attempt's query and evaluator feedback so
//! the next query narrows, broadens, or re-aims accordingly.

use repflow_core::types::{
    AttemptFeedback, CompletionRequest, ConversationMessage, MessageRole, QueryMetadata,
};
use repflow_core::{LlmProvider, RepflowError};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::prompt;

/// Maximum optimized query length in characters.
const MAX_QUERY_CHARS: usize = 256;

const QUERY_FORMULATION_PROMPT: &str = "\
You are a search query optimization specialist for Fidelity financial services.

Analyze the conversation transcript between a customer and a service
representative, then generate an optimized search query to find relevant
help content.

## Conversation Transcript:
{transcript}

## Previous Attempts (if retry):
{feedback}

## Instructions:
1. Identify the customer's core issue or question
2. Extract key financial terms, account types, and specific problems
3. Create a concise search query (5-10 words) optimized for semantic search
4. List important keywords and named entities
5. Determine the customer's primary intent

## Guidelines:
- Focus on actionable problems, not general conversation
- Include specific product names (401k, IRA, brokerage, etc.)
- Prioritize technical terms over conversational language
- If this is a retry, use the feedback to improve the query

Respond with a JSON object:
{\"optimized_query\": \"...\", \"keywords\": [\"...\"], \"entities\": [\"...\"], \"intent\": \"...\"}";

/// Structured output of query formulation.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// The optimized search query (at most 256 characters).
    pub optimized_query: String,
    /// Structured metadata; optional to consumers.
    pub metadata: QueryMetadata,
}

#[derive(Debug, Deserialize)]
struct QueryReply {
    optimized_query: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    intent: Option<String>,
}

/// Formulates an optimized query from the transcript and prior feedback.
///
/// Fails with a provider error (`model_unavailable`) only when the LLM call
/// itself errors after its internal retries. A malformed reply falls back
/// to the last customer message, matching the conservative behavior a
/// degraded formulator should have.
pub async fn formulate_query(
    provider: &dyn LlmProvider,
    messages: &[ConversationMessage],
    feedback: &[AttemptFeedback],
    max_tokens: u32,
) -> Result<QueryPlan, RepflowError> {
    let prompt_text = QUERY_FORMULATION_PROMPT
        .replace("{transcript}", &prompt::format_transcript(messages))
        .replace("{feedback}", &prompt::format_feedback(feedback));

    let response = provider
        .complete(CompletionRequest {
            model: "generator".to_string(),
            system: None,
            prompt: prompt_text,
            temperature: 0.3,
            max_tokens,
        })
        .await?;

    if let Some(json) = prompt::extract_json_object(&response.text)
        && let Ok(reply) = serde_json::from_str::<QueryReply>(json)
    {
        let optimized_query = truncate_chars(reply.optimized_query.trim(), MAX_QUERY_CHARS);
        debug!(query = %optimized_query, "query formulated");
        return Ok(QueryPlan {
            optimized_query,
            metadata: QueryMetadata {
                keywords: reply.keywords,
                entities: reply.entities,
                intent: reply.intent,
            },
        });
    }

    warn!("query reply was not valid JSON, falling back to last customer message");
    let fallback = messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::Customer)
        .map(|m| truncate_chars(&m.content, MAX_QUERY_CHARS))
        .unwrap_or_default();
    Ok(QueryPlan {
        optimized_query: fallback,
        metadata: QueryMetadata::default(),
    })
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
