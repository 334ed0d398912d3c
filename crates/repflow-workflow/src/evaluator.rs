// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Evaluation: LLM-as-judge scoring plus guardrail predicates.
//!
//! The evaluator runs on its own model configuration (lower temperature,
//! independent model tag) to reduce correlated bias with the generator.
//! It scores the resolution; it never rewrites it.

use repflow_core::types::{
    CompletionRequest, EvaluationScores, EvaluationVerdict, SourceResult,
};
use repflow_core::{LlmProvider, RepflowError};
use serde::Deserialize;
use tracing::{debug, warn};

/// Guardrail: minimum substantive resolution length in characters.
const MIN_RESOLUTION_CHARS: usize = 100;

/// Guardrail: hedging phrases that disqualify a customer-facing answer.
const HEDGING_PHRASES: &[&str] = &["i don't know", "i cannot", "i'm not sure"];

const EVALUATION_PROMPT: &str = "\
You are an expert quality evaluator for customer service responses at
Fidelity Investments. Evaluate the generated resolution against the
customer query and the search results it was grounded on.

## Original Customer Query:
{query}

## Search Results Used:
{search_results_summary}

## Generated Resolution:
{resolution}

## Criteria (score each 1-5, where 3 is the minimum acceptable):
1. accuracy: does the resolution correctly and completely address the query?
2. relevancy: is the information pertinent to what the customer asked?
3. factual_grounding: is every factual claim supported by the provided sources?
4. citation_quality: are citations specific, relevant, and in [Source: URL] format?
5. clarity: is the response clear, well-organized, and customer-friendly?

Be strict but fair. Provide specific, actionable feedback when any score
is below 4. Do not rewrite the resolution.

Respond with a JSON object:
{\"accuracy\": N, \"relevancy\": N, \"factual_grounding\": N, \"citation_quality\": N, \"clarity\": N, \"feedback\": \"...\"}";

#[derive(Debug, Deserialize)]
struct EvaluationReply {
    accuracy: i64,
    relevancy: i64,
    factual_grounding: i64,
    citation_quality: i64,
    clarity: i64,
    #[serde(default)]
    feedback: String,
}

/// Scores a resolution and derives the pass verdict.
///
/// `passed = guardrails_passed && min(scores) >= min_score`. A provider
/// error propagates; the engine records it as a retryable
/// `evaluator_unavailable` attempt failure.
pub async fn evaluate(
    provider: &dyn LlmProvider,
    query: &str,
    resolution_text: &str,
    sources: &[SourceResult],
    min_score: u8,
    max_tokens: u32,
) -> Result<EvaluationVerdict, RepflowError> {
    let summary = if sources.is_empty() {
        "No search results available".to_string()
    } else {
        sources
            .iter()
            .take(5)
            .map(|r| format!("- [{}] {}: {}", r.source, r.title, r.url))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let prompt_text = EVALUATION_PROMPT
        .replace("{query}", query)
        .replace("{search_results_summary}", &summary)
        .replace("{resolution}", resolution_text);

    let response = provider
        .complete(CompletionRequest {
            model: "evaluator".to_string(),
            system: None,
            prompt: prompt_text,
            temperature: 0.2,
            max_tokens,
        })
        .await?;

    let reply = crate::prompt::extract_json_object(&response.text)
        .and_then(|json| serde_json::from_str::<EvaluationReply>(json).ok())
        .ok_or_else(|| RepflowError::Provider {
            message: "evaluator returned unparseable output".to_string(),
            source: None,
        })?;

    let scores = EvaluationScores {
        accuracy: clamp_score(reply.accuracy),
        relevancy: clamp_score(reply.relevancy),
        factual_grounding: clamp_score(reply.factual_grounding),
        citation_quality: clamp_score(reply.citation_quality),
        clarity: clamp_score(reply.clarity),
    };

    let guardrails_passed = check_guardrails(resolution_text);
    let passed = guardrails_passed && scores.min() >= min_score;
    let feedback = if passed { String::new() } else { reply.feedback };

    if passed {
        debug!(min = scores.min(), "evaluation passed");
    } else {
        warn!(
            min = scores.min(),
            guardrails_passed, "evaluation did not pass"
        );
    }

    Ok(EvaluationVerdict {
        scores,
        guardrails_passed,
        feedback,
        passed,
    })
}

/// Bounded predicate checks independent of the scored criteria.
///
/// A customer-facing answer must be substantive, carry at least one inline
/// citation, and avoid hedging language.
pub fn check_guardrails(resolution_text: &str) -> bool {
    if resolution_text.len() < MIN_RESOLUTION_CHARS {
        return false;
    }
    if !resolution_text.contains("[Source:") {
        return false;
    }
    let lower = resolution_text.to_lowercase();
    if HEDGING_PHRASES.iter().any(|p| lower.contains(p)) {
        return false;
    }
    true
}

fn clamp_score(score: i64) -> u8 {
    score.clamp(1, 5) as u8
}
