// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolution generation: a customer-ready answer with inline citations.
//!
//! Citations use the `[Source: <url>]` marker convention. Every cited URL
//! is post-validated against the attempt's source results; a fabricated
//! URL fails the attempt without a second model call.

use std::sync::LazyLock;

use regex::Regex;
use repflow_core::error::FailureKind;
use repflow_core::types::{
    AttemptFeedback, Citation, CompletionRequest, SourceResult,
};
use repflow_core::{LlmProvider, RepflowError};
use repflow_sources::fanout::canonical_url;
use thiserror::Error;
use tracing::{debug, warn};

use crate::prompt;

/// Characters of each snippet included in the generation prompt.
const PROMPT_SNIPPET_CHARS: usize = 500;

static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[Source:\s*(https?://[^\]\s]+)\]").expect("valid regex")
});

const RESOLUTION_PROMPT: &str = "\
You are an expert customer service assistant for Fidelity Investments.

Generate a clear, accurate, and helpful response to the customer's question
based on the search results below.

## Customer Query:
{query}

## Search Results:
{search_results}

## Previous Feedback (if any):
{feedback}

## Instructions:
1. Analyze all search results carefully
2. Synthesize information from multiple sources
3. Create a clear, customer-friendly response that directly addresses the query
4. Cite every factual claim inline using the format: [Source: URL]
5. Keep the response concise but complete (2-4 short paragraphs, under 800 words)
6. Use professional but friendly language
7. Only cite URLs that appear in the search results above
8. If the search results don't contain enough information, say what is known
   and point to the closest relevant resource

Generate the customer response below:";

/// Output of a successful generation pass.
#[derive(Debug, Clone)]
pub struct GeneratedResolution {
    /// The answer text with inline citation markers.
    pub text: String,
    /// Ordered citations extracted from the text.
    pub citations: Vec<Citation>,
    /// ISO 8601 generation timestamp.
    pub generated_at: String,
}

/// Failure modes of the generation stage.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The source list was empty and grounding is required.
    #[error("no source material available for grounding")]
    NoSources,

    /// The resolution cited one or more URLs outside the source set.
    #[error("resolution cited URLs outside the source set: {invalid_urls:?}")]
    CitationInvalid { invalid_urls: Vec<String> },

    /// The underlying model call failed.
    #[error(transparent)]
    Provider(#[from] RepflowError),
}

impl GenerationError {
    /// The workflow failure kind this error surfaces as.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            GenerationError::NoSources => FailureKind::NoSources,
            GenerationError::CitationInvalid { .. } => FailureKind::CitationInvalid,
            GenerationError::Provider(_) => FailureKind::ModelUnavailable,
        }
    }
}

/// Generates a cited resolution for the query from the merged source results.
pub async fn generate_resolution(
    provider: &dyn LlmProvider,
    query: &str,
    sources: &[SourceResult],
    feedback: &[AttemptFeedback],
    require_grounding: bool,
    max_tokens: u32,
) -> Result<GeneratedResolution, GenerationError> {
    if sources.is_empty() && require_grounding {
        warn!("no source results available for resolution generation");
        return Err(GenerationError::NoSources);
    }

    let prompt_text = RESOLUTION_PROMPT
        .replace("{query}", query)
        .replace(
            "{search_results}",
            &prompt::format_sources(sources, PROMPT_SNIPPET_CHARS),
        )
        .replace("{feedback}", &prompt::format_feedback(feedback));

    let response = provider
        .complete(CompletionRequest {
            model: "generator".to_string(),
            system: None,
            prompt: prompt_text,
            temperature: 0.5,
            max_tokens,
        })
        .await
        .map_err(GenerationError::Provider)?;

    let text = response.text.trim().to_string();
    let (citations, invalid_urls) = extract_citations(&text, sources);

    if !invalid_urls.is_empty() {
        warn!(
            invalid = invalid_urls.len(),
            "resolution cited URLs absent from the source results"
        );
        return Err(GenerationError::CitationInvalid { invalid_urls });
    }

    debug!(
        chars = text.len(),
        citations = citations.len(),
        "resolution generated"
    );
    Ok(GeneratedResolution {
        text,
        citations,
        generated_at: chrono::Utc::now().to_rfc3339(),
    })
}

/// Extracts `[Source: URL]` citations and splits them into valid (present
/// in the source results) and invalid (fabricated) URLs. Duplicate URLs
/// are collapsed; labels come from the matching source title.
pub fn extract_citations(
    text: &str,
    sources: &[SourceResult],
) -> (Vec<Citation>, Vec<String>) {
    let mut citations = Vec::new();
    let mut invalid = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for captures in CITATION_RE.captures_iter(text) {
        let url = captures[1].trim().to_string();
        let key = canonical_url(&url);
        if !seen.insert(key.clone()) {
            continue;
        }

        match sources.iter().find(|s| canonical_url(&s.url) == key) {
            Some(source) => citations.push(Citation {
                label: if source.title.is_empty() {
                    "Documentation".to_string()
                } else {
                    source.title.clone()
                },
                url,
            }),
            None => invalid.push(url),
        }
    }

    (citations, invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubProvider;

    fn sources() -> Vec<SourceResult> {
        vec![
            SourceResult {
                source: "fidelity".into(),
                title: "Reset your password".into(),
                url: "https://www.fidelity.com/help/reset".into(),
                snippet: "reset steps".into(),
                relevance: 0.9,
            },
            SourceResult {
                source: "mygps".into(),
                title: "Account access FAQ".into(),
                url: "https://mygps.internal/faq".into(),
                snippet: "faq content".into(),
                relevance: 0.8,
            },
        ]
    }

    #[tokio::test]
    async fn extracts_citations_from_generated_text() {
        let reply = "To reset your password, use the online flow \
                     [Source: https://www.fidelity.com/help/reset]. More details in the FAQ \
                     [Source: https://mygps.internal/faq].";
        let provider = StubProvider::with_replies(vec![Ok(reply.to_string())]);

        let generated =
            generate_resolution(&provider, "401k password reset", &sources(), &[], true, 1024)
                .await
                .unwrap();

        assert_eq!(generated.citations.len(), 2);
        assert_eq!(generated.citations[0].label, "Reset your password");
        assert_eq!(
            generated.citations[0].url,
            "https://www.fidelity.com/help/reset"
        );
        assert!(generated.text.contains("[Source:"));
    }

    #[tokio::test]
    async fn empty_sources_with_grounding_required_fails() {
        let provider = StubProvider::with_replies(vec![Ok("unused".to_string())]);
        let err = generate_resolution(&provider, "q", &[], &[], true, 1024)
            .await
            .unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::NoSources);
        // The model is never invoked.
        assert!(provider.requests().await.is_empty());
    }

    #[tokio::test]
    async fn empty_sources_without_grounding_generates() {
        let provider =
            StubProvider::with_replies(vec![Ok("General guidance, no citations.".to_string())]);
        let generated = generate_resolution(&provider, "q", &[], &[], false, 1024)
            .await
            .unwrap();
        assert!(generated.citations.is_empty());
    }

    #[tokio::test]
    async fn fabricated_citation_fails_without_second_call() {
        let reply = "See [Source: https://www.fidelity.com/help/reset] and also \
                     [Source: https://made-up.example/nowhere].";
        let provider = StubProvider::with_replies(vec![Ok(reply.to_string())]);

        let err = generate_resolution(&provider, "q", &sources(), &[], true, 1024)
            .await
            .unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::CitationInvalid);
        assert_eq!(provider.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn provider_error_maps_to_model_unavailable() {
        let provider = StubProvider::with_replies(vec![Err(())]);
        let err = generate_resolution(&provider, "q", &sources(), &[], true, 1024)
            .await
            .unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::ModelUnavailable);
    }

    #[test]
    fn citation_urls_match_case_insensitively_without_fragment() {
        let text = "Look here [Source: https://WWW.Fidelity.com/help/reset#steps].";
        let (citations, invalid) = extract_citations(text, &sources());
        assert_eq!(citations.len(), 1);
        assert!(invalid.is_empty());
    }

    #[test]
    fn duplicate_citations_collapse() {
        let text = "[Source: https://www.fidelity.com/help/reset] twice \
                    [Source: https://www.fidelity.com/help/reset]";
        let (citations, invalid) = extract_citations(text, &sources());
        assert_eq!(citations.len(), 1);
        assert!(invalid.is_empty());
    }

    #[tokio::test]
    async fn generation_uses_moderate_temperature() {
        let provider = StubProvider::with_replies(vec![Ok("text".to_string())]);
        generate_resolution(&provider, "q", &sources(), &[], true, 1024)
            .await
            .unwrap();
        let requests = provider.requests().await;
        assert_eq!(requests[0].model, "generator");
        assert!((requests[0].temperature - 0.5).abs() < f32::EPSILON);
    }
}
