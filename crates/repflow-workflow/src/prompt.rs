// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared prompt assembly helpers for the LLM-backed stages.

use repflow_core::types::{AttemptFeedback, ConversationMessage, SourceResult};

/// Renders the transcript as "ROLE: content" lines.
pub fn format_transcript(messages: &[ConversationMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.to_string().to_uppercase(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders accumulated attempt feedback for retry prompts, or "None".
pub fn format_feedback(feedback: &[AttemptFeedback]) -> String {
    if feedback.is_empty() {
        return "None".to_string();
    }
    feedback
        .iter()
        .map(|f| {
            format!(
                "Attempt {} used query \"{}\". Evaluator feedback: {}",
                f.attempt_index, f.query, f.feedback
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders source results as a numbered block for generation prompts.
///
/// Snippets are already bounded by the fan-out; a further cap here keeps
/// the prompt compact when many sources hit.
pub fn format_sources(results: &[SourceResult], snippet_chars: usize) -> String {
    results
        .iter()
        .enumerate()
        .map(|(idx, r)| {
            let snippet: String = r.snippet.chars().take(snippet_chars).collect();
            format!(
                "[{}] {}\n    URL: {}\n    Source: {}\n    Content: {}",
                idx + 1,
                r.title,
                r.url,
                r.source,
                snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extracts the first JSON object from model output.
///
/// Tolerates markdown code fences and prose around the object. Returns the
/// substring from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use repflow_core::types::MessageRole;

    use super::*;

    #[test]
    fn transcript_renders_roles_upper_case() {
        let messages = vec![
            ConversationMessage {
                id: "m1".into(),
                conversation_id: "c".into(),
                role: MessageRole::Customer,
                content: "help".into(),
                seq: 1,
                created_at: String::new(),
            },
            ConversationMessage {
                id: "m2".into(),
                conversation_id: "c".into(),
                role: MessageRole::Representative,
                content: "let me check".into(),
                seq: 2,
                created_at: String::new(),
            },
        ];
        let rendered = format_transcript(&messages);
        assert_eq!(rendered, "CUSTOMER: help\nREPRESENTATIVE: let me check");
    }

    #[test]
    fn empty_feedback_renders_none() {
        assert_eq!(format_feedback(&[]), "None");
    }

    #[test]
    fn feedback_includes_attempt_and_query() {
        let feedback = vec![AttemptFeedback {
            attempt_index: 1,
            query: "401k reset".into(),
            feedback: "too broad".into(),
        }];
        let rendered = format_feedback(&feedback);
        assert!(rendered.contains("Attempt 1"));
        assert!(rendered.contains("401k reset"));
        assert!(rendered.contains("too broad"));
    }

    #[test]
    fn json_extraction_strips_fences_and_prose() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json_object(text), Some("{\"a\": 1}"));
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn sources_render_with_index_and_url() {
        let sources = vec![SourceResult {
            source: "fidelity".into(),
            title: "Reset".into(),
            url: "https://f.example/reset".into(),
            snippet: "how to reset".into(),
            relevance: 0.9,
        }];
        let rendered = format_sources(&sources, 500);
        assert!(rendered.starts_with("[1] Reset"));
        assert!(rendered.contains("URL: https://f.example/reset"));
    }
}
