// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trigger detection: did the representative just ask for assistance?
//!
//! Scans only the most recent representative message. Matching on older
//! turns would re-fire the workflow on every new message for the rest of
//! the conversation.

use repflow_core::types::{ConversationMessage, MessageRole, TriggerVerdict};

/// Checks the latest representative message against the activation phrases.
///
/// Matching is case-insensitive substring containment. Pure and
/// side-effect-free; an empty history or a history without representative
/// turns never triggers.
pub fn detect_trigger(messages: &[ConversationMessage], phrases: &[String]) -> TriggerVerdict {
    let Some(latest_rep) = messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::Representative)
    else {
        return TriggerVerdict {
            triggered: false,
            matched_phrase: None,
        };
    };

    let content = latest_rep.content.to_lowercase();
    for phrase in phrases {
        if content.contains(&phrase.to_lowercase()) {
            return TriggerVerdict {
                triggered: true,
                matched_phrase: Some(phrase.clone()),
            };
        }
    }

    TriggerVerdict {
        triggered: false,
        matched_phrase: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: MessageRole, content: &str, seq: i64) -> ConversationMessage {
        ConversationMessage {
            id: format!("m{seq}"),
            conversation_id: "conv-1".to_string(),
            role,
            content: content.to_string(),
            seq,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    fn phrases() -> Vec<String> {
        vec![
            "let me take a look".to_string(),
            "let me check".to_string(),
            "i'll look into".to_string(),
            "checking that for you".to_string(),
        ]
    }

    #[test]
    fn matches_phrase_in_latest_rep_message() {
        let messages = vec![
            msg(MessageRole::Customer, "How do I reset my 401k password?", 1),
            msg(MessageRole::Representative, "Let me check that for you.", 2),
        ];
        let verdict = detect_trigger(&messages, &phrases());
        assert!(verdict.triggered);
        assert_eq!(verdict.matched_phrase.as_deref(), Some("let me check"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let messages = vec![msg(
            MessageRole::Representative,
            "LET ME TAKE A LOOK at that account",
            1,
        )];
        assert!(detect_trigger(&messages, &phrases()).triggered);
    }

    #[test]
    fn empty_history_does_not_trigger() {
        let verdict = detect_trigger(&[], &phrases());
        assert!(!verdict.triggered);
        assert!(verdict.matched_phrase.is_none());
    }

    #[test]
    fn customer_only_history_does_not_trigger() {
        let messages = vec![msg(MessageRole::Customer, "let me check my balance", 1)];
        assert!(!detect_trigger(&messages, &phrases()).triggered);
    }

    #[test]
    fn only_latest_rep_message_is_scanned() {
        // The phrase sits in an older rep turn; the latest rep turn is clean.
        let messages = vec![
            msg(MessageRole::Representative, "let me check on that", 1),
            msg(MessageRole::Customer, "thanks", 2),
            msg(MessageRole::Representative, "here is your answer", 3),
        ];
        assert!(!detect_trigger(&messages, &phrases()).triggered);
    }

    #[test]
    fn no_phrase_match_does_not_trigger() {
        let messages = vec![msg(MessageRole::Representative, "hello there", 1)];
        assert!(!detect_trigger(&messages, &phrases()).triggered);
    }
}
