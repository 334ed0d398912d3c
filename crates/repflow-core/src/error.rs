// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Repflow orchestrator.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// The primary error type used across all Repflow ports and core operations.
#[derive(Debug, Error)]
pub enum RepflowError {
    /// Configuration errors (invalid TOML, missing required fields, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// LLM provider errors (API failure, token limits, model not found).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The requested conversation does not exist.
    #[error("conversation not found: {id}")]
    ConversationNotFound { id: String },

    /// The requested resolution does not exist.
    #[error("resolution not found: {id}")]
    ResolutionNotFound { id: String },

    /// The conversation is in a lifecycle state that rejects the operation.
    #[error("invalid conversation state: {message}")]
    InvalidState { message: String },

    /// A workflow run is already in flight for the conversation.
    #[error("run already in progress for conversation {conversation_id}")]
    RunInProgress { conversation_id: String },

    /// Operation exceeded its deadline.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// The run was cancelled by the caller.
    #[error("run cancelled")]
    Cancelled,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RepflowError {
    /// Maps this error to the workflow failure kind it surfaces as, if any.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            RepflowError::RunInProgress { .. } => Some(FailureKind::RunInProgress),
            RepflowError::Provider { .. } => Some(FailureKind::ModelUnavailable),
            RepflowError::Timeout { .. } => Some(FailureKind::StageTimeout),
            RepflowError::Cancelled => Some(FailureKind::Cancelled),
            RepflowError::Storage { .. } => Some(FailureKind::PersistenceError),
            _ => None,
        }
    }
}

/// Stable string tags for workflow-level outcomes and attempt failures.
///
/// These are the error kinds persisted on run records and carried in
/// terminal events; they form the wire contract with callers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No trigger phrase matched; terminal but not an error.
    NotTriggered,
    /// Rejected by the single-flight guard.
    RunInProgress,
    /// A language-model call failed after its internal retries.
    ModelUnavailable,
    /// The generator had no source material to ground on.
    NoSources,
    /// The generator cited a URL absent from the source results.
    CitationInvalid,
    /// The evaluator language-model call failed.
    EvaluatorUnavailable,
    /// A stage exceeded its deadline.
    StageTimeout,
    /// The run was cancelled externally.
    Cancelled,
    /// A persistence write failed.
    PersistenceError,
}

impl FailureKind {
    /// Whether an attempt failing with this kind may be retried within
    /// the run's attempt budget.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::ModelUnavailable
                | FailureKind::NoSources
                | FailureKind::CitationInvalid
                | FailureKind::EvaluatorUnavailable
                | FailureKind::StageTimeout
        )
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn failure_kind_round_trips_through_strings() {
        let kinds = [
            FailureKind::NotTriggered,
            FailureKind::RunInProgress,
            FailureKind::ModelUnavailable,
            FailureKind::NoSources,
            FailureKind::CitationInvalid,
            FailureKind::EvaluatorUnavailable,
            FailureKind::StageTimeout,
            FailureKind::Cancelled,
            FailureKind::PersistenceError,
        ];
        for kind in kinds {
            let tag = kind.to_string();
            assert_eq!(FailureKind::from_str(&tag).unwrap(), kind);
        }
    }

    #[test]
    fn failure_kind_uses_snake_case_tags() {
        assert_eq!(FailureKind::NotTriggered.to_string(), "not_triggered");
        assert_eq!(FailureKind::RunInProgress.to_string(), "run_in_progress");
        assert_eq!(FailureKind::CitationInvalid.to_string(), "citation_invalid");
        assert_eq!(FailureKind::StageTimeout.to_string(), "stage_timeout");
    }

    #[test]
    fn retryable_kinds() {
        assert!(FailureKind::ModelUnavailable.is_retryable());
        assert!(FailureKind::NoSources.is_retryable());
        assert!(FailureKind::CitationInvalid.is_retryable());
        assert!(FailureKind::EvaluatorUnavailable.is_retryable());
        assert!(FailureKind::StageTimeout.is_retryable());
        assert!(!FailureKind::Cancelled.is_retryable());
        assert!(!FailureKind::NotTriggered.is_retryable());
        assert!(!FailureKind::PersistenceError.is_retryable());
    }

    #[test]
    fn error_maps_to_failure_kind() {
        let err = RepflowError::Provider {
            message: "overloaded".into(),
            source: None,
        };
        assert_eq!(err.failure_kind(), Some(FailureKind::ModelUnavailable));

        let err = RepflowError::Timeout {
            duration: Duration::from_secs(10),
        };
        assert_eq!(err.failure_kind(), Some(FailureKind::StageTimeout));

        assert_eq!(
            RepflowError::Cancelled.failure_kind(),
            Some(FailureKind::Cancelled)
        );
        assert_eq!(RepflowError::Config("x".into()).failure_kind(), None);
    }
}
