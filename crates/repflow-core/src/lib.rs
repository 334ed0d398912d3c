// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Repflow orchestrator.
//!
//! This crate provides the foundational trait definitions, error types, and
//! domain model used throughout the Repflow workspace. All component
//! adapters implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{FailureKind, RepflowError};
pub use types::{AdapterType, ConversationId, HealthStatus, RunId};

// Re-export all port traits at crate root.
pub use traits::{
    ComponentAdapter, EventSink, LlmProvider, NullEventSink, Observer, SourceAdapter,
    StoragePort,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repflow_error_has_all_variants() {
        let _config = RepflowError::Config("test".into());
        let _storage = RepflowError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _provider = RepflowError::Provider {
            message: "test".into(),
            source: None,
        };
        let _not_found = RepflowError::ConversationNotFound { id: "c-1".into() };
        let _invalid = RepflowError::InvalidState {
            message: "completed".into(),
        };
        let _in_progress = RepflowError::RunInProgress {
            conversation_id: "c-1".into(),
        };
        let _timeout = RepflowError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _cancelled = RepflowError::Cancelled;
        let _internal = RepflowError::Internal("test".into());
    }

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;

        let variants = [
            AdapterType::Provider,
            AdapterType::Source,
            AdapterType::Storage,
            AdapterType::Observability,
        ];
        for variant in &variants {
            let s = variant.to_string();
            let parsed = AdapterType::from_str(&s).expect("should parse back");
            assert_eq!(*variant, parsed);
        }
    }

    #[test]
    fn health_status_variants() {
        let healthy = HealthStatus::Healthy;
        let degraded = HealthStatus::Degraded("slow".into());
        let unhealthy = HealthStatus::Unhealthy("down".into());

        assert_eq!(healthy, HealthStatus::Healthy);
        assert_ne!(degraded, healthy);
        assert_ne!(unhealthy, healthy);
    }

    #[test]
    fn all_trait_modules_are_exported() {
        // If any trait module is missing or has a compile error, this
        // test won't compile.
        fn _assert_component_adapter<T: ComponentAdapter>() {}
        fn _assert_llm_provider<T: LlmProvider>() {}
        fn _assert_source_adapter<T: SourceAdapter>() {}
        fn _assert_storage_port<T: StoragePort>() {}
        fn _assert_event_sink<T: EventSink>() {}
        fn _assert_observer<T: Observer>() {}
    }
}
