// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Port trait definitions for the Repflow component architecture.
//!
//! All adapters extend the [`ComponentAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod events;
pub mod observability;
pub mod provider;
pub mod source;
pub mod storage;

// Re-export all traits at the traits module level for convenience.
pub use adapter::ComponentAdapter;
pub use events::{EventSink, NullEventSink};
pub use observability::Observer;
pub use provider::LlmProvider;
pub use source::SourceAdapter;
pub use storage::StoragePort;
