// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for the Repflow workspace.
//!
//! Mock LLM provider, mock source adapters, and an end-to-end harness
//! assembling the full engine stack over a temp SQLite database.

pub mod harness;
pub mod mock_provider;
pub mod mock_source;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_provider::{
    eval_reply, eval_reply_scores, query_reply, resolution_reply, MockProvider, MockReply,
};
pub use mock_source::{source_result, MockSource};
