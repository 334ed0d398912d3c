// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Source fan-out and content-source adapters for the Repflow orchestrator.
//!
//! The fan-out invokes every registered [`repflow_core::SourceAdapter`]
//! concurrently, absorbs per-source failures, and produces a deterministic
//! merged result list. Three adapter families ship here: the public web
//! source, the credentialed internal knowledge source, and the semantic
//! index over previously-ingested content.

pub mod fanout;
pub mod fidelity;
pub mod index;
pub mod mygps;

pub use fanout::{FanOutConfig, FanOutOutcome, SourceFanOut};
pub use fidelity::FidelitySearcher;
pub use index::{ContentIndex, IndexSource, IndexedArticle};
pub use mygps::MyGpsSearcher;
