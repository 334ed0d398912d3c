// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observer trait wrapping workflow stage and run lifecycle events.

use crate::types::{EvaluationVerdict, RunSummary, StageContext, StageOutcome};

/// Pluggable observer invoked around every stage of a workflow run.
///
/// Tracing and metrics backends implement this trait so the engine never
/// couples to a concrete telemetry system. Every hook has a no-op default;
/// implementations override only what they record. Callbacks must be
/// cheap; heavy work belongs in the backend, not the hook.
pub trait Observer: Send + Sync {
    /// Called immediately before a stage begins.
    fn stage_started(&self, _ctx: &StageContext) {}

    /// Called when a stage completes or fails.
    fn stage_finished(&self, _ctx: &StageContext, _outcome: &StageOutcome) {}

    /// Called when an attempt's evaluation verdict is recorded.
    fn verdict_recorded(&self, _ctx: &StageContext, _verdict: &EvaluationVerdict) {}

    /// Called once when a triggered run launches its pipeline.
    fn run_started(&self, _conversation_id: &str, _run_id: &str) {}

    /// Called once when a run reaches a terminal state.
    fn run_finished(&self, _summary: &RunSummary) {}
}
