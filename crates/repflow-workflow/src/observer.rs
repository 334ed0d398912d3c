// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in observers for the stage middleware.

use repflow_core::types::{StageContext, StageOutcome};
use repflow_core::Observer;
use tracing::{debug, warn};

/// Observer that logs stage transitions through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn stage_started(&self, ctx: &StageContext) {
        debug!(
            conversation_id = ctx.conversation_id.as_str(),
            run_id = ctx.run_id.as_str(),
            attempt = ctx.attempt,
            stage = %ctx.stage,
            "stage started"
        );
    }

    fn stage_finished(&self, ctx: &StageContext, outcome: &StageOutcome) {
        match outcome {
            StageOutcome::Completed => debug!(
                conversation_id = ctx.conversation_id.as_str(),
                run_id = ctx.run_id.as_str(),
                attempt = ctx.attempt,
                stage = %ctx.stage,
                "stage completed"
            ),
            StageOutcome::Failed(kind) => warn!(
                conversation_id = ctx.conversation_id.as_str(),
                run_id = ctx.run_id.as_str(),
                attempt = ctx.attempt,
                stage = %ctx.stage,
                kind = %kind,
                "stage failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use repflow_core::error::FailureKind;
    use repflow_core::types::WorkflowStage;

    use super::*;

    #[test]
    fn tracing_observer_accepts_both_outcomes() {
        let observer = TracingObserver;
        let ctx = StageContext {
            conversation_id: "conv-1".into(),
            run_id: "run-1".into(),
            attempt: 1,
            stage: WorkflowStage::Formulating,
        };
        observer.stage_started(&ctx);
        observer.stage_finished(&ctx, &StageOutcome::Completed);
        observer.stage_finished(&ctx, &StageOutcome::Failed(FailureKind::StageTimeout));
    }
}
