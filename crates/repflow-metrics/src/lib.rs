// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics adapter for the Repflow orchestrator.
//!
//! Uses the metrics-rs facade with the Prometheus exporter. Metrics are
//! rendered as Prometheus text format via the `render()` method, which is
//! exposed through the gateway's /metrics endpoint.

pub mod recording;

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use repflow_core::types::{
    AdapterType, EvaluationVerdict, HealthStatus, RunSummary, StageContext, WorkflowStage,
};
use repflow_core::{ComponentAdapter, Observer, RepflowError};

pub use recording::{
    record_events_dropped, record_evaluation_scores, record_llm_call, record_retry,
    record_run, record_source_error, set_runs_in_flight,
};

/// Prometheus metrics adapter.
///
/// Installs the Prometheus recorder and exposes a handle for rendering
/// metrics in Prometheus text format.
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Create a new PrometheusAdapter.
    ///
    /// Installs the Prometheus recorder globally. Only one recorder can be
    /// installed per process. Returns an error if a recorder is already
    /// installed.
    pub fn new() -> Result<Self, RepflowError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            RepflowError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();

        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Get a reference to the Prometheus handle for rendering.
    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl ComponentAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, RepflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RepflowError> {
        Ok(())
    }
}

/// Observer recording workflow metrics.
///
/// Attached to the engine alongside the tracing observer. Counts retries
/// via repeated stage starts and LLM-backed stage invocations by model
/// role; records per-criterion score histograms from recorded verdicts;
/// tracks the in-flight gauge and the terminal run counter/duration
/// histogram from the run lifecycle hooks.
#[derive(Debug, Default)]
pub struct MetricsObserver {
    in_flight: AtomicI64,
}

impl Observer for MetricsObserver {
    fn stage_started(&self, ctx: &StageContext) {
        match ctx.stage {
            WorkflowStage::Formulating => {
                if ctx.attempt > 1 {
                    recording::record_retry();
                }
                recording::record_llm_call("generator");
            }
            WorkflowStage::Generating => recording::record_llm_call("generator"),
            WorkflowStage::Evaluating => recording::record_llm_call("evaluator"),
            _ => {}
        }
    }

    fn verdict_recorded(&self, _ctx: &StageContext, verdict: &EvaluationVerdict) {
        recording::record_evaluation_scores(&verdict.scores);
    }

    fn run_started(&self, _conversation_id: &str, _run_id: &str) {
        let now = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        recording::set_runs_in_flight(now as f64);
    }

    fn run_finished(&self, summary: &RunSummary) {
        let now = (self.in_flight.fetch_sub(1, Ordering::Relaxed) - 1).max(0);
        recording::set_runs_in_flight(now as f64);
        recording::record_run(&summary.state.to_string(), summary.duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use repflow_core::types::{EvaluationScores, RunState};

    use super::*;

    #[test]
    fn metrics_observer_is_send_sync() {
        fn assert_observer<T: Observer>() {}
        assert_observer::<MetricsObserver>();
    }

    #[test]
    fn recording_helpers_accept_values_without_recorder() {
        // With no recorder installed these are no-ops; they must not panic.
        recording::record_run("succeeded", 1.25);
        recording::record_retry();
        recording::record_source_error("mygps", "unauthorized");
        recording::record_events_dropped(3);
        recording::record_llm_call("generator");
        recording::set_runs_in_flight(2.0);
        recording::record_evaluation_scores(&EvaluationScores {
            accuracy: 5,
            relevancy: 4,
            factual_grounding: 5,
            citation_quality: 4,
            clarity: 5,
        });
    }

    #[test]
    fn observer_tracks_run_lifecycle() {
        let observer = MetricsObserver::default();
        observer.run_started("conv-1", "run-1");
        observer.run_started("conv-2", "run-2");
        assert_eq!(observer.in_flight.load(Ordering::Relaxed), 2);

        let ctx = StageContext {
            conversation_id: "conv-1".into(),
            run_id: "run-1".into(),
            attempt: 1,
            stage: WorkflowStage::Evaluating,
        };
        observer.verdict_recorded(
            &ctx,
            &EvaluationVerdict {
                scores: EvaluationScores {
                    accuracy: 5,
                    relevancy: 5,
                    factual_grounding: 4,
                    citation_quality: 4,
                    clarity: 5,
                },
                guardrails_passed: true,
                feedback: String::new(),
                passed: true,
            },
        );

        observer.run_finished(&RunSummary {
            conversation_id: "conv-1".into(),
            run_id: "run-1".into(),
            state: RunState::Succeeded,
            error_kind: None,
            attempts: 1,
            duration: std::time::Duration::from_millis(1500),
        });
        assert_eq!(observer.in_flight.load(Ordering::Relaxed), 1);
    }
}
