// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use repflow_core::types::EvaluationScores;

/// Register all Repflow metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "repflow_workflow_runs_total",
        "Workflow runs by terminal status"
    );
    describe_counter!("repflow_workflow_retries_total", "Workflow attempt retries");
    describe_counter!(
        "repflow_source_errors_total",
        "Source fan-out errors by source and kind"
    );
    describe_counter!(
        "repflow_events_dropped_total",
        "Workflow events dropped for lagging subscribers"
    );
    describe_counter!("repflow_llm_calls_total", "LLM calls by model tag");
    describe_gauge!("repflow_runs_in_flight", "Workflow runs currently in flight");
    describe_histogram!(
        "repflow_run_duration_seconds",
        "Workflow run duration in seconds"
    );
    describe_histogram!(
        "repflow_evaluation_scores",
        "Evaluation score distribution per criterion"
    );
}

/// Record a run reaching a terminal state.
pub fn record_run(status: &str, duration_seconds: f64) {
    metrics::counter!("repflow_workflow_runs_total", "status" => status.to_string())
        .increment(1);
    metrics::histogram!("repflow_run_duration_seconds", "status" => status.to_string())
        .record(duration_seconds);
}

/// Record a retry transition into another attempt.
pub fn record_retry() {
    metrics::counter!("repflow_workflow_retries_total").increment(1);
}

/// Record a per-source fan-out error.
pub fn record_source_error(source: &str, kind: &str) {
    metrics::counter!(
        "repflow_source_errors_total",
        "source" => source.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record events dropped for a lagging subscriber.
pub fn record_events_dropped(count: u64) {
    metrics::counter!("repflow_events_dropped_total").increment(count);
}

/// Record an LLM call against a logical model tag.
pub fn record_llm_call(model_tag: &str) {
    metrics::counter!("repflow_llm_calls_total", "model" => model_tag.to_string())
        .increment(1);
}

/// Set the number of runs currently in flight.
pub fn set_runs_in_flight(count: f64) {
    metrics::gauge!("repflow_runs_in_flight").set(count);
}

/// Record an attempt's evaluation scores.
pub fn record_evaluation_scores(scores: &EvaluationScores) {
    for (criterion, score) in scores.entries() {
        metrics::histogram!("repflow_evaluation_scores", "criterion" => criterion)
            .record(score as f64);
    }
}
