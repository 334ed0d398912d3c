// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The workflow engine: a bounded-retry state machine over the pipeline
//! trigger -> formulate -> search -> generate -> evaluate.
//!
//! The engine enforces single-flight per conversation, applies per-stage
//! and overall deadlines, writes through to persistence after every sealed
//! state, and publishes progress events at each state boundary. Within a
//! run, states advance strictly sequentially; the fan-out's internal
//! concurrency never leaks past the search stage.

use std::sync::Arc;
use std::time::Duration;

use repflow_config::RepflowConfig;
use repflow_core::error::FailureKind;
use repflow_core::types::{
    AttemptFeedback, ConversationMessage, ConversationStatus, EvaluationScores,
    EvaluationVerdict, Resolution, ResolutionStatus, RunAttempt, RunState, RunSummary,
    StageContext, StageOutcome, TriggerVerdict, WorkflowEvent, WorkflowEventKind,
    WorkflowRun, WorkflowStage,
};
use repflow_core::{EventSink, LlmProvider, Observer, RepflowError, StoragePort};
use repflow_sources::{FanOutConfig, SourceFanOut};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::evaluator;
use crate::query;
use crate::resolution;
use crate::singleflight::{RunGuard, SingleFlight};
use crate::trigger;

/// Engine tunables, distilled from the loaded configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum attempts per run.
    pub max_attempts: u32,
    /// Minimum per-criterion evaluation score for a pass.
    pub eval_min_score: u8,
    /// Whether generation requires at least one source result.
    pub require_grounding: bool,
    /// Maximum tokens per LLM completion.
    pub max_tokens: u32,
    /// Overall run deadline.
    pub overall_deadline: Duration,
    /// Query formulation stage deadline.
    pub query_deadline: Duration,
    /// Search fan-out deadline.
    pub search_deadline: Duration,
    /// Resolution generation stage deadline.
    pub generate_deadline: Duration,
    /// Evaluation stage deadline.
    pub evaluate_deadline: Duration,
    /// Per-source result cap.
    pub search_top_k: usize,
    /// Per-source snippet truncation budget.
    pub snippet_byte_budget: usize,
    /// Activation phrases for the trigger detector.
    pub trigger_phrases: Vec<String>,
}

impl EngineConfig {
    /// Builds engine tunables from the loaded configuration.
    pub fn from_config(config: &RepflowConfig) -> Self {
        Self {
            max_attempts: config.workflow.max_attempts,
            eval_min_score: config.workflow.eval_min_score,
            require_grounding: config.workflow.require_grounding,
            max_tokens: config.anthropic.max_tokens,
            overall_deadline: Duration::from_millis(config.workflow.overall_run_deadline_ms),
            query_deadline: Duration::from_millis(config.workflow.query_deadline_ms),
            search_deadline: Duration::from_millis(config.search.deadline_ms),
            generate_deadline: Duration::from_millis(config.workflow.generate_deadline_ms),
            evaluate_deadline: Duration::from_millis(config.workflow.evaluate_deadline_ms),
            search_top_k: config.search.top_k,
            snippet_byte_budget: config.search.snippet_byte_budget,
            trigger_phrases: config.trigger.phrases.clone(),
        }
    }
}

/// A request to start a workflow run on a conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    pub conversation_id: String,
    pub rep_id: String,
    #[serde(default)]
    pub force: bool,
}

/// Outcome of a run request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The pipeline was launched; progress streams as events.
    Started,
    /// No trigger phrase matched; nothing was launched.
    NotTriggered,
}

/// Receipt returned synchronously from a run request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReceipt {
    pub run_id: String,
    pub status: RunStatus,
}

/// Context carried through one run's pipeline.
struct PipelineContext {
    conversation_id: String,
    run_id: String,
    rep_id: String,
    forced: bool,
    matched_phrase: Option<String>,
    messages: Vec<ConversationMessage>,
    started_at: String,
}

/// One attempt's outcome, as seen by the retry loop.
enum AttemptOutcome {
    /// Verdict passed; the resolution is ready for promotion.
    Passed {
        verdict: EvaluationVerdict,
        resolution: Resolution,
    },
    /// Verdict recorded but below threshold.
    NotPassed {
        query: String,
        verdict: EvaluationVerdict,
    },
    /// The attempt failed before a verdict.
    Errored { kind: FailureKind },
}

/// Drives workflow runs for all conversations in the process.
pub struct WorkflowEngine {
    provider: Arc<dyn LlmProvider>,
    fanout: Arc<SourceFanOut>,
    storage: Arc<dyn StoragePort>,
    events: Arc<dyn EventSink>,
    observers: Vec<Arc<dyn Observer>>,
    flights: SingleFlight,
    config: EngineConfig,
}

impl WorkflowEngine {
    /// Creates an engine over the given ports.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        fanout: Arc<SourceFanOut>,
        storage: Arc<dyn StoragePort>,
        events: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            fanout,
            storage,
            events,
            observers: Vec::new(),
            flights: SingleFlight::new(),
            config,
        }
    }

    /// Attaches an observer wrapping every stage invocation.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    /// The engine's single-flight registry.
    pub fn flights(&self) -> &SingleFlight {
        &self.flights
    }

    /// Startup sweep: finalize runs left in flight by a previous process.
    pub async fn recover_abandoned(&self) -> Result<u64, RepflowError> {
        let swept = self.storage.mark_abandoned_runs_aborted().await?;
        if swept > 0 {
            warn!(swept, "marked abandoned in-flight runs aborted");
        }
        Ok(swept)
    }

    /// Requests cancellation of the conversation's in-flight run.
    ///
    /// The run transitions to aborted at its next state boundary; an
    /// in-flight model call is not interrupted mid-stream.
    pub fn cancel_run(&self, conversation_id: &str) -> bool {
        self.flights.cancel(conversation_id)
    }

    /// Requests cancellation of every in-flight run (graceful shutdown).
    ///
    /// Each run transitions to aborted at its next state boundary and
    /// releases its single-flight slot on the way out. Returns the number
    /// of runs signalled.
    pub fn cancel_all_runs(&self) -> usize {
        self.flights.cancel_all()
    }

    /// Handles a run request: validates the conversation, claims the
    /// single-flight slot, runs trigger detection synchronously, and when
    /// triggered launches the pipeline as a background task.
    pub async fn start_run(
        self: Arc<Self>,
        request: RunRequest,
    ) -> Result<RunReceipt, RepflowError> {
        let conversation = self
            .storage
            .get_conversation(&request.conversation_id)
            .await?
            .ok_or_else(|| RepflowError::ConversationNotFound {
                id: request.conversation_id.clone(),
            })?;

        if conversation.status != ConversationStatus::Active {
            return Err(RepflowError::InvalidState {
                message: format!(
                    "conversation {} is {}, runs require an active conversation",
                    conversation.id, conversation.status
                ),
            });
        }

        let messages = self
            .storage
            .get_messages(&request.conversation_id, None)
            .await?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let guard = self.flights.begin(&request.conversation_id, &run_id)?;

        // Detecting runs synchronously so the caller learns not_triggered
        // without waiting on the pipeline.
        let stage_ctx = StageContext {
            conversation_id: request.conversation_id.clone(),
            run_id: run_id.clone(),
            attempt: 0,
            stage: WorkflowStage::Detecting,
        };
        self.observe_start(&stage_ctx);
        let verdict = if request.force {
            TriggerVerdict {
                triggered: true,
                matched_phrase: None,
            }
        } else {
            trigger::detect_trigger(&messages, &self.config.trigger_phrases)
        };
        self.observe_finish(
            &stage_ctx,
            if verdict.triggered {
                StageOutcome::Completed
            } else {
                StageOutcome::Failed(FailureKind::NotTriggered)
            },
        );

        let started_at = chrono::Utc::now().to_rfc3339();

        if !verdict.triggered {
            info!(
                conversation_id = request.conversation_id.as_str(),
                run_id = run_id.as_str(),
                "no trigger phrase detected, aborting run"
            );
            let run = WorkflowRun {
                run_id: run_id.clone(),
                conversation_id: request.conversation_id.clone(),
                state: RunState::Aborted,
                attempt_count: 0,
                verdict_passed: None,
                error_kind: Some(FailureKind::NotTriggered),
                started_at: started_at.clone(),
                completed_at: Some(started_at),
            };
            self.storage.save_run(&run).await?;
            drop(guard);
            return Ok(RunReceipt {
                run_id,
                status: RunStatus::NotTriggered,
            });
        }

        let run = WorkflowRun {
            run_id: run_id.clone(),
            conversation_id: request.conversation_id.clone(),
            state: RunState::InFlight,
            attempt_count: 0,
            verdict_passed: None,
            error_kind: None,
            started_at: started_at.clone(),
            completed_at: None,
        };
        self.storage.save_run(&run).await?;

        info!(
            conversation_id = request.conversation_id.as_str(),
            run_id = run_id.as_str(),
            forced = request.force,
            "workflow run started"
        );
        self.observe_run_started(&request.conversation_id, &run_id);

        let ctx = PipelineContext {
            conversation_id: request.conversation_id,
            run_id: run_id.clone(),
            rep_id: request.rep_id,
            forced: request.force,
            matched_phrase: verdict.matched_phrase,
            messages,
            started_at,
        };
        let engine = Arc::clone(&self);
        tokio::spawn(async move {
            engine.run_pipeline(ctx, guard).await;
        });

        Ok(RunReceipt {
            run_id,
            status: RunStatus::Started,
        })
    }

    /// Executes the retry loop to a terminal state. Owns the single-flight
    /// guard for the duration; dropping it on any exit path (including a
    /// panic inside a stage) releases the conversation.
    async fn run_pipeline(&self, ctx: PipelineContext, guard: RunGuard) {
        let cancel = guard.cancel.clone();
        let launched_at = Instant::now();
        let overall_deadline = launched_at + self.config.overall_deadline;

        self.emit(
            &ctx,
            1,
            WorkflowEventKind::WorkflowStarted,
            serde_json::json!({
                "rep_id": ctx.rep_id,
                "forced": ctx.forced,
                "matched_phrase": ctx.matched_phrase,
            }),
        );

        let mut feedback_history: Vec<AttemptFeedback> = Vec::new();
        let mut attempt_index: u32 = 1;
        let mut sealed_attempts: u32 = 0;
        let mut last_verdict: Option<EvaluationVerdict> = None;
        let mut resolution_id: Option<String> = None;

        let (state, error_kind) = loop {
            if cancel.is_cancelled() {
                break (RunState::Aborted, Some(FailureKind::Cancelled));
            }
            if Instant::now() >= overall_deadline {
                warn!(
                    run_id = ctx.run_id.as_str(),
                    "overall run deadline exceeded"
                );
                break (RunState::Failed, Some(FailureKind::StageTimeout));
            }

            let outcome = self
                .execute_attempt(&ctx, attempt_index, &feedback_history, &cancel)
                .await;

            match outcome {
                Ok(AttemptOutcome::Passed {
                    verdict,
                    resolution,
                }) => {
                    sealed_attempts = attempt_index;
                    last_verdict = Some(verdict);
                    match self.storage.save_resolution(&resolution).await {
                        Ok(()) => {
                            resolution_id = Some(resolution.id.clone());
                            break (RunState::Succeeded, None);
                        }
                        Err(e) => {
                            error!(error = %e, "failed to persist resolution");
                            break (RunState::Failed, Some(FailureKind::PersistenceError));
                        }
                    }
                }
                Ok(AttemptOutcome::NotPassed { query, verdict }) => {
                    sealed_attempts = attempt_index;
                    let feedback = verdict.feedback.clone();
                    last_verdict = Some(verdict);
                    if attempt_index < self.config.max_attempts {
                        feedback_history.push(AttemptFeedback {
                            attempt_index,
                            query,
                            feedback,
                        });
                        attempt_index += 1;
                        continue;
                    }
                    break (RunState::Failed, None);
                }
                Ok(AttemptOutcome::Errored { kind }) => {
                    sealed_attempts = attempt_index;
                    if kind == FailureKind::Cancelled {
                        break (RunState::Aborted, Some(kind));
                    }
                    if kind.is_retryable() && attempt_index < self.config.max_attempts {
                        attempt_index += 1;
                        continue;
                    }
                    break (RunState::Failed, Some(kind));
                }
                Err(e) => {
                    error!(error = %e, run_id = ctx.run_id.as_str(), "attempt persistence failed");
                    break (RunState::Failed, Some(FailureKind::PersistenceError));
                }
            }
        };

        let completed_at = chrono::Utc::now().to_rfc3339();
        let run = WorkflowRun {
            run_id: ctx.run_id.clone(),
            conversation_id: ctx.conversation_id.clone(),
            state,
            attempt_count: sealed_attempts,
            verdict_passed: last_verdict.as_ref().map(|v| v.passed),
            error_kind,
            started_at: ctx.started_at.clone(),
            completed_at: Some(completed_at),
        };
        if let Err(e) = self.storage.save_run(&run).await {
            // The startup sweep finalizes the record if this write is lost.
            error!(error = %e, run_id = ctx.run_id.as_str(), "failed to persist terminal run state");
        }

        match state {
            RunState::Succeeded => {
                info!(
                    run_id = ctx.run_id.as_str(),
                    attempts = sealed_attempts,
                    "workflow run succeeded"
                );
                self.emit(
                    &ctx,
                    sealed_attempts,
                    WorkflowEventKind::WorkflowComplete,
                    serde_json::json!({
                        "resolution_id": resolution_id,
                        "attempts": sealed_attempts,
                    }),
                );
            }
            RunState::Failed => {
                warn!(
                    run_id = ctx.run_id.as_str(),
                    attempts = sealed_attempts,
                    error_kind = error_kind.map(|k| k.to_string()),
                    "workflow run failed"
                );
                self.emit(
                    &ctx,
                    sealed_attempts.max(1),
                    WorkflowEventKind::WorkflowFailed,
                    serde_json::json!({
                        "error_kind": error_kind.map(|k| k.to_string()),
                        "attempts": sealed_attempts,
                        "verdict": last_verdict,
                    }),
                );
            }
            RunState::Aborted => {
                info!(run_id = ctx.run_id.as_str(), "workflow run aborted");
                self.emit(
                    &ctx,
                    sealed_attempts.max(1),
                    WorkflowEventKind::WorkflowAborted,
                    serde_json::json!({ "reason": "cancelled" }),
                );
            }
            RunState::InFlight => unreachable!("loop always breaks with a terminal state"),
        }

        self.observe_run_finished(&RunSummary {
            conversation_id: ctx.conversation_id.clone(),
            run_id: ctx.run_id.clone(),
            state,
            error_kind,
            attempts: sealed_attempts,
            duration: launched_at.elapsed(),
        });
        // `guard` drops here, releasing the single-flight slot.
    }

    /// Runs one pass through formulate -> search -> generate -> evaluate.
    ///
    /// Returns `Err` only for persistence failures; every stage failure is
    /// absorbed into an [`AttemptOutcome::Errored`] with its failure kind,
    /// after sealing and persisting the attempt record.
    async fn execute_attempt(
        &self,
        ctx: &PipelineContext,
        attempt_index: u32,
        feedback: &[AttemptFeedback],
        cancel: &CancellationToken,
    ) -> Result<AttemptOutcome, RepflowError> {
        let mut attempt = RunAttempt::new(&ctx.run_id, attempt_index);

        // --- Formulating ---
        let stage_ctx = self.stage_ctx(ctx, attempt_index, WorkflowStage::Formulating);
        self.observe_start(&stage_ctx);
        let plan = match timeout(
            self.config.query_deadline,
            query::formulate_query(
                self.provider.as_ref(),
                &ctx.messages,
                feedback,
                self.config.max_tokens,
            ),
        )
        .await
        {
            Ok(Ok(plan)) => {
                self.observe_finish(&stage_ctx, StageOutcome::Completed);
                plan
            }
            Ok(Err(e)) => {
                warn!(error = %e, "query formulation failed");
                return self
                    .fail_attempt(attempt, FailureKind::ModelUnavailable, &stage_ctx)
                    .await;
            }
            Err(_) => {
                return self
                    .fail_attempt(attempt, FailureKind::StageTimeout, &stage_ctx)
                    .await;
            }
        };

        attempt.optimized_query = plan.optimized_query.clone();
        attempt.query_metadata = plan.metadata;
        self.storage.save_attempt(&attempt).await?;
        self.emit(
            ctx,
            attempt_index,
            WorkflowEventKind::QueryOptimized,
            serde_json::json!({
                "query": attempt.optimized_query,
                "intent": attempt.query_metadata.intent,
            }),
        );

        if cancel.is_cancelled() {
            return self
                .seal_attempt_failure(attempt, FailureKind::Cancelled)
                .await;
        }

        // --- Searching (absorbs per-source failures, never fails) ---
        let stage_ctx = self.stage_ctx(ctx, attempt_index, WorkflowStage::Searching);
        self.observe_start(&stage_ctx);
        let outcome = self
            .fanout
            .search(
                &attempt.optimized_query,
                &FanOutConfig {
                    top_k: self.config.search_top_k,
                    deadline: self.config.search_deadline,
                    snippet_byte_budget: self.config.snippet_byte_budget,
                },
            )
            .await;
        self.observe_finish(&stage_ctx, StageOutcome::Completed);

        attempt.source_results = outcome.results;
        attempt.source_errors = outcome.errors;
        self.storage.save_attempt(&attempt).await?;
        self.emit(
            ctx,
            attempt_index,
            WorkflowEventKind::SearchComplete,
            serde_json::json!({
                "result_count": attempt.source_results.len(),
                "source_errors": attempt.source_errors,
            }),
        );

        if cancel.is_cancelled() {
            return self
                .seal_attempt_failure(attempt, FailureKind::Cancelled)
                .await;
        }

        // --- Generating ---
        let stage_ctx = self.stage_ctx(ctx, attempt_index, WorkflowStage::Generating);
        self.observe_start(&stage_ctx);
        match timeout(
            self.config.generate_deadline,
            resolution::generate_resolution(
                self.provider.as_ref(),
                &attempt.optimized_query,
                &attempt.source_results,
                feedback,
                self.config.require_grounding,
                self.config.max_tokens,
            ),
        )
        .await
        {
            Ok(Ok(generated)) => {
                self.observe_finish(&stage_ctx, StageOutcome::Completed);
                attempt.resolution_text = Some(generated.text);
                attempt.citations = generated.citations;
            }
            Ok(Err(e)) => {
                let kind = e.failure_kind();
                warn!(error = %e, kind = %kind, "resolution generation failed");
                return self.fail_attempt(attempt, kind, &stage_ctx).await;
            }
            Err(_) => {
                return self
                    .fail_attempt(attempt, FailureKind::StageTimeout, &stage_ctx)
                    .await;
            }
        }

        self.storage.save_attempt(&attempt).await?;
        self.emit(
            ctx,
            attempt_index,
            WorkflowEventKind::ResolutionGenerated,
            serde_json::json!({
                "citation_count": attempt.citations.len(),
                "chars": attempt.resolution_text.as_deref().map(str::len),
            }),
        );

        if cancel.is_cancelled() {
            return self
                .seal_attempt_failure(attempt, FailureKind::Cancelled)
                .await;
        }

        // --- Evaluating ---
        let stage_ctx = self.stage_ctx(ctx, attempt_index, WorkflowStage::Evaluating);
        self.observe_start(&stage_ctx);
        let resolution_text = attempt.resolution_text.clone().unwrap_or_default();
        let verdict = match timeout(
            self.config.evaluate_deadline,
            evaluator::evaluate(
                self.provider.as_ref(),
                &attempt.optimized_query,
                &resolution_text,
                &attempt.source_results,
                self.config.eval_min_score,
                self.config.max_tokens,
            ),
        )
        .await
        {
            Ok(Ok(verdict)) => {
                self.observe_finish(&stage_ctx, StageOutcome::Completed);
                verdict
            }
            Ok(Err(e)) => {
                // Record a degenerate failed verdict so the attempt carries
                // the evaluator outage, then retry per policy.
                warn!(error = %e, "evaluator unavailable");
                attempt.verdict = Some(EvaluationVerdict {
                    scores: EvaluationScores {
                        accuracy: 1,
                        relevancy: 1,
                        factual_grounding: 1,
                        citation_quality: 1,
                        clarity: 1,
                    },
                    guardrails_passed: false,
                    feedback: "evaluator_unavailable".to_string(),
                    passed: false,
                });
                return self
                    .fail_attempt(attempt, FailureKind::EvaluatorUnavailable, &stage_ctx)
                    .await;
            }
            Err(_) => {
                return self
                    .fail_attempt(attempt, FailureKind::StageTimeout, &stage_ctx)
                    .await;
            }
        };

        self.observe_verdict(&stage_ctx, &verdict);
        attempt.verdict = Some(verdict.clone());
        attempt.sealed_at = Some(chrono::Utc::now().to_rfc3339());
        self.storage.save_attempt(&attempt).await?;
        self.emit(
            ctx,
            attempt_index,
            WorkflowEventKind::EvaluationComplete,
            serde_json::json!({
                "passed": verdict.passed,
                "guardrails_passed": verdict.guardrails_passed,
                "scores": verdict.scores,
                "feedback": verdict.feedback,
            }),
        );

        if verdict.passed {
            let now = chrono::Utc::now().to_rfc3339();
            let resolution = Resolution {
                id: uuid::Uuid::new_v4().to_string(),
                conversation_id: ctx.conversation_id.clone(),
                run_id: ctx.run_id.clone(),
                attempt_index,
                resolution_text,
                citations: attempt.citations.clone(),
                scores: verdict.scores,
                status: ResolutionStatus::PendingReview,
                approval: None,
                created_at: now,
                updated_at: None,
            };
            Ok(AttemptOutcome::Passed {
                verdict,
                resolution,
            })
        } else {
            Ok(AttemptOutcome::NotPassed {
                query: attempt.optimized_query,
                verdict,
            })
        }
    }

    /// Seals and persists a failed attempt, reporting the failure to
    /// observers.
    async fn fail_attempt(
        &self,
        attempt: RunAttempt,
        kind: FailureKind,
        stage_ctx: &StageContext,
    ) -> Result<AttemptOutcome, RepflowError> {
        self.observe_finish(stage_ctx, StageOutcome::Failed(kind));
        self.seal_attempt_failure(attempt, kind).await
    }

    /// Seals and persists a failed attempt without an observer callback
    /// (used at cancellation boundaries, where no stage is running).
    async fn seal_attempt_failure(
        &self,
        mut attempt: RunAttempt,
        kind: FailureKind,
    ) -> Result<AttemptOutcome, RepflowError> {
        attempt.failure = Some(kind);
        attempt.sealed_at = Some(chrono::Utc::now().to_rfc3339());
        self.storage.save_attempt(&attempt).await?;
        Ok(AttemptOutcome::Errored { kind })
    }

    fn stage_ctx(
        &self,
        ctx: &PipelineContext,
        attempt: u32,
        stage: WorkflowStage,
    ) -> StageContext {
        StageContext {
            conversation_id: ctx.conversation_id.clone(),
            run_id: ctx.run_id.clone(),
            attempt,
            stage,
        }
    }

    fn observe_start(&self, ctx: &StageContext) {
        for observer in &self.observers {
            observer.stage_started(ctx);
        }
    }

    fn observe_finish(&self, ctx: &StageContext, outcome: StageOutcome) {
        for observer in &self.observers {
            observer.stage_finished(ctx, &outcome);
        }
    }

    fn observe_verdict(&self, ctx: &StageContext, verdict: &EvaluationVerdict) {
        for observer in &self.observers {
            observer.verdict_recorded(ctx, verdict);
        }
    }

    fn observe_run_started(&self, conversation_id: &str, run_id: &str) {
        for observer in &self.observers {
            observer.run_started(conversation_id, run_id);
        }
    }

    fn observe_run_finished(&self, summary: &RunSummary) {
        for observer in &self.observers {
            observer.run_finished(summary);
        }
    }

    fn emit(
        &self,
        ctx: &PipelineContext,
        attempt: u32,
        kind: WorkflowEventKind,
        payload: serde_json::Value,
    ) {
        self.events.publish(WorkflowEvent {
            conversation_id: ctx.conversation_id.clone(),
            run_id: ctx.run_id.clone(),
            attempt,
            kind,
            payload,
            emitted_at: chrono::Utc::now().to_rfc3339(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use repflow_config::model::StorageConfig;
    use repflow_core::types::{Channel, Conversation, MessageRole};
    use repflow_core::NullEventSink;
    use repflow_storage::SqliteStorage;

    use super::*;
    use crate::testutil::{help_result, StubProvider, StubSource};

    fn engine_config() -> EngineConfig {
        EngineConfig {
            max_attempts: 3,
            eval_min_score: 3,
            require_grounding: true,
            max_tokens: 512,
            overall_deadline: Duration::from_secs(30),
            query_deadline: Duration::from_secs(5),
            search_deadline: Duration::from_secs(5),
            generate_deadline: Duration::from_secs(5),
            evaluate_deadline: Duration::from_secs(5),
            search_top_k: 5,
            snippet_byte_budget: 2048,
            trigger_phrases: vec!["let me check".to_string()],
        }
    }

    async fn storage_with_conversation(
        dir: &tempfile::TempDir,
    ) -> Arc<SqliteStorage> {
        let db_path = dir.path().join("engine.db");
        let storage = SqliteStorage::new(StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        });
        storage.initialize().await.unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        storage
            .create_conversation(&Conversation {
                id: "conv-1".to_string(),
                rep_id: "rep-1".to_string(),
                customer_id: None,
                channel: Channel::Chat,
                status: ConversationStatus::Active,
                created_at: now.clone(),
                updated_at: now,
            })
            .await
            .unwrap();
        Arc::new(storage)
    }

    fn good_replies() -> Vec<Result<String, ()>> {
        vec![
            Ok(r#"{"optimized_query": "401k password reset", "keywords": ["401k"], "entities": [], "intent": "account access"}"#.to_string()),
            Ok(format!(
                "{} [Source: https://www.fidelity.com/help/reset]",
                "To reset your 401k password, open the login page and use the reset flow. \
                 You will verify your identity and receive a temporary code."
            )),
            Ok(r#"{"accuracy": 5, "relevancy": 5, "factual_grounding": 5, "citation_quality": 4, "clarity": 5, "feedback": ""}"#.to_string()),
        ]
    }

    async fn wait_for_terminal(storage: &SqliteStorage, run_id: &str) -> WorkflowRun {
        for _ in 0..200 {
            if let Some(run) = storage.get_run(run_id).await.unwrap()
                && run.state.is_terminal()
            {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {run_id} did not reach a terminal state");
    }

    fn engine(
        storage: Arc<SqliteStorage>,
        replies: Vec<Result<String, ()>>,
    ) -> Arc<WorkflowEngine> {
        let mut fanout = SourceFanOut::new();
        fanout.register(StubSource::ok(
            "fidelity",
            vec![help_result("https://www.fidelity.com/help/reset", 0.9)],
        ));
        Arc::new(WorkflowEngine::new(
            Arc::new(StubProvider::with_replies(replies)),
            Arc::new(fanout),
            storage,
            Arc::new(NullEventSink),
            engine_config(),
        ))
    }

    async fn seed_messages(storage: &SqliteStorage, rep_text: &str) {
        storage
            .append_message("conv-1", MessageRole::Customer, "How do I reset my 401k password?")
            .await
            .unwrap();
        storage
            .append_message("conv-1", MessageRole::Representative, rep_text)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn happy_path_reaches_succeeded_with_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_with_conversation(&dir).await;
        seed_messages(&storage, "Let me check that for you.").await;

        let engine = engine(Arc::clone(&storage), good_replies());
        let receipt = engine
            .clone()
            .start_run(RunRequest {
                conversation_id: "conv-1".into(),
                rep_id: "rep-1".into(),
                force: false,
            })
            .await
            .unwrap();
        assert_eq!(receipt.status, RunStatus::Started);

        let run = wait_for_terminal(&storage, &receipt.run_id).await;
        assert_eq!(run.state, RunState::Succeeded);
        assert_eq!(run.attempt_count, 1);
        assert_eq!(run.verdict_passed, Some(true));

        let resolutions = storage.list_resolutions("conv-1").await.unwrap();
        assert_eq!(resolutions.len(), 1);
        assert!(resolutions[0].resolution_text.contains("[Source:"));
        assert_eq!(resolutions[0].status, ResolutionStatus::PendingReview);

        // Slot released after the terminal state; the guard drops just
        // after the terminal record lands.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(engine.flights().is_empty());
    }

    #[tokio::test]
    async fn no_trigger_aborts_without_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_with_conversation(&dir).await;
        seed_messages(&storage, "Here is your answer.").await;

        let engine = engine(Arc::clone(&storage), vec![]);
        let receipt = engine
            .clone()
            .start_run(RunRequest {
                conversation_id: "conv-1".into(),
                rep_id: "rep-1".into(),
                force: false,
            })
            .await
            .unwrap();
        assert_eq!(receipt.status, RunStatus::NotTriggered);

        let run = storage.get_run(&receipt.run_id).await.unwrap().unwrap();
        assert_eq!(run.state, RunState::Aborted);
        assert_eq!(run.error_kind, Some(FailureKind::NotTriggered));
        assert!(storage.get_attempts(&receipt.run_id).await.unwrap().is_empty());
        assert!(engine.flights().is_empty());
    }

    #[tokio::test]
    async fn force_bypasses_trigger_detection() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_with_conversation(&dir).await;
        seed_messages(&storage, "Here is your answer.").await;

        let engine = engine(Arc::clone(&storage), good_replies());
        let receipt = engine
            .clone()
            .start_run(RunRequest {
                conversation_id: "conv-1".into(),
                rep_id: "rep-1".into(),
                force: true,
            })
            .await
            .unwrap();
        assert_eq!(receipt.status, RunStatus::Started);
        let run = wait_for_terminal(&storage, &receipt.run_id).await;
        assert_eq!(run.state, RunState::Succeeded);
    }

    #[tokio::test]
    async fn unknown_conversation_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_with_conversation(&dir).await;
        let engine = engine(storage, vec![]);

        let err = engine
            .clone()
            .start_run(RunRequest {
                conversation_id: "missing".into(),
                rep_id: "rep-1".into(),
                force: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepflowError::ConversationNotFound { .. }));
    }

    #[tokio::test]
    async fn completed_conversation_is_invalid_state() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_with_conversation(&dir).await;
        storage
            .update_conversation_status("conv-1", ConversationStatus::Completed)
            .await
            .unwrap();
        let engine = engine(storage, vec![]);

        let err = engine
            .clone()
            .start_run(RunRequest {
                conversation_id: "conv-1".into(),
                rep_id: "rep-1".into(),
                force: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepflowError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn retry_then_success_records_two_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_with_conversation(&dir).await;
        seed_messages(&storage, "Let me check that for you.").await;

        let resolution_text = format!(
            "{} [Source: https://www.fidelity.com/help/reset]",
            "To reset your 401k password, open the login page and use the reset flow. \
             You will verify your identity and receive a temporary code."
        );
        let replies = vec![
            // Attempt 1: low accuracy.
            Ok(r#"{"optimized_query": "401k reset", "keywords": [], "entities": [], "intent": "access"}"#.to_string()),
            Ok(resolution_text.clone()),
            Ok(r#"{"accuracy": 2, "relevancy": 5, "factual_grounding": 5, "citation_quality": 4, "clarity": 5, "feedback": "answer misses the query"}"#.to_string()),
            // Attempt 2: passes.
            Ok(r#"{"optimized_query": "401k password reset steps", "keywords": [], "entities": [], "intent": "access"}"#.to_string()),
            Ok(resolution_text),
            Ok(r#"{"accuracy": 5, "relevancy": 5, "factual_grounding": 5, "citation_quality": 5, "clarity": 5, "feedback": ""}"#.to_string()),
        ];
        let engine = engine(Arc::clone(&storage), replies);
        let receipt = engine
            .clone()
            .start_run(RunRequest {
                conversation_id: "conv-1".into(),
                rep_id: "rep-1".into(),
                force: false,
            })
            .await
            .unwrap();

        let run = wait_for_terminal(&storage, &receipt.run_id).await;
        assert_eq!(run.state, RunState::Succeeded);
        assert_eq!(run.attempt_count, 2);

        let attempts = storage.get_attempts(&receipt.run_id).await.unwrap();
        assert_eq!(attempts.len(), 2);
        assert!(!attempts[0].verdict.as_ref().unwrap().passed);
        assert!(attempts[1].verdict.as_ref().unwrap().passed);
        assert!(attempts.iter().all(|a| a.sealed_at.is_some()));
    }

    #[tokio::test]
    async fn retry_exhaustion_fails_without_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_with_conversation(&dir).await;
        seed_messages(&storage, "Let me check that for you.").await;

        let resolution_text = format!(
            "{} [Source: https://www.fidelity.com/help/reset]",
            "A long enough resolution that satisfies the guardrails but not the judge. \
             It explains the steps in plain language for the customer to follow."
        );
        let mut replies = Vec::new();
        for _ in 0..3 {
            replies.push(Ok(r#"{"optimized_query": "401k reset", "keywords": [], "entities": [], "intent": "access"}"#.to_string()));
            replies.push(Ok(resolution_text.clone()));
            replies.push(Ok(r#"{"accuracy": 5, "relevancy": 1, "factual_grounding": 5, "citation_quality": 5, "clarity": 5, "feedback": "irrelevant"}"#.to_string()));
        }
        let engine = engine(Arc::clone(&storage), replies);
        let receipt = engine
            .clone()
            .start_run(RunRequest {
                conversation_id: "conv-1".into(),
                rep_id: "rep-1".into(),
                force: false,
            })
            .await
            .unwrap();

        let run = wait_for_terminal(&storage, &receipt.run_id).await;
        assert_eq!(run.state, RunState::Failed);
        assert_eq!(run.attempt_count, 3);
        assert_eq!(run.verdict_passed, Some(false));

        let attempts = storage.get_attempts(&receipt.run_id).await.unwrap();
        assert_eq!(attempts.len(), 3);
        assert!(storage.list_resolutions("conv-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_request_rejected_while_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_with_conversation(&dir).await;
        seed_messages(&storage, "Let me check that for you.").await;

        let engine = engine(Arc::clone(&storage), good_replies());
        // Claim the slot directly to simulate an in-flight run.
        let _guard = engine.flights().begin("conv-1", "run-existing").unwrap();

        let err = engine
            .clone()
            .start_run(RunRequest {
                conversation_id: "conv-1".into(),
                rep_id: "rep-1".into(),
                force: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepflowError::RunInProgress { .. }));
    }
}
