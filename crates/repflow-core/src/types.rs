// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Repflow workspace.
//!
//! Timestamps are ISO 8601 strings throughout; joins between records are
//! by id only, with no reverse pointers at the data level.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

/// Unique identifier for a workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter behind a component port.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Source,
    Storage,
    Observability,
}

// --- Conversation domain ---

/// Communication channel a conversation runs over.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Voice,
    Chat,
    Email,
}

/// Lifecycle status of a conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Completed,
    Escalated,
}

/// A customer-representative conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Opaque conversation identifier.
    pub id: String,
    /// Representative handling the conversation.
    pub rep_id: String,
    /// Optional customer identifier.
    pub customer_id: Option<String>,
    /// Channel the conversation runs over.
    pub channel: Channel,
    /// Lifecycle status.
    pub status: ConversationStatus,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
}

/// Role of a message author within a conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Customer,
    Representative,
    System,
}

/// A single message within a conversation. Append-only once persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Unique message identifier.
    pub id: String,
    /// Conversation this message belongs to.
    pub conversation_id: String,
    /// Author role.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// Monotonic sequence number within the conversation.
    pub seq: i64,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}

// --- Workflow run domain ---

/// Persisted state of a workflow run record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// The pipeline is still executing.
    InFlight,
    Succeeded,
    Failed,
    Aborted,
}

impl RunState {
    /// Whether this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::InFlight)
    }
}

/// The per-invocation record of a workflow pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Unique run identifier.
    pub run_id: String,
    /// Conversation the run belongs to.
    pub conversation_id: String,
    /// Current run state.
    pub state: RunState,
    /// Number of attempts sealed so far.
    pub attempt_count: u32,
    /// Final evaluation verdict, once known.
    pub verdict_passed: Option<bool>,
    /// Error kind for failed or aborted runs.
    pub error_kind: Option<crate::error::FailureKind>,
    /// ISO 8601 start timestamp.
    pub started_at: String,
    /// ISO 8601 completion timestamp, set on reaching a terminal state.
    pub completed_at: Option<String>,
}

/// Structured metadata extracted alongside an optimized query.
///
/// All fields are optional to consumers; missing keys read as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryMetadata {
    /// Key terms extracted from the conversation.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Named entities (accounts, products, issues).
    #[serde(default)]
    pub entities: Vec<String>,
    /// The customer's primary intent.
    #[serde(default)]
    pub intent: Option<String>,
}

/// Error kinds a source adapter can surface to the fan-out.
///
/// Absorbed by the fan-out and recorded per source; never a workflow failure.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    /// Credentials absent or rejected.
    Unauthorized,
    /// The adapter exceeded the fan-out deadline.
    Timeout,
    /// Transport-level failure reaching the source.
    Http,
    /// The source responded but its payload could not be parsed.
    Parse,
    /// The source is not configured or otherwise unavailable.
    Unavailable,
}

/// One search hit from a content source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResult {
    /// Source tag, e.g. "fidelity", "mygps", "index".
    pub source: String,
    /// Result title.
    pub title: String,
    /// Canonical URL; the dedup key within an attempt.
    pub url: String,
    /// Extracted text snippet, truncated to the configured byte budget.
    pub snippet: String,
    /// Relevance score in [0, 1].
    pub relevance: f64,
}

/// An inline citation in a resolution: a label and the URL it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub label: String,
    pub url: String,
}

/// Per-criterion evaluation scores, each an integer in [1, 5].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationScores {
    pub accuracy: u8,
    pub relevancy: u8,
    pub factual_grounding: u8,
    pub citation_quality: u8,
    pub clarity: u8,
}

impl EvaluationScores {
    /// The lowest score across all criteria.
    pub fn min(&self) -> u8 {
        [
            self.accuracy,
            self.relevancy,
            self.factual_grounding,
            self.citation_quality,
            self.clarity,
        ]
        .into_iter()
        .min()
        .unwrap_or(0)
    }

    /// (criterion name, score) pairs in a fixed order.
    pub fn entries(&self) -> [(&'static str, u8); 5] {
        [
            ("accuracy", self.accuracy),
            ("relevancy", self.relevancy),
            ("factual_grounding", self.factual_grounding),
            ("citation_quality", self.citation_quality),
            ("clarity", self.clarity),
        ]
    }
}

/// The evaluator's structured output for one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationVerdict {
    /// Per-criterion scores.
    pub scores: EvaluationScores,
    /// Result of the guardrail predicate checks.
    pub guardrails_passed: bool,
    /// Deficiency summary; empty when all criteria pass.
    pub feedback: String,
    /// Derived pass flag: guardrails AND min(scores) >= threshold.
    pub passed: bool,
}

/// One pass through formulate -> search -> generate -> evaluate within a run.
///
/// Created at the start of an iteration, sealed when the verdict (or the
/// attempt-level failure) is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAttempt {
    /// Run this attempt belongs to.
    pub run_id: String,
    /// 1-based attempt index.
    pub attempt_index: u32,
    /// The optimized search query.
    pub optimized_query: String,
    /// Structured query metadata.
    pub query_metadata: QueryMetadata,
    /// Merged, deduplicated source results.
    pub source_results: Vec<SourceResult>,
    /// Per-source error kinds recorded by the fan-out.
    pub source_errors: BTreeMap<String, SourceErrorKind>,
    /// Generated resolution text, once produced.
    pub resolution_text: Option<String>,
    /// Citations extracted from the resolution.
    pub citations: Vec<Citation>,
    /// Evaluation verdict, once recorded.
    pub verdict: Option<EvaluationVerdict>,
    /// Attempt-level failure kind, for attempts that failed before a verdict.
    pub failure: Option<crate::error::FailureKind>,
    /// ISO 8601 timestamp set when the attempt is sealed.
    pub sealed_at: Option<String>,
}

impl RunAttempt {
    /// Creates an empty attempt record for the given run and index.
    pub fn new(run_id: impl Into<String>, attempt_index: u32) -> Self {
        Self {
            run_id: run_id.into(),
            attempt_index,
            optimized_query: String::new(),
            query_metadata: QueryMetadata::default(),
            source_results: Vec::new(),
            source_errors: BTreeMap::new(),
            resolution_text: None,
            citations: Vec::new(),
            verdict: None,
            failure: None,
            sealed_at: None,
        }
    }
}

/// Feedback carried from one attempt into the next query formulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptFeedback {
    /// 1-based index of the attempt the feedback came from.
    pub attempt_index: u32,
    /// The query that attempt used.
    pub query: String,
    /// The evaluator's feedback text.
    pub feedback: String,
}

// --- Resolution domain ---

/// Review status of a promoted resolution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    PendingReview,
    Approved,
    Rejected,
    Edited,
}

/// Representative action on a resolution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
    Edit,
}

/// Terminal record of a representative's decision on a resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    /// The action taken.
    pub action: ApprovalAction,
    /// Representative who acted.
    pub rep_id: String,
    /// Optional free-text feedback.
    pub feedback: Option<String>,
    /// Replacement text when the action is `edit`.
    pub edited_text: Option<String>,
    /// ISO 8601 timestamp.
    pub recorded_at: String,
}

/// The sealed output of a successful attempt, promoted to rep review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    /// Unique resolution identifier.
    pub id: String,
    /// Conversation the resolution answers.
    pub conversation_id: String,
    /// Winning run.
    pub run_id: String,
    /// Winning attempt index within the run.
    pub attempt_index: u32,
    /// Customer-ready answer text with inline citations.
    pub resolution_text: String,
    /// Ordered citation list; every URL appears in the winning attempt's sources.
    pub citations: Vec<Citation>,
    /// Evaluation scores of the winning attempt.
    pub scores: EvaluationScores,
    /// Review status.
    pub status: ResolutionStatus,
    /// Approval record, once the representative acts.
    pub approval: Option<ApprovalRecord>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: Option<String>,
}

// --- Trigger detection ---

/// Outcome of scanning the transcript for an assistance request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerVerdict {
    /// Whether an activation phrase matched (or the caller forced the run).
    pub triggered: bool,
    /// The phrase that matched, if any.
    pub matched_phrase: Option<String>,
}

// --- Language model port types ---

/// Token accounting returned by a provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A completion request against the abstract language-model port.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Logical model tag; the provider maps it to a concrete model.
    pub model: String,
    /// Optional system prompt.
    pub system: Option<String>,
    /// User-turn prompt text.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

/// A completion response from the language-model port.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated text.
    pub text: String,
    /// Concrete model that served the request.
    pub model: String,
    /// Token accounting.
    pub usage: TokenUsage,
}

// --- Workflow events ---

/// Progress event kinds published at state boundaries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEventKind {
    WorkflowStarted,
    QueryOptimized,
    SearchComplete,
    ResolutionGenerated,
    EvaluationComplete,
    WorkflowComplete,
    WorkflowFailed,
    WorkflowAborted,
}

impl WorkflowEventKind {
    /// Whether this event ends the run's event stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowEventKind::WorkflowComplete
                | WorkflowEventKind::WorkflowFailed
                | WorkflowEventKind::WorkflowAborted
        )
    }
}

/// A typed progress event published to the event sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// Conversation the event belongs to.
    pub conversation_id: String,
    /// Run that emitted the event.
    pub run_id: String,
    /// Attempt index at emission time.
    pub attempt: u32,
    /// Event kind.
    pub kind: WorkflowEventKind,
    /// Structured payload; shape depends on the kind.
    pub payload: serde_json::Value,
    /// ISO 8601 emission timestamp.
    pub emitted_at: String,
}

// --- Workflow stages (for the observer middleware) ---

/// The pipeline stage being executed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowStage {
    Detecting,
    Formulating,
    Searching,
    Generating,
    Evaluating,
}

/// Context handed to observers around each stage invocation.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub conversation_id: String,
    pub run_id: String,
    pub attempt: u32,
    pub stage: WorkflowStage,
}

/// Outcome reported to observers when a stage finishes.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Completed,
    Failed(crate::error::FailureKind),
}

/// Terminal summary handed to observers when a run finishes.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub conversation_id: String,
    pub run_id: String,
    /// Terminal state the run reached.
    pub state: RunState,
    /// Error kind for failed or aborted runs.
    pub error_kind: Option<crate::error::FailureKind>,
    /// Number of sealed attempts.
    pub attempts: u32,
    /// Wall-clock duration from pipeline launch to the terminal state.
    pub duration: std::time::Duration,
}
