// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end workflow testing.
//!
//! `TestHarness` assembles a complete engine stack with mock adapters and
//! a temp SQLite database, and exposes helpers to seed conversations,
//! start runs, await terminal states, and capture the event stream.

use std::sync::Arc;
use std::time::Duration;

use repflow_config::model::StorageConfig;
use repflow_core::types::{
    Channel, Conversation, ConversationMessage, ConversationStatus, MessageRole,
    WorkflowEvent, WorkflowRun,
};
use repflow_core::{EventSink, RepflowError, SourceAdapter, StoragePort};
use repflow_sources::SourceFanOut;
use repflow_storage::SqliteStorage;
use repflow_workflow::engine::{EngineConfig, RunReceipt, RunRequest};
use repflow_workflow::{EventBroadcaster, WorkflowEngine};
use tokio::sync::broadcast;

use crate::mock_provider::{MockProvider, MockReply};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    replies: Vec<MockReply>,
    sources: Vec<Arc<dyn SourceAdapter>>,
    max_attempts: u32,
    eval_min_score: u8,
    search_deadline: Duration,
    trigger_phrases: Vec<String>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            replies: Vec::new(),
            sources: Vec::new(),
            max_attempts: 3,
            eval_min_score: 3,
            search_deadline: Duration::from_secs(5),
            trigger_phrases: vec![
                "let me take a look".to_string(),
                "let me check".to_string(),
                "i'll look into".to_string(),
                "checking that for you".to_string(),
            ],
        }
    }

    /// Pre-load the mock provider's reply queue.
    pub fn with_provider_replies(mut self, replies: Vec<MockReply>) -> Self {
        self.replies = replies;
        self
    }

    /// Register a source adapter (preference order follows call order).
    pub fn with_source(mut self, source: Arc<dyn SourceAdapter>) -> Self {
        self.sources.push(source);
        self
    }

    /// Override the attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Override the evaluation pass threshold.
    pub fn with_eval_min_score(mut self, min_score: u8) -> Self {
        self.eval_min_score = min_score;
        self
    }

    /// Override the search fan-out deadline.
    pub fn with_search_deadline(mut self, deadline: Duration) -> Self {
        self.search_deadline = deadline;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, RepflowError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| RepflowError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("harness.db");

        let storage = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        }));
        storage.initialize().await?;

        let provider = Arc::new(MockProvider::with_replies(self.replies));

        let mut fanout = SourceFanOut::new();
        for source in self.sources {
            fanout.register(source);
        }

        let events = Arc::new(EventBroadcaster::default());

        let config = EngineConfig {
            max_attempts: self.max_attempts,
            eval_min_score: self.eval_min_score,
            require_grounding: true,
            max_tokens: 1024,
            overall_deadline: Duration::from_secs(30),
            query_deadline: Duration::from_secs(5),
            search_deadline: self.search_deadline,
            generate_deadline: Duration::from_secs(5),
            evaluate_deadline: Duration::from_secs(5),
            search_top_k: 5,
            snippet_byte_budget: 2048,
            trigger_phrases: self.trigger_phrases,
        };

        let engine = Arc::new(WorkflowEngine::new(
            provider.clone(),
            Arc::new(fanout),
            storage.clone() as Arc<dyn StoragePort>,
            events.clone() as Arc<dyn EventSink>,
            config,
        ));

        Ok(TestHarness {
            provider,
            storage,
            engine,
            events,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock adapters and temp storage.
pub struct TestHarness {
    /// The mock LLM provider.
    pub provider: Arc<MockProvider>,
    /// SQLite storage (temp DB, cleaned up on drop).
    pub storage: Arc<SqliteStorage>,
    /// The workflow engine under test.
    pub engine: Arc<WorkflowEngine>,
    /// The event broadcaster wired into the engine.
    pub events: Arc<EventBroadcaster>,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Creates an active conversation and returns its id.
    pub async fn create_conversation(&self) -> Result<String, RepflowError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.storage
            .create_conversation(&Conversation {
                id: id.clone(),
                rep_id: "rep-1".to_string(),
                customer_id: Some("cust-1".to_string()),
                channel: Channel::Chat,
                status: ConversationStatus::Active,
                created_at: now.clone(),
                updated_at: now,
            })
            .await?;
        Ok(id)
    }

    /// Appends a message to a conversation.
    pub async fn add_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ConversationMessage, RepflowError> {
        self.storage
            .append_message(conversation_id, role, content)
            .await
    }

    /// Subscribes to a conversation's event stream. Subscribe before
    /// starting the run to observe the full sequence.
    pub fn subscribe(&self, conversation_id: &str) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe(conversation_id)
    }

    /// Starts a run on the conversation.
    pub async fn start_run(
        &self,
        conversation_id: &str,
        force: bool,
    ) -> Result<RunReceipt, RepflowError> {
        self.engine
            .clone()
            .start_run(RunRequest {
                conversation_id: conversation_id.to_string(),
                rep_id: "rep-1".to_string(),
                force,
            })
            .await
    }

    /// Polls storage until the run reaches a terminal state.
    pub async fn wait_for_terminal(&self, run_id: &str) -> WorkflowRun {
        for _ in 0..500 {
            if let Ok(Some(run)) = self.storage.get_run(run_id).await
                && run.state.is_terminal()
            {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {run_id} did not reach a terminal state in time");
    }

    /// Drains every event currently buffered for a receiver.
    pub fn drain_events(
        receiver: &mut broadcast::Receiver<WorkflowEvent>,
    ) -> Vec<WorkflowEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use crate::mock_provider::{eval_reply, query_reply, resolution_reply};
    use crate::mock_source::{source_result, MockSource};

    use super::*;

    #[tokio::test]
    async fn builder_creates_working_environment() {
        let harness = TestHarness::builder().build().await.unwrap();
        let id = harness.create_conversation().await.unwrap();
        let conversation = harness.storage.get_conversation(&id).await.unwrap();
        assert!(conversation.is_some());
    }

    #[tokio::test]
    async fn full_run_through_harness() {
        let url = "https://www.fidelity.com/help/reset";
        let harness = TestHarness::builder()
            .with_provider_replies(vec![
                query_reply("401k password reset"),
                resolution_reply(&[url]),
                eval_reply(5, ""),
            ])
            .with_source(MockSource::ok(
                "fidelity",
                vec![source_result("fidelity", url, 0.9)],
            ))
            .build()
            .await
            .unwrap();

        let conversation_id = harness.create_conversation().await.unwrap();
        harness
            .add_message(&conversation_id, MessageRole::Customer, "I need help")
            .await
            .unwrap();
        harness
            .add_message(
                &conversation_id,
                MessageRole::Representative,
                "Let me check that for you",
            )
            .await
            .unwrap();

        let receipt = harness.start_run(&conversation_id, false).await.unwrap();
        let run = harness.wait_for_terminal(&receipt.run_id).await;
        assert_eq!(run.state, repflow_core::types::RunState::Succeeded);
    }
}
