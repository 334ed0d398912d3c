// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence port for conversations, runs, attempts, and resolutions.

use async_trait::async_trait;

use crate::error::RepflowError;
use crate::traits::adapter::ComponentAdapter;
use crate::types::{
    ApprovalRecord, Conversation, ConversationMessage, ConversationStatus, Resolution,
    RunAttempt, WorkflowRun,
};

/// Port to the persistence backend.
///
/// All save operations are idempotent by primary key: replaying a write
/// with identical inputs is a no-op at storage level. Each write is an
/// independent transaction; callers never hold locks across awaits.
#[async_trait]
pub trait StoragePort: ComponentAdapter {
    /// Initializes the backend (opens connections, runs migrations).
    async fn initialize(&self) -> Result<(), RepflowError>;

    /// Closes the backend, flushing pending writes.
    async fn close(&self) -> Result<(), RepflowError>;

    // --- Conversation operations ---

    async fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), RepflowError>;

    async fn get_conversation(
        &self,
        id: &str,
    ) -> Result<Option<Conversation>, RepflowError>;

    async fn update_conversation_status(
        &self,
        id: &str,
        status: ConversationStatus,
    ) -> Result<(), RepflowError>;

    // --- Message operations (append-only) ---

    /// Appends a message, assigning the next sequence number server-side.
    /// Returns the persisted message including its assigned `seq`.
    async fn append_message(
        &self,
        conversation_id: &str,
        role: crate::types::MessageRole,
        content: &str,
    ) -> Result<ConversationMessage, RepflowError>;

    async fn get_messages(
        &self,
        conversation_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<ConversationMessage>, RepflowError>;

    // --- Run operations ---

    /// Upserts a run record keyed by run id.
    async fn save_run(&self, run: &WorkflowRun) -> Result<(), RepflowError>;

    async fn get_run(&self, run_id: &str) -> Result<Option<WorkflowRun>, RepflowError>;

    /// Upserts an attempt record keyed by (run id, attempt index).
    async fn save_attempt(&self, attempt: &RunAttempt) -> Result<(), RepflowError>;

    async fn get_attempts(&self, run_id: &str) -> Result<Vec<RunAttempt>, RepflowError>;

    /// Startup-time sweep: marks every non-terminal run as aborted.
    /// Returns the number of runs swept.
    async fn mark_abandoned_runs_aborted(&self) -> Result<u64, RepflowError>;

    // --- Resolution operations ---

    /// Upserts a resolution keyed by resolution id.
    async fn save_resolution(&self, resolution: &Resolution) -> Result<(), RepflowError>;

    async fn get_resolution(&self, id: &str) -> Result<Option<Resolution>, RepflowError>;

    async fn list_resolutions(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Resolution>, RepflowError>;

    /// Records the representative's decision on a resolution. The record is
    /// terminal: a second approval on the same resolution is rejected with
    /// [`RepflowError::InvalidState`].
    async fn record_approval(
        &self,
        resolution_id: &str,
        approval: &ApprovalRecord,
    ) -> Result<(), RepflowError>;
}
