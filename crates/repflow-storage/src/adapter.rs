// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StoragePort trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use repflow_config::model::StorageConfig;
use repflow_core::types::{
    AdapterType, ApprovalRecord, Conversation, ConversationMessage, ConversationStatus,
    HealthStatus, MessageRole, Resolution, RunAttempt, WorkflowRun,
};
use repflow_core::{ComponentAdapter, RepflowError, StoragePort};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage port.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily initialized on the first
/// call to [`StoragePort::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until `initialize` is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, RepflowError> {
        self.db.get().ok_or_else(|| RepflowError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl ComponentAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, RepflowError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), tokio_rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RepflowError> {
        if let Some(db) = self.db.get() {
            db.close().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StoragePort for SqliteStorage {
    async fn initialize(&self) -> Result<(), RepflowError> {
        let path = self.config.database_path.clone();
        let db = Database::open(&path).await?;
        self.db.set(db).map_err(|_| RepflowError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), RepflowError> {
        self.db()?.close().await
    }

    // --- Conversation operations ---

    async fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), RepflowError> {
        queries::conversations::create_conversation(self.db()?, conversation).await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, RepflowError> {
        queries::conversations::get_conversation(self.db()?, id).await
    }

    async fn update_conversation_status(
        &self,
        id: &str,
        status: ConversationStatus,
    ) -> Result<(), RepflowError> {
        queries::conversations::update_conversation_status(self.db()?, id, status).await
    }

    // --- Message operations ---

    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ConversationMessage, RepflowError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        queries::messages::append_message(self.db()?, &id, conversation_id, role, content, &now)
            .await
    }

    async fn get_messages(
        &self,
        conversation_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<ConversationMessage>, RepflowError> {
        queries::messages::get_messages(self.db()?, conversation_id, limit).await
    }

    // --- Run operations ---

    async fn save_run(&self, run: &WorkflowRun) -> Result<(), RepflowError> {
        queries::runs::save_run(self.db()?, run).await
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<WorkflowRun>, RepflowError> {
        queries::runs::get_run(self.db()?, run_id).await
    }

    async fn save_attempt(&self, attempt: &RunAttempt) -> Result<(), RepflowError> {
        queries::runs::save_attempt(self.db()?, attempt).await
    }

    async fn get_attempts(&self, run_id: &str) -> Result<Vec<RunAttempt>, RepflowError> {
        queries::runs::get_attempts(self.db()?, run_id).await
    }

    async fn mark_abandoned_runs_aborted(&self) -> Result<u64, RepflowError> {
        queries::runs::mark_abandoned_runs_aborted(self.db()?).await
    }

    // --- Resolution operations ---

    async fn save_resolution(&self, resolution: &Resolution) -> Result<(), RepflowError> {
        queries::resolutions::save_resolution(self.db()?, resolution).await
    }

    async fn get_resolution(&self, id: &str) -> Result<Option<Resolution>, RepflowError> {
        queries::resolutions::get_resolution(self.db()?, id).await
    }

    async fn list_resolutions(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Resolution>, RepflowError> {
        queries::resolutions::list_resolutions(self.db()?, conversation_id).await
    }

    async fn record_approval(
        &self,
        resolution_id: &str,
        approval: &ApprovalRecord,
    ) -> Result<(), RepflowError> {
        queries::resolutions::record_approval(self.db()?, resolution_id, approval).await
    }
}
