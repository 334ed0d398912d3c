// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation single-flight registry.
//!
//! Process-owned: created at engine construction, cleared at shutdown.
//! The guard is RAII so the entry is released on every exit path,
//! including panics and cancellation.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use repflow_core::RepflowError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The in-flight run entry for a conversation.
#[derive(Clone, Debug)]
struct InFlightRun {
    run_id: String,
    cancel: CancellationToken,
}

/// Registry enforcing at most one in-flight run per conversation.
#[derive(Clone, Default)]
pub struct SingleFlight {
    inner: Arc<DashMap<String, InFlightRun>>,
}

impl SingleFlight {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the conversation for `run_id`.
    ///
    /// The check and the insert are atomic with respect to concurrent
    /// callers; the loser gets [`RepflowError::RunInProgress`] without any
    /// state change.
    pub fn begin(
        &self,
        conversation_id: &str,
        run_id: &str,
    ) -> Result<RunGuard, RepflowError> {
        match self.inner.entry(conversation_id.to_string()) {
            Entry::Occupied(_) => Err(RepflowError::RunInProgress {
                conversation_id: conversation_id.to_string(),
            }),
            Entry::Vacant(vacant) => {
                let cancel = CancellationToken::new();
                vacant.insert(InFlightRun {
                    run_id: run_id.to_string(),
                    cancel: cancel.clone(),
                });
                debug!(conversation_id, run_id, "single-flight entry claimed");
                Ok(RunGuard {
                    map: Arc::clone(&self.inner),
                    conversation_id: conversation_id.to_string(),
                    cancel,
                })
            }
        }
    }

    /// Triggers cancellation of the conversation's in-flight run, if any.
    /// Returns whether a run was signalled. The entry itself is released
    /// by the guard when the run reaches its terminal state.
    pub fn cancel(&self, conversation_id: &str) -> bool {
        if let Some(entry) = self.inner.get(conversation_id) {
            entry.cancel.cancel();
            true
        } else {
            false
        }
    }

    /// Triggers cancellation of every in-flight run (process shutdown).
    /// Returns the number of runs signalled; entries are released by
    /// their guards as each run reaches its terminal state.
    pub fn cancel_all(&self) -> usize {
        let mut signalled = 0;
        for entry in self.inner.iter() {
            entry.cancel.cancel();
            signalled += 1;
        }
        signalled
    }

    /// The run id currently in flight for the conversation, if any.
    pub fn in_flight_run(&self, conversation_id: &str) -> Option<String> {
        self.inner.get(conversation_id).map(|e| e.run_id.clone())
    }

    /// Number of in-flight runs across all conversations.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no runs are in flight.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// RAII claim on a conversation's single-flight slot.
///
/// Dropping the guard releases the slot; this runs on normal completion,
/// early returns, cancellation, and unwinds alike.
#[derive(Debug)]
pub struct RunGuard {
    map: Arc<DashMap<String, InFlightRun>>,
    conversation_id: String,
    /// Cancellation signal for this run; checked at state boundaries.
    pub cancel: CancellationToken,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.map.remove(&self.conversation_id);
        debug!(
            conversation_id = self.conversation_id.as_str(),
            "single-flight entry released"
        );
    }
}
