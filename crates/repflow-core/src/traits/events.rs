// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event sink trait for streaming workflow progress.

use crate::types::WorkflowEvent;

/// Sink for typed workflow progress events.
///
/// Publishing is fire-and-forget and must never block workflow progress:
/// implementations buffer per conversation with bounded capacity and drop
/// the oldest pending events for subscribers that fall behind, counting
/// the drops. The transport behind the sink (WebSocket, queue) is external.
pub trait EventSink: Send + Sync {
    /// Publishes an event for its conversation. Non-blocking.
    fn publish(&self, event: WorkflowEvent);
}

/// A sink that discards every event. Useful for headless runs and tests
/// that do not assert on the event stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn publish(&self, _event: WorkflowEvent) {}
}
