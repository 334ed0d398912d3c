// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation event broadcasting with bounded buffers.
//!
//! Built on `tokio::sync::broadcast`: publishing never blocks, and a
//! subscriber that falls behind loses the oldest pending events
//! (newest-wins). Drops are observed on the subscriber side as `Lagged`
//! and counted through [`EventBroadcaster::note_dropped`].

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use repflow_core::types::WorkflowEvent;
use repflow_core::EventSink;
use tokio::sync::broadcast;
use tracing::trace;

/// Default per-conversation event buffer capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Broadcast-based event sink with one bounded channel per conversation.
pub struct EventBroadcaster {
    channels: DashMap<String, broadcast::Sender<WorkflowEvent>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBroadcaster {
    /// Creates a broadcaster with the given per-conversation capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Subscribes to a conversation's event stream, creating the channel
    /// on first use.
    pub fn subscribe(&self, conversation_id: &str) -> broadcast::Receiver<WorkflowEvent> {
        self.channels
            .entry(conversation_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Removes a conversation's channel once its last subscriber is gone.
    pub fn remove_if_idle(&self, conversation_id: &str) {
        self.channels
            .remove_if(conversation_id, |_, tx| tx.receiver_count() == 0);
    }

    /// Records `n` events dropped for a lagging subscriber.
    pub fn note_dropped(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::Relaxed);
    }

    /// Total events dropped across all conversations since construction.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of conversations with live channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl EventSink for EventBroadcaster {
    fn publish(&self, event: WorkflowEvent) {
        // No subscribers, no channel: events before the first subscriber
        // are intentionally not retained.
        if let Some(tx) = self.channels.get(&event.conversation_id) {
            trace!(
                conversation_id = event.conversation_id.as_str(),
                kind = %event.kind,
                "publishing workflow event"
            );
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use repflow_core::types::WorkflowEventKind;

    use super::*;

    fn event(conversation_id: &str, kind: WorkflowEventKind) -> WorkflowEvent {
        WorkflowEvent {
            conversation_id: conversation_id.to_string(),
            run_id: "run-1".to_string(),
            attempt: 1,
            kind,
            payload: serde_json::json!({}),
            emitted_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let broadcaster = EventBroadcaster::new(8);
        let mut rx = broadcaster.subscribe("conv-1");

        broadcaster.publish(event("conv-1", WorkflowEventKind::WorkflowStarted));
        broadcaster.publish(event("conv-1", WorkflowEventKind::QueryOptimized));

        assert_eq!(
            rx.recv().await.unwrap().kind,
            WorkflowEventKind::WorkflowStarted
        );
        assert_eq!(
            rx.recv().await.unwrap().kind,
            WorkflowEventKind::QueryOptimized
        );
    }

    #[tokio::test]
    async fn events_are_isolated_per_conversation() {
        let broadcaster = EventBroadcaster::new(8);
        let mut rx_a = broadcaster.subscribe("conv-a");
        let _rx_b = broadcaster.subscribe("conv-b");

        broadcaster.publish(event("conv-b", WorkflowEventKind::WorkflowStarted));
        broadcaster.publish(event("conv-a", WorkflowEventKind::WorkflowComplete));

        let received = rx_a.recv().await.unwrap();
        assert_eq!(received.conversation_id, "conv-a");
        assert_eq!(received.kind, WorkflowEventKind::WorkflowComplete);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let broadcaster = EventBroadcaster::new(8);
        // Must not panic or block.
        broadcaster.publish(event("conv-none", WorkflowEventKind::WorkflowStarted));
        assert_eq!(broadcaster.channel_count(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_loses_oldest_events() {
        let broadcaster = EventBroadcaster::new(2);
        let mut rx = broadcaster.subscribe("conv-lag");

        for _ in 0..5 {
            broadcaster.publish(event("conv-lag", WorkflowEventKind::SearchComplete));
        }
        broadcaster.publish(event("conv-lag", WorkflowEventKind::WorkflowComplete));

        // The receiver first observes the lag, then the newest events.
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => {
                broadcaster.note_dropped(n);
                assert!(n >= 1);
            }
            other => panic!("expected Lagged, got {other:?}"),
        }
        assert!(broadcaster.dropped_events() >= 1);

        // Newest events are still delivered.
        let mut kinds = Vec::new();
        while let Ok(e) = rx.try_recv() {
            kinds.push(e.kind);
        }
        assert_eq!(kinds.last(), Some(&WorkflowEventKind::WorkflowComplete));
    }

    #[tokio::test]
    async fn remove_if_idle_reaps_only_unsubscribed_channels() {
        let broadcaster = EventBroadcaster::new(8);
        let rx = broadcaster.subscribe("conv-live");

        broadcaster.remove_if_idle("conv-live");
        assert_eq!(broadcaster.channel_count(), 1, "live channel retained");

        drop(rx);
        broadcaster.remove_if_idle("conv-live");
        assert_eq!(broadcaster.channel_count(), 0);
    }
}
