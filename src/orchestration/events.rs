//! Structured engine events and their fan-out.
//!
//! The engine never waits on subscribers: each subscriber owns a bounded
//! crossbeam channel and events are delivered with `try_send`. A full
//! subscriber misses the event; a dropped receiver is unsubscribed.

use crate::core::task::TaskId;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::trace;

/// Default per-subscriber buffer.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

/// Lifecycle events emitted by the scheduler and the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    NodeStarted {
        task_id: TaskId,
        at: DateTime<Utc>,
    },
    NodeCompleted {
        task_id: TaskId,
        at: DateTime<Utc>,
        duration: Duration,
        /// Completed without invoking the executor.
        skipped: bool,
    },
    NodeFailed {
        task_id: TaskId,
        at: DateTime<Utc>,
        duration: Duration,
        error: String,
    },
    /// A node will not run because an upstream node failed or was cancelled.
    NodeBlocked {
        task_id: TaskId,
        at: DateTime<Utc>,
        cause: TaskId,
    },
    NodeCancelled {
        task_id: TaskId,
        at: DateTime<Utc>,
    },
    GraphOptimized {
        graph: String,
        at: DateTime<Utc>,
        duration: Duration,
        changes: usize,
        nodes_before: usize,
        nodes_after: usize,
    },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::NodeStarted { .. } => "node_started",
            EngineEvent::NodeCompleted { .. } => "node_completed",
            EngineEvent::NodeFailed { .. } => "node_failed",
            EngineEvent::NodeBlocked { .. } => "node_blocked",
            EngineEvent::NodeCancelled { .. } => "node_cancelled",
            EngineEvent::GraphOptimized { .. } => "graph_optimized",
        }
    }

    /// The node this event concerns, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            EngineEvent::NodeStarted { task_id, .. }
            | EngineEvent::NodeCompleted { task_id, .. }
            | EngineEvent::NodeFailed { task_id, .. }
            | EngineEvent::NodeBlocked { task_id, .. }
            | EngineEvent::NodeCancelled { task_id, .. } => Some(task_id),
            EngineEvent::GraphOptimized { .. } => None,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            EngineEvent::NodeStarted { at, .. }
            | EngineEvent::NodeCompleted { at, .. }
            | EngineEvent::NodeFailed { at, .. }
            | EngineEvent::NodeBlocked { at, .. }
            | EngineEvent::NodeCancelled { at, .. }
            | EngineEvent::GraphOptimized { at, .. } => *at,
        }
    }
}

/// Cloneable handle to a shared subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<EngineEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.subscribe_with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    pub fn subscribe_with_capacity(&self, capacity: usize) -> Receiver<EngineEvent> {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    /// Deliver `event` to every subscriber with room for it.
    ///
    /// Returns how many subscribers received it.
    pub fn emit(&self, event: EngineEvent) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        let mut delivered = 0;
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                trace!(event = event.name(), "subscriber full, event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
