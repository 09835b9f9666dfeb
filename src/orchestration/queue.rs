//! Bounded, thread-safe priority queue of runnable tasks.
//!
//! Entries are ordered by priority (highest first), then by enqueue
//! sequence (oldest first), so equal priorities dispatch FIFO.

use crate::core::task::TaskId;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard};
use tracing::trace;

/// Default maximum number of queued entries.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// A queued reference to a runnable task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub task_id: TaskId,
    pub priority: i64,
    /// Monotonic insertion counter; breaks priority ties.
    pub sequence: u64,
    pub enqueued_at: DateTime<Utc>,
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for ScheduledTask {}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<ScheduledTask>,
    next_sequence: u64,
}

pub struct PriorityTaskQueue {
    state: Mutex<QueueState>,
    capacity: usize,
}

impl PriorityTaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            capacity,
        }
    }

    // Heap operations never leave partial state; poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a task.
    ///
    /// # Errors
    /// [`Error::QueueFull`] when the queue already holds `capacity` entries.
    pub fn enqueue(&self, task_id: TaskId, priority: i64) -> Result<()> {
        let mut state = self.lock();
        if state.heap.len() >= self.capacity {
            return Err(Error::QueueFull {
                capacity: self.capacity,
            });
        }
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        trace!(task = %task_id, priority, sequence, "task enqueued");
        state.heap.push(ScheduledTask {
            task_id,
            priority,
            sequence,
            enqueued_at: Utc::now(),
        });
        Ok(())
    }

    /// Remove and return the highest-priority entry without blocking.
    pub fn dequeue(&self) -> Option<ScheduledTask> {
        self.lock().heap.pop()
    }

    pub fn peek(&self) -> Option<TaskId> {
        self.lock().heap.peek().map(|t| t.task_id.clone())
    }

    /// Drop every entry for `task_id`, returning whether any existed.
    pub fn remove(&self, task_id: &TaskId) -> bool {
        let mut state = self.lock();
        let before = state.heap.len();
        state.heap.retain(|t| &t.task_id != task_id);
        state.heap.len() != before
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.lock().heap.iter().any(|t| &t.task_id == task_id)
    }

    pub fn size(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.lock().heap.clear();
    }
}

impl Default for PriorityTaskQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl std::fmt::Debug for PriorityTaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityTaskQueue")
            .field("size", &self.size())
            .field("capacity", &self.capacity)
            .finish()
    }
}
