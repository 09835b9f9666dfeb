//! Execution layer.
//!
//! This module provides the priority queue of ready nodes, the worker-pool
//! scheduler that drains it, the executor contract through which callers
//! supply task bodies, and the event bus that reports lifecycle changes.

mod events;
mod executor;
mod queue;
mod scheduler;

pub use events::{EngineEvent, EventBus, DEFAULT_SUBSCRIBER_CAPACITY};
pub use executor::{ExecutionContext, ExecutionResult, NoopExecutor, TaskExecutor};
pub use queue::{PriorityTaskQueue, ScheduledTask, DEFAULT_QUEUE_CAPACITY};
pub use scheduler::{
    FailurePolicy, RunSummary, Scheduler, SchedulerConfig, SchedulerStatus, DEFAULT_WORKERS,
};
