//! The execution callback contract.
//!
//! The scheduler hands each dispatched node to a caller-supplied
//! [`TaskExecutor`]. The engine does not look inside: it only awaits the
//! returned future, enforces the node's timeout around it, and records the
//! outcome.
//!
//! Timeouts and cancellation are cooperative. When a node times out the
//! scheduler marks it failed and cancels its [`ExecutionContext::cancel`]
//! token, but the spawned future keeps running unless the executor watches
//! that token or its deadline.

use crate::core::task::TaskNode;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Executor output: a JSON result or an error message.
pub type ExecutionResult = std::result::Result<serde_json::Value, String>;

/// Per-call context passed to the executor.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Cancelled when cancellation of this node is requested, on timeout,
    /// or when the run is aborted.
    pub cancel: CancellationToken,
    /// When the scheduler will give up waiting.
    pub deadline: Option<Instant>,
}

impl ExecutionContext {
    pub fn new(cancel: CancellationToken, deadline: Option<Instant>) -> Self {
        Self { cancel, deadline }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(CancellationToken::new(), None)
    }
}

/// Runs the body of a task.
///
/// Implemented for any `Fn(TaskNode, ExecutionContext) -> impl Future`, so
/// an async closure is usually enough:
///
/// ```
/// use dagflow::orchestration::{ExecutionContext, TaskExecutor};
/// use dagflow::core::TaskNode;
///
/// let executor = |task: TaskNode, _ctx: ExecutionContext| async move {
///     Ok::<_, String>(serde_json::json!({ "ran": task.name }))
/// };
/// let _ = executor.execute(TaskNode::new("a", "a"), ExecutionContext::default());
/// ```
pub trait TaskExecutor: Send + Sync + 'static {
    fn execute(&self, task: TaskNode, ctx: ExecutionContext) -> BoxFuture<'static, ExecutionResult>;
}

impl<F, Fut> TaskExecutor for F
where
    F: Fn(TaskNode, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ExecutionResult> + Send + 'static,
{
    fn execute(&self, task: TaskNode, ctx: ExecutionContext) -> BoxFuture<'static, ExecutionResult> {
        self(task, ctx).boxed()
    }
}

/// Succeeds immediately with `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutor;

impl TaskExecutor for NoopExecutor {
    fn execute(&self, _task: TaskNode, _ctx: ExecutionContext) -> BoxFuture<'static, ExecutionResult> {
        futures::future::ready(Ok(serde_json::Value::Null)).boxed()
    }
}
