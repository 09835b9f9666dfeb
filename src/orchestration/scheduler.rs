//! Scheduler for parallel task execution.
//!
//! The Scheduler owns the submitted graph behind a single async `RwLock`
//! and a [`PriorityTaskQueue`] of ready nodes. A fixed pool of worker tasks
//! pulls from the queue:
//!
//! 1. Under the graph lock, dequeue the next entry and mark it `Running`
//!    (skippable nodes complete here without an executor call)
//! 2. Release the lock and run the executor, wrapped in the node timeout
//! 3. Re-take the lock, record the outcome, and enqueue dependents that
//!    became ready
//!
//! Workers only hold task IDs across await points. No lock is held while an
//! executor runs. Lock order is always graph, then queue.

use crate::analysis::GraphValidator;
use crate::core::task::{meta, TaskId, TaskNode, TaskStatus};
use crate::core::TaskGraph;
use crate::error::{Error, Result};
use crate::orchestration::events::{EngineEvent, EventBus};
use crate::orchestration::executor::{ExecutionContext, ExecutionResult, TaskExecutor};
use crate::orchestration::queue::{PriorityTaskQueue, DEFAULT_QUEUE_CAPACITY};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 4;

/// What happens to dependents of a failed or cancelled node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Mark every transitive dependent `Blocked`.
    #[default]
    FailFast,
    /// Leave dependents `Pending` until resolved by hand.
    BestEffort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub failure_policy: FailurePolicy,
    /// Applied to nodes without their own timeout.
    pub default_timeout_secs: Option<f64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            failure_policy: FailurePolicy::FailFast,
            default_timeout_secs: None,
        }
    }
}

impl SchedulerConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(Duration::from_secs_f64)
    }
}

/// Snapshot of scheduler state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// Node count per status name.
    pub counts: BTreeMap<String, usize>,
    pub queue_depth: usize,
}

impl SchedulerStatus {
    pub fn count(&self, state: &str) -> usize {
        self.counts.get(state).copied().unwrap_or(0)
    }
}

/// Result of [`Scheduler::run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub graph_name: String,
    /// Executor output per completed node. Skipped nodes have no entry.
    pub outputs: BTreeMap<TaskId, serde_json::Value>,
    /// Error message per failed node.
    pub failures: BTreeMap<TaskId, String>,
    pub status: SchedulerStatus,
    pub elapsed: Duration,
}

impl RunSummary {
    /// True when every node completed.
    pub fn is_success(&self) -> bool {
        let total: usize = self.status.counts.values().sum();
        self.status.count("completed") == total
    }
}

enum Dispatch {
    Run(TaskNode),
    Idle,
    Done,
}

enum Outcome {
    Success(serde_json::Value),
    Failure(String),
}

struct Shared {
    config: SchedulerConfig,
    graph: RwLock<Option<TaskGraph>>,
    queue: PriorityTaskQueue,
    notify: Notify,
    events: EventBus,
    tokens: Mutex<HashMap<TaskId, CancellationToken>>,
    outputs: Mutex<BTreeMap<TaskId, serde_json::Value>>,
}

/// Drives execution of a submitted graph over a bounded worker pool.
///
/// Cheap to clone; clones share the same graph and queue, so one handle can
/// call [`cancel`](Self::cancel) or [`status`](Self::status) while another
/// is inside [`run`](Self::run).
///
/// # Example
///
/// ```ignore
/// let scheduler = Scheduler::new(SchedulerConfig::default());
/// scheduler.submit_graph(graph).await?;
/// let summary = scheduler.run(NoopExecutor).await?;
/// assert!(summary.is_success());
/// ```
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_events(config, EventBus::new())
    }

    pub fn with_events(config: SchedulerConfig, events: EventBus) -> Self {
        let queue = PriorityTaskQueue::new(config.queue_capacity);
        Self {
            shared: Arc::new(Shared {
                config,
                graph: RwLock::new(None),
                queue,
                notify: Notify::new(),
                events,
                tokens: Mutex::new(HashMap::new()),
                outputs: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    /// Replace the current graph and seed the queue with its ready nodes.
    ///
    /// `Ready` or `Running` nodes left over from an earlier run are reset to
    /// `Pending`. Returns the number of nodes enqueued.
    ///
    /// # Errors
    /// - [`Error::Validation`] if the graph has a cycle or dangling dependency
    /// - [`Error::QueueFull`] if the ready set exceeds queue capacity
    pub async fn submit_graph(&self, mut graph: TaskGraph) -> Result<usize> {
        let validator = GraphValidator::new();
        if !validator.quick_check(&graph) {
            return Err(Error::Validation(Box::new(validator.validate(&graph))));
        }

        for id in graph.task_ids() {
            if let Some(node) = graph.get_task_mut(&id) {
                if matches!(node.status, TaskStatus::Ready | TaskStatus::Running) {
                    node.status = TaskStatus::Pending;
                }
            }
        }

        let mut guard = self.shared.graph.write().await;
        self.shared.queue.clear();
        lock(&self.shared.outputs).clear();

        let mut seeded = 0;
        for id in graph.ready_tasks() {
            if let Err(e) = enqueue_ready(&mut graph, &self.shared.queue, &id) {
                self.shared.queue.clear();
                return Err(e);
            }
            seeded += 1;
        }
        info!(graph = %graph.name(), tasks = graph.task_count(), seeded, "graph submitted");
        *guard = Some(graph);
        Ok(seeded)
    }

    /// Execute the submitted graph to quiescence.
    ///
    /// Returns once no node is running and the queue is empty. Under
    /// best-effort policy, nodes downstream of a failure stay `Pending`.
    ///
    /// # Errors
    /// [`Error::QueueFull`] if completing a node releases more dependents
    /// than the queue can hold. The overflow stays `Pending` and is picked
    /// up by the next call.
    pub async fn run<E: TaskExecutor>(&self, executor: E) -> Result<RunSummary> {
        self.run_shared(Arc::new(executor)).await
    }

    pub async fn run_shared(&self, executor: Arc<dyn TaskExecutor>) -> Result<RunSummary> {
        {
            // Nodes released while the queue was full are still `Pending`
            // with every dependency completed; queue them for this run.
            let mut guard = self.shared.graph.write().await;
            let graph = guard.as_mut().ok_or(Error::NoGraph)?;
            let reseeded = seed_ready(graph, &self.shared.queue)?;
            if reseeded > 0 {
                debug!(reseeded, "ready tasks requeued");
            }
        }

        let started = Instant::now();
        let halt = CancellationToken::new();
        let workers = self.shared.config.workers.max(1);
        let mut set = JoinSet::new();
        for worker in 0..workers {
            set.spawn(worker_loop(
                Arc::clone(&self.shared),
                Arc::clone(&executor),
                halt.clone(),
                worker,
            ));
        }
        debug!(workers, "workers started");

        let mut first_error = None;
        while let Some(joined) = set.join_next().await {
            let result = joined.map_err(|e| Error::TaskJoin(e.to_string())).and_then(|r| r);
            if let Err(e) = result {
                warn!(error = %e, "worker stopped with error, halting run");
                if first_error.is_none() {
                    first_error = Some(e);
                }
                halt.cancel();
                self.shared.notify.notify_waiters();
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let guard = self.shared.graph.read().await;
        let graph = guard.as_ref().ok_or(Error::NoGraph)?;
        let failures = graph
            .tasks()
            .filter_map(|t| match &t.status {
                TaskStatus::Failed { error } => Some((t.id.clone(), error.clone())),
                _ => None,
            })
            .collect();
        let summary = RunSummary {
            graph_name: graph.name().to_string(),
            outputs: lock(&self.shared.outputs).clone(),
            failures,
            status: status_of(graph, &self.shared.queue),
            elapsed: started.elapsed(),
        };
        info!(
            graph = %summary.graph_name,
            completed = summary.status.count("completed"),
            failed = summary.failures.len(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "run finished"
        );
        Ok(summary)
    }

    /// Cancel a node that has not been dispatched.
    ///
    /// A `Pending` or `Ready` node becomes `Cancelled` and will never run.
    /// For a `Running` node the request is only recorded: the node is
    /// flagged with `meta::CANCEL_REQUESTED`, its context token is
    /// cancelled, and [`Error::InvalidTransition`] is returned.
    pub async fn cancel(&self, id: &TaskId) -> Result<()> {
        let mut guard = self.shared.graph.write().await;
        let graph = guard.as_mut().ok_or(Error::NoGraph)?;
        let node = graph
            .get_task_mut(id)
            .ok_or_else(|| Error::UnknownNode(id.clone()))?;

        let invalid = |from: &TaskStatus| Error::InvalidTransition {
            task_id: id.clone(),
            from: from.name().to_string(),
            to: TaskStatus::Cancelled.name().to_string(),
        };

        match node.status {
            TaskStatus::Pending | TaskStatus::Ready => {
                node.cancel();
                self.shared.queue.remove(id);
                self.shared.events.emit(EngineEvent::NodeCancelled {
                    task_id: id.clone(),
                    at: Utc::now(),
                });
                info!(task = %id, "task cancelled");
                if self.shared.config.failure_policy == FailurePolicy::FailFast {
                    block_dependents(graph, &self.shared, id, "cancelled");
                }
                drop(guard);
                self.shared.notify.notify_waiters();
                Ok(())
            }
            TaskStatus::Running => {
                node.set_meta(meta::CANCEL_REQUESTED, "true");
                if let Some(token) = lock(&self.shared.tokens).get(id) {
                    token.cancel();
                }
                debug!(task = %id, "cancellation requested for running task");
                Err(invalid(&TaskStatus::Running))
            }
            ref other => Err(invalid(other)),
        }
    }

    /// Node counts per state plus queue depth.
    pub async fn status(&self) -> SchedulerStatus {
        match self.shared.graph.read().await.as_ref() {
            Some(graph) => status_of(graph, &self.shared.queue),
            None => SchedulerStatus::default(),
        }
    }

    /// Copy of the current graph with live statuses.
    pub async fn graph(&self) -> Option<TaskGraph> {
        self.shared.graph.read().await.clone()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.shared.config)
            .field("queue", &self.shared.queue)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn status_of(graph: &TaskGraph, queue: &PriorityTaskQueue) -> SchedulerStatus {
    SchedulerStatus {
        counts: graph
            .status_counts()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        queue_depth: queue.size(),
    }
}

/// Mark `id` ready and queue it, reverting on capacity errors.
fn enqueue_ready(graph: &mut TaskGraph, queue: &PriorityTaskQueue, id: &TaskId) -> Result<()> {
    let node = graph
        .get_task_mut(id)
        .ok_or_else(|| Error::UnknownNode(id.clone()))?;
    node.mark_ready();
    if let Err(e) = queue.enqueue(id.clone(), node.dispatch_priority()) {
        node.status = TaskStatus::Pending;
        return Err(e);
    }
    Ok(())
}

/// Queue `Pending` nodes whose dependencies all completed, up to capacity.
///
/// Nodes that do not fit stay `Pending` and are picked up once the queue
/// drains. Returns how many were queued.
fn seed_ready(graph: &mut TaskGraph, queue: &PriorityTaskQueue) -> Result<usize> {
    let mut seeded = 0;
    for id in graph.ready_tasks() {
        match enqueue_ready(graph, queue, &id) {
            Ok(()) => seeded += 1,
            Err(Error::QueueFull { .. }) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(seeded)
}

/// Queue every dependent of `id` whose dependencies have all completed.
fn release_dependents(graph: &mut TaskGraph, queue: &PriorityTaskQueue, id: &TaskId) -> Result<()> {
    let dependents: Vec<TaskId> = graph
        .get_task(id)
        .map(|n| n.dependents.iter().cloned().collect())
        .unwrap_or_default();
    for dependent in dependents {
        let pending = graph
            .get_task(&dependent)
            .is_some_and(|n| n.status == TaskStatus::Pending);
        if pending && graph.dependencies_completed(&dependent) {
            enqueue_ready(graph, queue, &dependent)?;
        }
    }
    Ok(())
}

fn block_dependents(graph: &mut TaskGraph, shared: &Shared, cause: &TaskId, what: &str) {
    for dependent in graph.transitive_dependents(cause) {
        let Some(node) = graph.get_task_mut(&dependent) else {
            continue;
        };
        if node.is_finished() || node.status == TaskStatus::Running {
            continue;
        }
        node.block(&format!("dependency {} {}", cause, what));
        shared.queue.remove(&dependent);
        shared.events.emit(EngineEvent::NodeBlocked {
            task_id: dependent.clone(),
            at: Utc::now(),
            cause: cause.clone(),
        });
        debug!(task = %dependent, cause = %cause, "task blocked");
    }
}

async fn worker_loop(
    shared: Arc<Shared>,
    executor: Arc<dyn TaskExecutor>,
    halt: CancellationToken,
    worker: usize,
) -> Result<()> {
    loop {
        // Register for wakeups before looking at the queue so a
        // notification between the check and the wait is not lost.
        let notified = shared.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if halt.is_cancelled() {
            break;
        }

        match next_dispatch(&shared).await? {
            Dispatch::Run(node) => execute(&shared, &executor, &halt, node, worker).await?,
            Dispatch::Idle => notified.await,
            Dispatch::Done => break,
        }
    }
    Ok(())
}

/// Pop the next runnable node and mark it `Running`.
///
/// Stale entries (cancelled or blocked after enqueue) are discarded.
/// Skippable nodes complete on the spot and release their dependents.
async fn next_dispatch(shared: &Shared) -> Result<Dispatch> {
    let mut guard = shared.graph.write().await;
    let graph = guard.as_mut().ok_or(Error::NoGraph)?;

    let mut released = false;
    loop {
        while let Some(entry) = shared.queue.dequeue() {
            let id = entry.task_id;
            let Some(node) = graph.get_task_mut(&id) else {
                continue;
            };
            if node.status != TaskStatus::Ready {
                continue;
            }

            if node.is_skippable() {
                node.complete();
                shared.events.emit(EngineEvent::NodeCompleted {
                    task_id: id.clone(),
                    at: Utc::now(),
                    duration: Duration::ZERO,
                    skipped: true,
                });
                debug!(task = %id, "task skipped");
                release_dependents(graph, &shared.queue, &id)?;
                released = true;
                continue;
            }

            node.start();
            let node = node.clone();
            drop(guard);
            if released {
                shared.notify.notify_waiters();
            }
            return Ok(Dispatch::Run(node));
        }
        if seed_ready(graph, &shared.queue)? == 0 {
            break;
        }
    }

    let running = graph.tasks().any(|t| t.status == TaskStatus::Running);
    drop(guard);
    if running {
        Ok(Dispatch::Idle)
    } else {
        // Wake idle workers so they observe completion too.
        shared.notify.notify_waiters();
        Ok(Dispatch::Done)
    }
}

async fn execute(
    shared: &Shared,
    executor: &Arc<dyn TaskExecutor>,
    halt: &CancellationToken,
    node: TaskNode,
    worker: usize,
) -> Result<()> {
    let id = node.id.clone();
    let token = halt.child_token();
    lock(&shared.tokens).insert(id.clone(), token.clone());

    shared.events.emit(EngineEvent::NodeStarted {
        task_id: id.clone(),
        at: Utc::now(),
    });
    debug!(task = %id, worker, "task dispatched");

    let limit = node.timeout().or_else(|| shared.config.default_timeout());
    let started = Instant::now();
    let ctx = ExecutionContext::new(token.clone(), limit.map(|l| started + l));

    // Spawned so a panicking executor becomes a failure instead of
    // taking the worker down.
    let handle = tokio::spawn(executor.execute(node, ctx));
    let outcome = match limit {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => outcome_of(joined),
            Err(_) => {
                token.cancel();
                Outcome::Failure(Error::Timeout(limit).to_string())
            }
        },
        None => outcome_of(handle.await),
    };
    lock(&shared.tokens).remove(&id);

    finish(shared, &id, outcome, started.elapsed()).await
}

fn outcome_of(joined: std::result::Result<ExecutionResult, tokio::task::JoinError>) -> Outcome {
    match joined {
        Ok(Ok(value)) => Outcome::Success(value),
        Ok(Err(message)) => Outcome::Failure(message),
        Err(e) if e.is_panic() => Outcome::Failure(format!("executor panicked: {}", e)),
        Err(e) => Outcome::Failure(format!("executor aborted: {}", e)),
    }
}

/// Record an executor outcome and propagate it to dependents.
async fn finish(shared: &Shared, id: &TaskId, outcome: Outcome, duration: Duration) -> Result<()> {
    let mut guard = shared.graph.write().await;
    let graph = guard.as_mut().ok_or(Error::NoGraph)?;
    let node = graph
        .get_task_mut(id)
        .ok_or_else(|| Error::UnknownNode(id.clone()))?;

    let result = match outcome {
        Outcome::Success(value) => {
            node.complete();
            lock(&shared.outputs).insert(id.clone(), value);
            shared.events.emit(EngineEvent::NodeCompleted {
                task_id: id.clone(),
                at: Utc::now(),
                duration,
                skipped: false,
            });
            debug!(task = %id, elapsed_ms = duration.as_millis() as u64, "task completed");
            release_dependents(graph, &shared.queue, id)
        }
        Outcome::Failure(error) => {
            node.fail(&error);
            shared.events.emit(EngineEvent::NodeFailed {
                task_id: id.clone(),
                at: Utc::now(),
                duration,
                error: error.clone(),
            });
            warn!(task = %id, error = %error, "task failed");
            if shared.config.failure_policy == FailurePolicy::FailFast {
                block_dependents(graph, shared, id, "failed");
            }
            Ok(())
        }
    };

    drop(guard);
    shared.notify.notify_waiters();
    result
}
