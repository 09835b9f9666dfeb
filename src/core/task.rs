//! Task nodes, their costs, and their lifecycle states.
//!
//! A [`TaskNode`] is one unit of work: identity, category, priority, a
//! multi-dimensional cost estimate, lifecycle status, and free-form metadata
//! used by the optimizer (batch tags, skip flags, cache keys).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use uuid::Uuid;

/// Highest priority a node may carry.
pub const MAX_PRIORITY: u8 = 10;

/// Default priority for nodes built without an explicit one.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Well-known metadata keys written and read by the engine.
pub mod meta {
    /// Longest-path distance from a root, written by reordering.
    pub const LEVEL: &str = "level";
    /// `"true"` when the node lies on the critical path.
    pub const CRITICAL: &str = "critical_path";
    /// Priority the node carried before any critical-path boost.
    pub const BASE_PRIORITY: &str = "base_priority";
    /// Shared batch identifier for nodes of one (level, kind) group.
    pub const BATCH_ID: &str = "batch_id";
    /// `"true"` when the node is opted into result caching.
    pub const CACHEABLE: &str = "cacheable";
    /// Key identifying a cached result from a prior run.
    pub const CACHE_KEY: &str = "cache_key";
    /// `"true"` when the scheduler may complete the node without running it.
    pub const SKIP: &str = "skip";
    /// Present alongside `SKIP` when the optimizer, not the caller, set it.
    pub const SKIP_INFERRED: &str = "skip_inferred";
    /// Dispatch rank within the node's level, cheapest first.
    pub const COST_RANK: &str = "cost_rank";
    /// Explicit graph role (`"root"` or `"sink"`) that silences orphan warnings.
    pub const ROLE: &str = "role";
    /// Set when a cancel was requested while the node was running.
    pub const CANCEL_REQUESTED: &str = "cancel_requested";
}

/// Unique identifier for a task within a graph.
///
/// Generated IDs are UUID v4 strings; IDs supplied by callers (for example
/// task names from a planning layer) are used verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new unique task identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Return the first 8 characters for display.
    pub fn short(&self) -> String {
        self.0.chars().take(8).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

/// Category tag of a task, used for batching and cost lookup.
///
/// Serialized as a plain lowercase string; unknown strings become
/// [`TaskKind::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskKind {
    Io,
    Compute,
    Network,
    Storage,
    Validation,
    Generic,
    Custom(String),
}

impl Default for TaskKind {
    fn default() -> Self {
        Self::Generic
    }
}

impl TaskKind {
    pub fn as_str(&self) -> &str {
        match self {
            TaskKind::Io => "io",
            TaskKind::Compute => "compute",
            TaskKind::Network => "network",
            TaskKind::Storage => "storage",
            TaskKind::Validation => "validation",
            TaskKind::Generic => "generic",
            TaskKind::Custom(name) => name,
        }
    }
}

impl From<String> for TaskKind {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "io" => TaskKind::Io,
            "compute" => TaskKind::Compute,
            "network" => TaskKind::Network,
            "storage" => TaskKind::Storage,
            "validation" => TaskKind::Validation,
            "generic" | "" => TaskKind::Generic,
            _ => TaskKind::Custom(s),
        }
    }
}

impl From<&str> for TaskKind {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<TaskKind> for String {
    fn from(kind: TaskKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task status in its lifecycle.
///
/// `Pending → Ready → Running → {Completed | Failed}`, with `Cancelled`
/// reachable only from `Pending`/`Ready` and `Blocked` set on dependents of
/// a failure under the fail-fast policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    /// Waiting for dependencies.
    Pending,
    /// Dependencies satisfied, queued for dispatch.
    Ready,
    /// Currently being executed.
    Running,
    /// Completed successfully (or skipped).
    Completed,
    /// Executor reported an error or timed out.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
    /// Cancelled before dispatch.
    Cancelled,
    /// Cannot proceed because an upstream node failed.
    Blocked {
        /// Reason why the task is blocked.
        reason: String,
    },
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    /// Short state name without payload.
    pub fn name(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed { .. } => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Blocked { .. } => "blocked",
        }
    }

    /// Whether no further transition is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed
                | TaskStatus::Failed { .. }
                | TaskStatus::Cancelled
                | TaskStatus::Blocked { .. }
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
            TaskStatus::Blocked { reason } => write!(f, "blocked: {}", reason),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Estimated resource cost of a task. Every dimension is non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    /// Estimated wall-clock duration in seconds.
    pub duration_secs: f64,
    /// Monetary cost in arbitrary currency units.
    pub monetary: f64,
    pub cpu_units: f64,
    pub memory_mb: f64,
    pub io_operations: u64,
    pub network_mb: f64,
}

impl CostModel {
    /// Cost with only a duration set.
    pub fn with_duration(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            ..Default::default()
        }
    }

    /// Names of the float dimensions that are negative or not finite.
    pub fn invalid_fields(&self) -> Vec<&'static str> {
        [
            ("duration_secs", self.duration_secs),
            ("monetary", self.monetary),
            ("cpu_units", self.cpu_units),
            ("memory_mb", self.memory_mb),
            ("network_mb", self.network_mb),
        ]
        .into_iter()
        .filter(|(_, v)| !v.is_finite() || *v < 0.0)
        .map(|(name, _)| name)
        .collect()
    }

    /// Component-wise maximum of two cost models.
    pub fn max(&self, other: &CostModel) -> CostModel {
        CostModel {
            duration_secs: self.duration_secs.max(other.duration_secs),
            monetary: self.monetary.max(other.monetary),
            cpu_units: self.cpu_units.max(other.cpu_units),
            memory_mb: self.memory_mb.max(other.memory_mb),
            io_operations: self.io_operations.max(other.io_operations),
            network_mb: self.network_mb.max(other.network_mb),
        }
    }
}

/// Component-wise sum. The integer IO count saturates at `u64::MAX`.
impl std::ops::Add for CostModel {
    type Output = CostModel;

    fn add(self, rhs: CostModel) -> CostModel {
        CostModel {
            duration_secs: self.duration_secs + rhs.duration_secs,
            monetary: self.monetary + rhs.monetary,
            cpu_units: self.cpu_units + rhs.cpu_units,
            memory_mb: self.memory_mb + rhs.memory_mb,
            io_operations: self.io_operations.saturating_add(rhs.io_operations),
            network_mb: self.network_mb + rhs.network_mb,
        }
    }
}

impl std::iter::Sum for CostModel {
    fn sum<I: Iterator<Item = CostModel>>(iter: I) -> Self {
        iter.fold(CostModel::default(), |acc, c| acc + c)
    }
}

/// A unit of work in a task graph.
///
/// `dependencies` and `dependents` mirror the owning graph's edge list and
/// are maintained by [`TaskGraph`](crate::core::TaskGraph); callers should
/// not edit them directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Human-readable name for the task.
    pub name: String,
    /// Category tag.
    #[serde(default)]
    pub kind: TaskKind,
    /// Scheduling priority, `0..=MAX_PRIORITY`, higher runs first.
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Current execution status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Estimated resource cost.
    #[serde(default)]
    pub cost: CostModel,
    /// IDs of nodes this node depends on.
    #[serde(default)]
    pub dependencies: BTreeSet<TaskId>,
    /// IDs of nodes depending on this node.
    #[serde(default)]
    pub dependents: BTreeSet<TaskId>,
    /// Arbitrary key-value annotations.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Per-node execution timeout; overrides the scheduler default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
    /// When the task started execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

impl TaskNode {
    /// Create a pending node with the given ID and name.
    pub fn new(id: impl Into<TaskId>, name: &str) -> Self {
        Self {
            id: id.into(),
            name: name.to_string(),
            kind: TaskKind::Generic,
            priority: DEFAULT_PRIORITY,
            status: TaskStatus::Pending,
            cost: CostModel::default(),
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
            metadata: BTreeMap::new(),
            timeout_secs: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<TaskKind>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Set the priority, clamped to `MAX_PRIORITY`.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(MAX_PRIORITY);
        self
    }

    pub fn with_cost(mut self, cost: CostModel) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_duration(mut self, duration_secs: f64) -> Self {
        self.cost.duration_secs = duration_secs;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    /// Read a metadata flag stored as `"true"`.
    pub fn flag(&self, key: &str) -> bool {
        self.metadata.get(key).map(|v| v == "true").unwrap_or(false)
    }

    /// Parse a numeric metadata value.
    pub fn meta_number<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.metadata.get(key).and_then(|v| v.parse().ok())
    }

    /// Set a metadata value, returning whether it changed.
    pub fn set_meta(&mut self, key: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.metadata.get(key) == Some(&value) {
            return false;
        }
        self.metadata.insert(key.to_string(), value);
        true
    }

    /// Remove a metadata value, returning whether it was present.
    pub fn clear_meta(&mut self, key: &str) -> bool {
        self.metadata.remove(key).is_some()
    }

    /// Whether the optimizer marked this node as skippable.
    pub fn is_skippable(&self) -> bool {
        self.flag(meta::SKIP)
    }

    /// Configured timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(Duration::from_secs_f64)
    }

    /// Priority used by the dispatch queue: node priority first, then the
    /// optimizer's cost rank so cheaper nodes win ties.
    pub fn dispatch_priority(&self) -> i64 {
        let rank: i64 = self.meta_number(meta::COST_RANK).unwrap_or(0);
        i64::from(self.priority) * 1_000_000 - rank.min(999_999)
    }

    /// Mark the task as ready for execution.
    pub fn mark_ready(&mut self) {
        self.status = TaskStatus::Ready;
    }

    /// Transition to Running and record the start time.
    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Transition to Completed and record the completion time.
    pub fn complete(&mut self) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Transition to Failed with an error message.
    pub fn fail(&mut self, error: &str) {
        self.status = TaskStatus::Failed {
            error: error.to_string(),
        };
        self.completed_at = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    /// Transition to Blocked with a reason.
    pub fn block(&mut self, reason: &str) {
        self.status = TaskStatus::Blocked {
            reason: reason.to_string(),
        };
    }

    /// Check if the task is in a terminal state.
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if the task may still be cancelled (Pending or Ready).
    pub fn can_cancel(&self) -> bool {
        matches!(self.status, TaskStatus::Pending | TaskStatus::Ready)
    }
}

impl std::fmt::Display for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
