//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Predefined graph shapes
//! - An executor that records dispatch order and fails on demand
//! - Per-test tracing output

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use dagflow::core::{CostModel, TaskGraph, TaskId, TaskNode};
use dagflow::orchestration::{ExecutionContext, ExecutionResult, TaskExecutor};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Output is captured per test and shown only for failures. Enable levels
/// with e.g. `RUST_LOG=dagflow=debug`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

pub fn id(s: &str) -> TaskId {
    TaskId::from(s)
}

/// A node whose ID is also its name.
pub fn node(name: &str, duration_secs: f64) -> TaskNode {
    TaskNode::new(name, name).with_cost(CostModel::with_duration(duration_secs))
}

/// Diamond graph: a -> b, a -> c, b -> d, c -> d.
///
/// ```text
///     a
///    / \
///   b   c
///    \ /
///     d
/// ```
///
/// Durations: a=1, b=5, c=2, d=1.
pub fn diamond() -> TaskGraph {
    let mut graph = TaskGraph::new("diamond");
    for (name, secs) in [("a", 1.0), ("b", 5.0), ("c", 2.0), ("d", 1.0)] {
        graph.add_node(node(name, secs)).expect("add node");
    }
    for (from, to) in [("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")] {
        graph.add_edge(&id(from), &id(to)).expect("add edge");
    }
    graph
}

/// Chain graph: t0 -> t1 -> ... -> t{len-1}, one second each.
pub fn chain(len: usize) -> TaskGraph {
    let mut graph = TaskGraph::new("chain");
    for i in 0..len {
        graph
            .add_node(node(&format!("t{}", i), 1.0))
            .expect("add node");
        if i > 0 {
            graph
                .add_edge(&id(&format!("t{}", i - 1)), &id(&format!("t{}", i)))
                .expect("add edge");
        }
    }
    graph
}

/// `count` unconnected nodes.
pub fn independent(count: usize) -> TaskGraph {
    let mut graph = TaskGraph::new("independent");
    for i in 0..count {
        graph
            .add_node(node(&format!("task-{}", i), 1.0))
            .expect("add node");
    }
    graph
}

/// Executor that records the order nodes were started and fails the
/// nodes named in `failing`.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    started: Arc<Mutex<Vec<TaskId>>>,
    failing: BTreeSet<TaskId>,
    delay: Option<Duration>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, ids: &[&str]) -> Self {
        self.failing.extend(ids.iter().map(|s| id(s)));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn started(&self) -> Vec<TaskId> {
        self.started.lock().expect("recorder lock").clone()
    }

    pub fn position(&self, task: &str) -> Option<usize> {
        self.started().iter().position(|t| t.as_str() == task)
    }
}

impl TaskExecutor for RecordingExecutor {
    fn execute(&self, task: TaskNode, _ctx: ExecutionContext) -> BoxFuture<'static, ExecutionResult> {
        self.started
            .lock()
            .expect("recorder lock")
            .push(task.id.clone());
        let fail = self.failing.contains(&task.id);
        let delay = self.delay;
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fail {
                Err(format!("{} exploded", task.id))
            } else {
                Ok(serde_json::json!({ "task": task.id.as_str() }))
            }
        }
        .boxed()
    }
}
