//! Execution tests through the engine and scheduler.

use std::time::{Duration, Instant};

use dagflow::core::task::meta;
use dagflow::core::{TaskGraph, TaskStatus};
use dagflow::optimize::OptimizationContext;
use dagflow::orchestration::{EngineEvent, FailurePolicy, Scheduler, SchedulerConfig};
use dagflow::{Engine, EngineConfig};

use crate::fixtures::{chain, diamond, id, independent, init_tracing, node, RecordingExecutor};

fn engine_with(workers: usize, policy: FailurePolicy) -> Engine {
    let mut config = EngineConfig::default();
    config.scheduler.workers = workers;
    config.scheduler.failure_policy = policy;
    Engine::new(config)
}

/// Given a diamond
/// When the engine prepares and runs it
/// Then every node completes and dependencies run before dependents
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_engine_runs_diamond_in_dependency_order() {
    init_tracing();
    let executor = RecordingExecutor::new();
    let engine = engine_with(4, FailurePolicy::FailFast);

    let (_, summary) = engine.run(&diamond(), executor.clone()).await.unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.outputs.len(), 4);
    assert_eq!(
        summary.outputs.get(&id("d")),
        Some(&serde_json::json!({ "task": "d" }))
    );
    assert_eq!(executor.position("a"), Some(0));
    assert_eq!(executor.position("d"), Some(3));
}

#[tokio::test]
async fn test_single_worker_walks_chain_in_order() {
    let executor = RecordingExecutor::new();
    let engine = engine_with(1, FailurePolicy::FailFast);

    let summary = engine.execute(chain(10), executor.clone()).await.unwrap();

    assert!(summary.is_success());
    let expected: Vec<_> = (0..10).map(|i| id(&format!("t{}", i))).collect();
    assert_eq!(executor.started(), expected);
}

/// Given a failing branch under fail-fast
/// When the run finishes
/// Then the failure is reported and everything downstream is blocked
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fail_fast_blocks_downstream_and_reports_events() {
    init_tracing();
    let engine = engine_with(2, FailurePolicy::FailFast);
    let events = engine.subscribe();
    let executor = RecordingExecutor::new().failing(&["b"]);

    let summary = engine.execute(diamond(), executor.clone()).await.unwrap();

    assert!(!summary.is_success());
    assert_eq!(
        summary.failures.get(&id("b")).map(String::as_str),
        Some("b exploded")
    );
    assert_eq!(summary.status.count("blocked"), 1);
    assert_eq!(executor.position("d"), None);

    let events: Vec<EngineEvent> = events.try_iter().collect();
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::NodeFailed { task_id, .. } if task_id == &id("b"))));
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::NodeBlocked { task_id, cause, .. } if task_id == &id("d") && cause == &id("b")
    )));
}

#[tokio::test]
async fn test_best_effort_keeps_independent_work_going() {
    let engine = engine_with(2, FailurePolicy::BestEffort);
    let mut graph = diamond();
    graph.add_node(node("e", 1.0)).unwrap();
    graph.add_edge(&id("c"), &id("e")).unwrap();
    let executor = RecordingExecutor::new().failing(&["b"]);

    let summary = engine.execute(graph, executor).await.unwrap();

    assert_eq!(summary.status.count("failed"), 1);
    assert_eq!(summary.status.count("pending"), 1, "d waits on failed b");
    assert_eq!(summary.status.count("blocked"), 0);
    assert!(summary.outputs.contains_key(&id("e")));
}

/// Given a node whose cache key is already complete
/// When the optimized graph runs
/// Then the node finishes without reaching the executor
#[tokio::test]
async fn test_short_circuited_node_skips_executor() {
    let engine = Engine::default();
    let mut graph = TaskGraph::new("cached");
    graph
        .add_node(node("download", 3.0).with_metadata(meta::CACHE_KEY, "v1"))
        .unwrap();
    graph.add_node(node("train", 10.0)).unwrap();
    graph.add_edge(&id("download"), &id("train")).unwrap();

    let context = OptimizationContext::default().with_completed_key("v1");
    let prepared = engine.prepare_with(&graph, &context).unwrap();
    let events = engine.subscribe();
    let executor = RecordingExecutor::new();
    let summary = engine.execute(prepared.graph, executor.clone()).await.unwrap();

    assert!(summary.is_success());
    assert_eq!(executor.started(), vec![id("train")]);
    assert!(!summary.outputs.contains_key(&id("download")));
    assert!(events.try_iter().any(|e| matches!(
        e,
        EngineEvent::NodeCompleted { task_id, skipped: true, .. } if task_id == id("download")
    )));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workers_run_independent_nodes_concurrently() {
    let engine = engine_with(4, FailurePolicy::FailFast);
    let executor = RecordingExecutor::new().with_delay(Duration::from_millis(100));

    let start = Instant::now();
    let summary = engine.execute(independent(8), executor).await.unwrap();
    let elapsed = start.elapsed();

    assert!(summary.is_success());
    assert!(
        elapsed < Duration::from_millis(600),
        "8 x 100ms on 4 workers took {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_status_and_graph_are_visible_after_run() {
    let scheduler = Scheduler::new(SchedulerConfig::default());
    scheduler.submit_graph(chain(3)).await.unwrap();
    scheduler.run(RecordingExecutor::new()).await.unwrap();

    let status = scheduler.status().await;
    assert_eq!(status.count("completed"), 3);
    assert_eq!(status.queue_depth, 0);
    let graph = scheduler.graph().await.unwrap();
    assert!(graph.tasks().all(|t| t.status == TaskStatus::Completed));
}

#[tokio::test]
async fn test_cancel_before_run_blocks_rest_of_chain() {
    let scheduler = Scheduler::new(SchedulerConfig::default());
    scheduler.submit_graph(chain(4)).await.unwrap();
    scheduler.cancel(&id("t1")).await.unwrap();

    let executor = RecordingExecutor::new();
    let summary = scheduler.run(executor.clone()).await.unwrap();

    assert_eq!(executor.started(), vec![id("t0")]);
    assert_eq!(summary.status.count("cancelled"), 1);
    assert_eq!(summary.status.count("blocked"), 2);
}
