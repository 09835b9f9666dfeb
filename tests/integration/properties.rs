//! Randomized checks over generated DAGs.

use std::collections::BTreeSet;

use dagflow::core::{TaskGraph, TaskId, TaskNode};
use dagflow::optimize::OptimizationPipeline;
use dagflow::orchestration::{FailurePolicy, Scheduler, SchedulerConfig};
use dagflow::Error;
use proptest::prelude::*;

use crate::fixtures::RecordingExecutor;

/// Dependency lists for `n` tasks, where task `i` may only depend on
/// tasks `0..i`, so every generated graph is acyclic.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<BTreeSet<usize>>> {
    (1..=max_tasks).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..n), n).prop_map(
            |raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, deps)| {
                        if i == 0 {
                            BTreeSet::new()
                        } else {
                            deps.into_iter().map(|d| d % i).collect()
                        }
                    })
                    .collect()
            },
        )
    })
}

fn tid(i: usize) -> TaskId {
    TaskId::from(format!("t{:02}", i))
}

/// Build a graph; names repeat every three tasks so duplicates exist.
fn build(deps: &[BTreeSet<usize>]) -> TaskGraph {
    let mut graph = TaskGraph::new("generated");
    for i in 0..deps.len() {
        let name = format!("step-{}", i % 3);
        graph
            .add_node(TaskNode::new(tid(i), &name).with_duration((i % 4 + 1) as f64))
            .unwrap();
    }
    for (i, list) in deps.iter().enumerate() {
        for d in list {
            graph.add_edge(&tid(*d), &tid(i)).unwrap();
        }
    }
    graph
}

proptest! {
    #[test]
    fn test_rejected_edge_leaves_graph_unchanged(
        deps in dag_strategy(12),
        from in any::<usize>(),
        to in any::<usize>(),
    ) {
        let mut graph = build(&deps);
        let (from, to) = (tid(from % deps.len()), tid(to % deps.len()));
        let before = graph.to_document();

        match graph.add_edge(&from, &to) {
            Ok(()) => {
                prop_assert!(graph.has_edge(&from, &to));
                prop_assert!(graph.topological_order().is_ok());
            }
            Err(Error::Cycle { .. }) => {
                prop_assert_eq!(graph.to_document(), before);
            }
            Err(other) => prop_assert!(false, "unexpected error {}", other),
        }
    }

    #[test]
    fn test_levels_respect_every_edge(deps in dag_strategy(16)) {
        let graph = build(&deps);
        let levels = graph.node_levels().unwrap();
        let order = graph.topological_order().unwrap();
        prop_assert_eq!(order.len(), graph.task_count());

        let position = |id: &TaskId| order.iter().position(|o| o == id).unwrap();
        for edge in graph.edges() {
            prop_assert!(levels[&edge.source] < levels[&edge.target]);
            prop_assert!(position(&edge.source) < position(&edge.target));
        }

        let critical = graph.critical_path().unwrap();
        prop_assert!(critical.duration_secs <= graph.sequential_duration() + 1e-9);
    }

    #[test]
    fn test_optimizer_is_idempotent(deps in dag_strategy(12)) {
        let pipeline = OptimizationPipeline::default();
        let (once, first) = pipeline.optimize(&build(&deps)).unwrap();
        let (twice, second) = pipeline.optimize(&once).unwrap();

        prop_assert!(first.nodes_after <= first.nodes_before);
        prop_assert!(second.is_noop(), "second run: {}", second);
        prop_assert_eq!(once.to_document(), twice.to_document());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_scheduler_completes_every_node(deps in dag_strategy(10), workers in 1..4usize) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let graph = build(&deps);
        let edges: Vec<(TaskId, TaskId)> = graph
            .edges()
            .map(|e| (e.source.clone(), e.target.clone()))
            .collect();
        let executor = RecordingExecutor::new();

        let summary = runtime.block_on(async {
            let scheduler = Scheduler::new(SchedulerConfig {
                workers,
                failure_policy: FailurePolicy::FailFast,
                ..Default::default()
            });
            scheduler.submit_graph(graph).await.unwrap();
            scheduler.run(executor.clone()).await.unwrap()
        });

        prop_assert!(summary.is_success());
        prop_assert_eq!(executor.started().len(), deps.len());
        for (from, to) in edges {
            prop_assert!(executor.position(from.as_str()) < executor.position(to.as_str()));
        }
    }
}
