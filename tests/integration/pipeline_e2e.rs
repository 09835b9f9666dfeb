//! End-to-end construction, optimization, and export tests.

use dagflow::analysis::{GraphAnalyzer, HealthStatus};
use dagflow::core::task::meta;
use dagflow::core::{CostModel, DependencyPatterns, TaskGraph, TaskSpec};
use dagflow::export::{self, ExportOptions};
use dagflow::optimize::{OptimizationContext, OptimizationPipeline, PassKind};
use dagflow::{Engine, EngineConfig, Error};
use pretty_assertions::assert_eq;

use crate::fixtures::{diamond, id, independent, init_tracing, node};

fn ingest_specs() -> Vec<TaskSpec> {
    vec![
        TaskSpec::new("fetch").with_kind("network"),
        TaskSpec::new("fetch").with_kind("network"),
        TaskSpec::new("parse")
            .with_kind("compute")
            .depends_on(&["fetch"]),
        TaskSpec::new("store").with_kind("storage").with_priority(8),
    ]
}

fn ingest_patterns() -> DependencyPatterns {
    DependencyPatterns::new()
        .rule("^store$", "^(fetch|parse)$")
        .unwrap()
}

/// Given a flat task list and a pattern table
/// When the graph is built
/// Then explicit and inferred dependencies both become edges
#[test]
fn test_flat_task_list_with_patterns() {
    init_tracing();
    let graph = TaskGraph::from_specs("ingest", &ingest_specs(), Some(&ingest_patterns())).unwrap();

    assert_eq!(graph.task_count(), 4);
    assert!(graph.contains_task(&id("fetch-2")));
    assert!(graph.has_edge(&id("fetch"), &id("parse")));
    assert!(graph.has_edge(&id("fetch-2"), &id("parse")));
    for dep in ["fetch", "fetch-2", "parse"] {
        assert!(graph.has_edge(&id(dep), &id("store")), "missing {} -> store", dep);
    }
    assert_eq!(graph.get_task(&id("store")).unwrap().priority, 8);
}

#[test]
fn test_flat_task_list_unknown_dependency_is_rejected() {
    let specs = vec![TaskSpec::new("parse").depends_on(&["ghost"])];
    let err = TaskGraph::from_specs("broken", &specs, None).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

/// Given two identical fetch nodes feeding the same consumers
/// When the pipeline runs
/// Then they collapse to one survivor that keeps every outgoing edge
#[test]
fn test_duplicate_fetch_is_merged() {
    init_tracing();
    let graph = TaskGraph::from_specs("ingest", &ingest_specs(), Some(&ingest_patterns())).unwrap();
    let (optimized, report) = OptimizationPipeline::default().optimize(&graph).unwrap();

    assert_eq!(graph.task_count(), 4, "input must not be mutated");
    assert_eq!(optimized.task_count(), 3);
    assert!(!optimized.contains_task(&id("fetch-2")));
    assert!(optimized.has_edge(&id("fetch"), &id("parse")));
    assert!(optimized.has_edge(&id("fetch"), &id("store")));
    assert!(optimized.has_edge(&id("parse"), &id("store")));
    assert_eq!(optimized.edge_count(), 3);

    assert_eq!(report.merged_count(), 1);
    assert_eq!(report.redundancies[0].canonical, id("fetch"));
    assert_eq!(report.redundancies[0].merged, vec![id("fetch-2")]);
    assert_eq!(report.changes_for(PassKind::RedundancyElimination), 1);
}

#[test]
fn test_diamond_analysis_matches_expectations() {
    let graph = diamond();
    let analysis = GraphAnalyzer::default().analyze(&graph).unwrap();

    assert_eq!(analysis.critical_path.path, vec![id("a"), id("b"), id("d")]);
    assert_eq!(analysis.critical_path.duration_secs, 7.0);
    assert_eq!(analysis.level_count, 3);
    assert!((analysis.parallelization_index - 0.25).abs() < 1e-9);
    assert_eq!(analysis.resources.sequential_duration_secs, 9.0);
    assert!(analysis.bottlenecks.is_empty());
    assert_ne!(analysis.health.status, HealthStatus::Critical);
}

/// Given a diamond
/// When optimized
/// Then the critical path is boosted and the parallel branch is batched
#[test]
fn test_diamond_optimization_annotations() {
    let (optimized, report) = OptimizationPipeline::default().optimize(&diamond()).unwrap();

    let b = optimized.get_task(&id("b")).unwrap();
    let c = optimized.get_task(&id("c")).unwrap();
    assert!(b.flag(meta::CRITICAL));
    assert!(!c.flag(meta::CRITICAL));
    assert!(b.priority > c.priority);
    assert_eq!(
        b.metadata.get(meta::BATCH_ID),
        c.metadata.get(meta::BATCH_ID)
    );
    assert_eq!(report.batches, vec!["batch-L1-generic".to_string()]);
    assert_eq!(report.estimated_time_saved_secs, 2.0);
    assert!(report.warnings.is_empty());
}

#[test]
fn test_optimizing_twice_is_a_noop() {
    let pipeline = OptimizationPipeline::default();
    let (once, _) = pipeline.optimize(&diamond()).unwrap();
    let (twice, report) = pipeline.optimize(&once).unwrap();

    assert!(report.is_noop(), "second run changed {}", report);
    assert_eq!(once.to_document(), twice.to_document());
}

/// Given a cache key the caller has already completed
/// When the pipeline runs with that context
/// Then the node is flagged to skip and its cost counts as saved
#[test]
fn test_completed_cache_key_short_circuits() {
    let mut graph = TaskGraph::new("cached");
    graph
        .add_node(
            node("download", 3.0)
                .with_cost(CostModel {
                    duration_secs: 3.0,
                    monetary: 4.0,
                    ..Default::default()
                })
                .with_metadata(meta::CACHE_KEY, "s3://bucket/v1"),
        )
        .unwrap();
    graph.add_node(node("train", 10.0)).unwrap();
    graph.add_edge(&id("download"), &id("train")).unwrap();

    let context = OptimizationContext::default().with_completed_key("s3://bucket/v1");
    let (optimized, report) = OptimizationPipeline::default()
        .optimize_with(&graph, &context)
        .unwrap();

    assert!(optimized.get_task(&id("download")).unwrap().flag(meta::SKIP));
    assert!(!optimized.get_task(&id("train")).unwrap().flag(meta::SKIP));
    assert_eq!(report.skipped, vec![id("download")]);
    assert_eq!(report.estimated_cost_saved, 4.0);
}

#[test]
fn test_independent_tasks_are_ranked_by_cost() {
    let mut graph = independent(3);
    graph.get_task_mut(&id("task-0")).unwrap().cost.duration_secs = 9.0;
    let (optimized, _) = OptimizationPipeline::default().optimize(&graph).unwrap();

    let rank = |name: &str| {
        optimized
            .get_task(&id(name))
            .unwrap()
            .meta_number::<usize>(meta::COST_RANK)
            .unwrap()
    };
    assert_eq!(rank("task-1"), 0);
    assert_eq!(rank("task-2"), 1);
    assert_eq!(rank("task-0"), 2);
}

#[test]
fn test_exports_carry_report_and_analysis() {
    init_tracing();
    let engine = Engine::new(EngineConfig::default());
    let prepared = engine.prepare(&diamond()).unwrap();
    let options = ExportOptions::default()
        .with_report(&prepared.report)
        .with_analysis(&prepared.analysis);

    let json = export::to_json(&prepared.graph, options).unwrap();
    let document = export::from_json(&json).unwrap();
    assert_eq!(document.report.as_ref(), Some(&prepared.report));
    assert_eq!(document.analysis.as_ref(), Some(&prepared.analysis));
    let restored = document.into_graph().unwrap();
    assert_eq!(restored.to_document(), prepared.graph.to_document());

    let dot = export::to_dot(&prepared.graph, options);
    assert!(dot.starts_with("digraph"));
    assert!(dot.contains("red"));

    let md = export::to_markdown(&prepared.graph, options).unwrap();
    assert!(md.starts_with("# diamond"));
    assert!(md.contains("## Critical path"));
    assert!(md.contains("## Optimization"));
    assert!(md.contains("## Analysis"));
}

#[test]
fn test_invalid_graph_never_reaches_optimizer() {
    let mut graph = TaskGraph::new("bad-cost");
    graph
        .add_node(node("a", 1.0).with_cost(CostModel::with_duration(-1.0)))
        .unwrap();

    let err = Engine::default().prepare(&graph).unwrap_err();
    match err {
        Error::Validation(report) => {
            assert!(!report.valid);
            assert!(report.errors[0].message.contains("duration_secs"));
        }
        other => panic!("expected validation error, got {other}"),
    }
}
