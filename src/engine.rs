//! Top-level facade tying validation, analysis, optimization, and
//! scheduling together.
//!
//! ```no_run
//! use dagflow::core::{TaskGraph, TaskNode};
//! use dagflow::config::EngineConfig;
//! use dagflow::engine::Engine;
//! use dagflow::orchestration::NoopExecutor;
//!
//! # async fn demo() -> dagflow::Result<()> {
//! let mut graph = TaskGraph::new("nightly");
//! graph.add_node(TaskNode::new("fetch", "fetch"))?;
//! graph.add_node(TaskNode::new("store", "store"))?;
//! graph.add_edge(&"fetch".into(), &"store".into())?;
//!
//! let engine = Engine::new(EngineConfig::default());
//! let (prepared, summary) = engine.run(&graph, NoopExecutor).await?;
//! println!("{}", prepared.report);
//! assert!(summary.is_success());
//! # Ok(())
//! # }
//! ```

use crate::analysis::{GraphAnalysis, GraphAnalyzer, GraphValidator, ValidationReport};
use crate::config::EngineConfig;
use crate::core::TaskGraph;
use crate::error::{Error, Result};
use crate::optimize::{OptimizationContext, OptimizationPipeline, OptimizationReport};
use crate::orchestration::{EngineEvent, EventBus, RunSummary, Scheduler, TaskExecutor};
use chrono::Utc;
use crossbeam_channel::Receiver;
use std::time::Instant;
use tracing::info;

/// Output of [`Engine::prepare`].
#[derive(Debug, Clone)]
pub struct PreparedGraph {
    /// Analysis of the graph as submitted.
    pub analysis: GraphAnalysis,
    /// The optimized copy, ready for execution.
    pub graph: TaskGraph,
    pub report: OptimizationReport,
}

#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    analyzer: GraphAnalyzer,
    pipeline: OptimizationPipeline,
    events: EventBus,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let analyzer = GraphAnalyzer::new(config.analyzer.clone());
        let pipeline =
            OptimizationPipeline::new(config.optimizer.clone()).with_analyzer(analyzer.clone());
        Self {
            config,
            analyzer,
            pipeline,
            events: EventBus::new(),
        }
    }

    /// Engine configured from `~/.dagflow/dagflow.toml`.
    pub fn load() -> Result<Self> {
        Ok(Self::new(EngineConfig::load()?))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn validate(&self, graph: &TaskGraph) -> ValidationReport {
        GraphValidator::new().validate(graph)
    }

    pub fn analyze(&self, graph: &TaskGraph) -> Result<GraphAnalysis> {
        self.analyzer.analyze(graph)
    }

    pub fn prepare(&self, graph: &TaskGraph) -> Result<PreparedGraph> {
        self.prepare_with(graph, &OptimizationContext::default())
    }

    /// Validate, analyze, and optimize `graph`, emitting `GraphOptimized`.
    ///
    /// # Errors
    /// [`Error::Validation`] if validation fails; nothing else runs then.
    pub fn prepare_with(
        &self,
        graph: &TaskGraph,
        context: &OptimizationContext,
    ) -> Result<PreparedGraph> {
        let started = Instant::now();
        let validation = self.validate(graph);
        if !validation.valid {
            return Err(Error::Validation(Box::new(validation)));
        }

        let analysis = self.analyzer.analyze(graph)?;
        let (optimized, report) = self.pipeline.optimize_with(graph, context)?;

        self.events.emit(EngineEvent::GraphOptimized {
            graph: graph.name().to_string(),
            at: Utc::now(),
            duration: started.elapsed(),
            changes: report.total_changes(),
            nodes_before: report.nodes_before,
            nodes_after: report.nodes_after,
        });

        Ok(PreparedGraph {
            analysis,
            graph: optimized,
            report,
        })
    }

    /// A scheduler sharing this engine's config and event bus.
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::with_events(self.config.scheduler.clone(), self.events.clone())
    }

    /// Run `graph` as-is, without optimization.
    pub async fn execute<E: TaskExecutor>(
        &self,
        graph: TaskGraph,
        executor: E,
    ) -> Result<RunSummary> {
        let scheduler = self.scheduler();
        scheduler.submit_graph(graph).await?;
        scheduler.run(executor).await
    }

    /// Prepare `graph`, then execute the optimized copy.
    pub async fn run<E: TaskExecutor>(
        &self,
        graph: &TaskGraph,
        executor: E,
    ) -> Result<(PreparedGraph, RunSummary)> {
        let prepared = self.prepare(graph)?;
        let summary = self.execute(prepared.graph.clone(), executor).await?;
        info!(
            graph = %graph.name(),
            health = %prepared.analysis.health.status,
            completed = summary.status.count("completed"),
            "engine run complete"
        );
        Ok((prepared, summary))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
