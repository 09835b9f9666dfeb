//! The five-pass optimization pipeline.

use crate::analysis::{GraphAnalyzer, GraphValidator};
use crate::core::task::meta;
use crate::core::TaskGraph;
use crate::error::{Error, Result};
use crate::optimize::passes::{CostWeights, PassKind};
use crate::optimize::report::{OptimizationReport, PassStats};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Default priority boost for nodes on the critical path.
pub const DEFAULT_CRITICAL_PATH_BOOST: u8 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub critical_path_boost: u8,
    pub cost_weights: CostWeights,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            critical_path_boost: DEFAULT_CRITICAL_PATH_BOOST,
            cost_weights: CostWeights::default(),
        }
    }
}

/// Inputs to a run that do not live in the graph.
#[derive(Debug, Clone, Default)]
pub struct OptimizationContext {
    /// Cache keys of work that finished in a prior run.
    pub completed_cache_keys: BTreeSet<String>,
}

impl OptimizationContext {
    pub fn with_completed_key(mut self, key: impl Into<String>) -> Self {
        self.completed_cache_keys.insert(key.into());
        self
    }

    pub fn with_completed_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.completed_cache_keys
            .extend(keys.into_iter().map(Into::into));
        self
    }
}

/// Validates a graph, then rewrites a copy of it through every pass.
#[derive(Debug, Clone, Default)]
pub struct OptimizationPipeline {
    config: OptimizerConfig,
    analyzer: GraphAnalyzer,
}

impl OptimizationPipeline {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            analyzer: GraphAnalyzer::default(),
        }
    }

    pub fn with_analyzer(mut self, analyzer: GraphAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn optimize(&self, graph: &TaskGraph) -> Result<(TaskGraph, OptimizationReport)> {
        self.optimize_with(graph, &OptimizationContext::default())
    }

    /// Optimize `graph` without touching it, returning the rewritten copy.
    ///
    /// # Errors
    /// [`Error::Validation`] if the graph fails validation; nothing is
    /// rewritten in that case.
    pub fn optimize_with(
        &self,
        graph: &TaskGraph,
        context: &OptimizationContext,
    ) -> Result<(TaskGraph, OptimizationReport)> {
        let validation = GraphValidator::new().validate(graph);
        if !validation.valid {
            warn!(graph = %graph.name(), report = %validation, "optimization refused");
            return Err(Error::Validation(Box::new(validation)));
        }

        let nodes_before = graph.task_count();
        let edges_before = graph.edge_count();
        let sequential_duration_before = graph.sequential_duration();
        let critical_path_before = graph.critical_path()?.duration_secs;
        let parallelization_before = self.analyzer.parallelization_index(graph)?;
        let monetary_before: f64 = graph.tasks().map(|t| t.cost.monetary).sum();

        let mut working = graph.clone();
        let mut passes = Vec::with_capacity(PassKind::ALL.len());
        let mut redundancies = Vec::new();
        for pass in PassKind::ALL {
            let outcome = pass.apply(&mut working, &self.config, context)?;
            passes.push(PassStats {
                pass,
                changes: outcome.changes,
            });
            redundancies.extend(outcome.redundancies);
        }

        let critical_path_after = working.critical_path()?.duration_secs;
        let mut skipped = Vec::new();
        let mut batches = BTreeSet::new();
        let mut monetary_after = 0.0;
        for task in working.tasks() {
            if task.is_skippable() {
                skipped.push(task.id.clone());
            } else {
                monetary_after += task.cost.monetary;
            }
            if let Some(batch) = task.metadata.get(meta::BATCH_ID) {
                batches.insert(batch.clone());
            }
        }
        skipped.sort();

        let report = OptimizationReport {
            graph_name: graph.name().to_string(),
            created_at: Utc::now(),
            nodes_before,
            nodes_after: working.task_count(),
            edges_before,
            edges_after: working.edge_count(),
            passes,
            redundancies,
            skipped,
            batches: batches.into_iter().collect(),
            sequential_duration_before,
            critical_path_before,
            critical_path_after,
            estimated_time_saved_secs: sequential_duration_before - critical_path_after,
            estimated_cost_saved: monetary_before - monetary_after,
            parallelization_before,
            parallelization_after: self.analyzer.parallelization_index(&working)?,
            warnings: validation
                .warnings
                .iter()
                .map(|w| w.message.clone())
                .collect(),
        };

        info!(
            graph = %report.graph_name,
            changes = report.total_changes(),
            merged = report.merged_count(),
            skipped = report.skipped.len(),
            saved_secs = report.estimated_time_saved_secs,
            "graph optimized"
        );
        Ok((working, report))
    }
}
