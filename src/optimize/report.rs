//! Immutable record of one optimization run.

use crate::core::task::TaskId;
use crate::optimize::passes::PassKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Change count for a single pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassStats {
    pub pass: PassKind,
    /// Nodes whose priority, metadata, or existence changed.
    pub changes: usize,
}

/// A group of structurally identical nodes folded into one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redundancy {
    /// Surviving node.
    pub canonical: TaskId,
    /// Removed duplicates, in the order they were merged.
    pub merged: Vec<TaskId>,
    /// `name|kind|sorted dependency IDs`.
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub graph_name: String,
    pub created_at: DateTime<Utc>,
    pub nodes_before: usize,
    pub nodes_after: usize,
    pub edges_before: usize,
    pub edges_after: usize,
    pub passes: Vec<PassStats>,
    pub redundancies: Vec<Redundancy>,
    /// Nodes flagged for short-circuit.
    pub skipped: Vec<TaskId>,
    /// Distinct batch identifiers assigned.
    pub batches: Vec<String>,
    pub sequential_duration_before: f64,
    pub critical_path_before: f64,
    pub critical_path_after: f64,
    /// Sequential duration before minus critical path duration after.
    pub estimated_time_saved_secs: f64,
    /// Monetary cost removed by merging and short-circuiting.
    pub estimated_cost_saved: f64,
    pub parallelization_before: f64,
    pub parallelization_after: f64,
    pub warnings: Vec<String>,
}

impl OptimizationReport {
    pub fn total_changes(&self) -> usize {
        self.passes.iter().map(|p| p.changes).sum()
    }

    /// True when no pass modified anything.
    pub fn is_noop(&self) -> bool {
        self.total_changes() == 0
    }

    pub fn changes_for(&self, pass: PassKind) -> usize {
        self.passes
            .iter()
            .find(|p| p.pass == pass)
            .map(|p| p.changes)
            .unwrap_or(0)
    }

    pub fn applied_passes(&self) -> Vec<PassKind> {
        self.passes.iter().map(|p| p.pass).collect()
    }

    pub fn parallelization_delta(&self) -> f64 {
        self.parallelization_after - self.parallelization_before
    }

    pub fn merged_count(&self) -> usize {
        self.redundancies.iter().map(|r| r.merged.len()).sum()
    }
}

impl std::fmt::Display for OptimizationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} -> {} nodes, {} -> {} edges, {} change(s), {:.2}s saved",
            self.graph_name,
            self.nodes_before,
            self.nodes_after,
            self.edges_before,
            self.edges_after,
            self.total_changes(),
            self.estimated_time_saved_secs
        )
    }
}
