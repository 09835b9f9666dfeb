//! Read-only structural analysis of a validated graph.
//!
//! The `GraphAnalyzer` reports:
//! - bottlenecks: nodes whose fan-in plus fan-out exceeds a threshold
//! - influence: a damped power-iteration ranking over dependency edges
//! - parallelization index: `1 - levels / nodes`
//! - resource totals and the critical-path vs. sequential comparison
//! - a 0-100 health score with a qualitative status
//!
//! ## Health scoring
//!
//! The score is a weighted sum of three components, each in `0..=1`:
//! parallelism (40%, the parallelization index normalized by the best value
//! achievable for the node count), bottleneck absence (30%), and issue
//! absence (30%, saturating at five issues).

use crate::analysis::validator::GraphValidator;
use crate::core::task::{CostModel, TaskId};
use crate::core::{CriticalPath, TaskGraph};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Default fan-in + fan-out above which a node counts as a bottleneck.
pub const DEFAULT_BOTTLENECK_THRESHOLD: usize = 4;

/// Default damping factor for influence ranking.
pub const DEFAULT_DAMPING: f64 = 0.85;

/// Default number of power iterations for influence ranking.
pub const DEFAULT_ITERATIONS: usize = 20;

/// Critical path share of sequential duration above which a graph is
/// reported as effectively serial.
const SERIAL_RATIO_WARNING: f64 = 0.9;

/// Issues at which the issue component of the health score bottoms out.
const MAX_COUNTED_ISSUES: usize = 5;

/// Configuration for graph analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub bottleneck_threshold: usize,
    pub damping: f64,
    pub iterations: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            bottleneck_threshold: DEFAULT_BOTTLENECK_THRESHOLD,
            damping: DEFAULT_DAMPING,
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// Where a bottleneck sits in the flow of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckRole {
    /// More dependencies than dependents: many branches join here.
    Convergence,
    /// More dependents than dependencies: work fans out from here.
    Divergence,
    /// Balanced fan-in and fan-out.
    Hub,
}

impl std::fmt::Display for BottleneckRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BottleneckRole::Convergence => write!(f, "convergence"),
            BottleneckRole::Divergence => write!(f, "divergence"),
            BottleneckRole::Hub => write!(f, "hub"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub task_id: TaskId,
    pub fan_in: usize,
    pub fan_out: usize,
    pub role: BottleneckRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfluenceScore {
    pub task_id: TaskId,
    pub score: f64,
}

/// Summed costs and the serial-vs-parallel duration comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTotals {
    pub totals: CostModel,
    pub sequential_duration_secs: f64,
    pub critical_path_secs: f64,
    /// `sequential / critical_path`; 1.0 for empty or zero-duration graphs.
    pub parallel_speedup: f64,
    /// `critical_path / sequential`; lower means more overlap is possible.
    pub critical_path_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl HealthStatus {
    fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            HealthStatus::Healthy
        } else if score >= 40.0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Critical
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub score: f64,
    pub status: HealthStatus,
    pub issues: Vec<String>,
}

/// Everything the analyzer computes for one graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphAnalysis {
    pub task_count: usize,
    pub edge_count: usize,
    pub level_count: usize,
    pub critical_path: CriticalPath,
    pub bottlenecks: Vec<Bottleneck>,
    pub influence: Vec<InfluenceScore>,
    pub parallelization_index: f64,
    pub resources: ResourceTotals,
    pub health: HealthReport,
}

/// Computes structural metrics over a graph without mutating it.
#[derive(Debug, Clone, Default)]
pub struct GraphAnalyzer {
    config: AnalyzerConfig,
}

impl GraphAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Run every analysis.
    pub fn analyze(&self, graph: &TaskGraph) -> Result<GraphAnalysis> {
        let level_count = graph.topological_levels()?.len();
        let analysis = GraphAnalysis {
            task_count: graph.task_count(),
            edge_count: graph.edge_count(),
            level_count,
            critical_path: graph.critical_path()?,
            bottlenecks: self.bottlenecks(graph),
            influence: self.influence_ranking(graph),
            parallelization_index: self.parallelization_index(graph)?,
            resources: self.resource_totals(graph)?,
            health: self.health(graph)?,
        };
        debug!(
            graph = %graph.name(),
            score = analysis.health.score,
            status = %analysis.health.status,
            "graph analyzed"
        );
        Ok(analysis)
    }

    /// Nodes whose fan-in + fan-out exceeds the configured threshold,
    /// busiest first.
    pub fn bottlenecks(&self, graph: &TaskGraph) -> Vec<Bottleneck> {
        let mut found: Vec<Bottleneck> = graph
            .tasks()
            .filter(|t| t.dependencies.len() + t.dependents.len() > self.config.bottleneck_threshold)
            .map(|t| {
                let (fan_in, fan_out) = (t.dependencies.len(), t.dependents.len());
                let role = match fan_in.cmp(&fan_out) {
                    std::cmp::Ordering::Greater => BottleneckRole::Convergence,
                    std::cmp::Ordering::Less => BottleneckRole::Divergence,
                    std::cmp::Ordering::Equal => BottleneckRole::Hub,
                };
                Bottleneck {
                    task_id: t.id.clone(),
                    fan_in,
                    fan_out,
                    role,
                }
            })
            .collect();
        found.sort_by(|a, b| {
            (b.fan_in + b.fan_out)
                .cmp(&(a.fan_in + a.fan_out))
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        found
    }

    /// Damped power iteration over dependency edges.
    ///
    /// Each iteration every node passes its score, split evenly, to its
    /// dependents. Sinks spread their score across all nodes so the total
    /// stays 1. Sorted by descending score, ties by ID.
    pub fn influence_ranking(&self, graph: &TaskGraph) -> Vec<InfluenceScore> {
        let ids = graph.task_ids();
        let n = ids.len();
        if n == 0 {
            return Vec::new();
        }

        let position: HashMap<&TaskId, usize> =
            ids.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let outgoing: Vec<Vec<usize>> = ids
            .iter()
            .map(|id| {
                graph
                    .get_task(id)
                    .map(|t| t.dependents.iter().filter_map(|d| position.get(d).copied()).collect())
                    .unwrap_or_default()
            })
            .collect();

        let damping = self.config.damping.clamp(0.0, 1.0);
        let base = (1.0 - damping) / n as f64;
        let mut scores = vec![1.0 / n as f64; n];

        for _ in 0..self.config.iterations {
            let sink_mass: f64 = outgoing
                .iter()
                .zip(&scores)
                .filter(|(out, _)| out.is_empty())
                .map(|(_, s)| *s)
                .sum();
            let mut next = vec![base + damping * sink_mass / n as f64; n];
            for (i, out) in outgoing.iter().enumerate() {
                if out.is_empty() {
                    continue;
                }
                let share = damping * scores[i] / out.len() as f64;
                for &j in out {
                    next[j] += share;
                }
            }
            scores = next;
        }

        let mut ranking: Vec<InfluenceScore> = ids
            .into_iter()
            .zip(scores)
            .map(|(task_id, score)| InfluenceScore { task_id, score })
            .collect();
        ranking.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        ranking
    }

    /// `1 - levels / nodes`; 0.0 for an empty graph.
    pub fn parallelization_index(&self, graph: &TaskGraph) -> Result<f64> {
        let nodes = graph.task_count();
        if nodes == 0 {
            return Ok(0.0);
        }
        let levels = graph.topological_levels()?.len();
        Ok(1.0 - levels as f64 / nodes as f64)
    }

    pub fn resource_totals(&self, graph: &TaskGraph) -> Result<ResourceTotals> {
        let totals: CostModel = graph.tasks().map(|t| t.cost).sum();
        let sequential = graph.sequential_duration();
        let critical = graph.critical_path()?.duration_secs;
        let (speedup, ratio) = if critical > 0.0 && sequential > 0.0 {
            (sequential / critical, critical / sequential)
        } else {
            (1.0, 1.0)
        };
        Ok(ResourceTotals {
            totals,
            sequential_duration_secs: sequential,
            critical_path_secs: critical,
            parallel_speedup: speedup,
            critical_path_ratio: ratio,
        })
    }

    pub fn health(&self, graph: &TaskGraph) -> Result<HealthReport> {
        let n = graph.task_count();
        if n == 0 {
            return Ok(HealthReport {
                score: 100.0,
                status: HealthStatus::Healthy,
                issues: Vec::new(),
            });
        }

        let mut issues = Vec::new();

        let validation = GraphValidator::new().validate(graph);
        issues.extend(validation.errors.iter().map(|e| e.message.clone()));
        issues.extend(validation.warnings.iter().map(|w| w.message.clone()));

        let bottlenecks = self.bottlenecks(graph);
        for b in &bottlenecks {
            issues.push(format!(
                "bottleneck at {} ({}: {} in, {} out)",
                b.task_id, b.role, b.fan_in, b.fan_out
            ));
        }

        let resources = self.resource_totals(graph)?;
        if n > 2 && resources.critical_path_ratio > SERIAL_RATIO_WARNING {
            issues.push(format!(
                "critical path covers {:.0}% of sequential duration",
                resources.critical_path_ratio * 100.0
            ));
        }

        let best_index = 1.0 - 1.0 / n as f64;
        let parallel = if best_index > 0.0 {
            (self.parallelization_index(graph)? / best_index).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let bottleneck_free = 1.0 - (bottlenecks.len() as f64 / n as f64).min(1.0);
        let issue_free = 1.0 - issues.len().min(MAX_COUNTED_ISSUES) as f64 / MAX_COUNTED_ISSUES as f64;

        let score = 100.0 * (0.4 * parallel + 0.3 * bottleneck_free + 0.3 * issue_free);
        Ok(HealthReport {
            score,
            status: HealthStatus::from_score(score),
            issues,
        })
    }
}
