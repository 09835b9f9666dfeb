//! The five rewrite passes.
//!
//! Passes mutate the pipeline's working copy in place and report how many
//! nodes they changed. A value that is rewritten to what it already was
//! does not count, which is what makes a second pipeline run report zero.

use crate::core::task::{meta, CostModel, TaskId, TaskKind, MAX_PRIORITY};
use crate::core::{TaskEdge, TaskGraph};
use crate::error::{Error, Result};
use crate::optimize::pipeline::{OptimizationContext, OptimizerConfig};
use crate::optimize::report::Redundancy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

/// Per-dimension weights folding a [`CostModel`] into one comparable number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    pub duration: f64,
    pub monetary: f64,
    pub cpu_units: f64,
    pub memory_mb: f64,
    pub io_operations: f64,
    pub network_mb: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            duration: 1.0,
            monetary: 1.0,
            cpu_units: 0.5,
            memory_mb: 0.001,
            io_operations: 0.01,
            network_mb: 0.01,
        }
    }
}

impl CostWeights {
    pub fn score(&self, cost: &CostModel) -> f64 {
        self.duration * cost.duration_secs
            + self.monetary * cost.monetary
            + self.cpu_units * cost.cpu_units
            + self.memory_mb * cost.memory_mb
            + self.io_operations * cost.io_operations as f64
            + self.network_mb * cost.network_mb
    }
}

/// One optimizer pass. Applied in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Reordering,
    RedundancyElimination,
    Batching,
    ShortCircuit,
    CostSort,
}

/// What a pass did to the graph.
#[derive(Debug, Clone, Default)]
pub struct PassOutcome {
    pub changes: usize,
    pub redundancies: Vec<Redundancy>,
}

impl PassOutcome {
    fn changes(changes: usize) -> Self {
        Self {
            changes,
            redundancies: Vec::new(),
        }
    }
}

impl PassKind {
    pub const ALL: [PassKind; 5] = [
        PassKind::Reordering,
        PassKind::RedundancyElimination,
        PassKind::Batching,
        PassKind::ShortCircuit,
        PassKind::CostSort,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PassKind::Reordering => "reordering",
            PassKind::RedundancyElimination => "redundancy_elimination",
            PassKind::Batching => "batching",
            PassKind::ShortCircuit => "short_circuit",
            PassKind::CostSort => "cost_sort",
        }
    }

    pub fn apply(
        &self,
        graph: &mut TaskGraph,
        config: &OptimizerConfig,
        context: &OptimizationContext,
    ) -> Result<PassOutcome> {
        let outcome = match self {
            PassKind::Reordering => PassOutcome::changes(reorder(graph, config.critical_path_boost)?),
            PassKind::RedundancyElimination => eliminate_redundancy(graph, config)?,
            PassKind::Batching => PassOutcome::changes(batch(graph)?),
            PassKind::ShortCircuit => PassOutcome::changes(short_circuit(graph, context)),
            PassKind::CostSort => PassOutcome::changes(cost_sort(graph, &config.cost_weights)?),
        };
        debug!(pass = self.name(), changes = outcome.changes, "pass applied");
        Ok(outcome)
    }
}

impl std::fmt::Display for PassKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ========== Reordering ==========

/// Annotate levels and critical-path membership, and boost critical nodes.
///
/// The pre-boost priority is kept under `meta::BASE_PRIORITY` so repeated
/// runs boost from the same base instead of compounding.
fn reorder(graph: &mut TaskGraph, boost: u8) -> Result<usize> {
    let levels = graph.node_levels()?;
    let critical = graph.critical_path()?;

    let mut changed = 0;
    for (id, level) in levels {
        let on_path = critical.contains(&id);
        let Some(node) = graph.get_task_mut(&id) else {
            continue;
        };
        let base: u8 = node
            .meta_number(meta::BASE_PRIORITY)
            .unwrap_or(node.priority)
            .min(MAX_PRIORITY);
        let target = if on_path {
            base.saturating_add(boost).min(MAX_PRIORITY)
        } else {
            base
        };

        let mut dirty = node.set_meta(meta::LEVEL, level.to_string());
        dirty |= node.set_meta(meta::BASE_PRIORITY, base.to_string());
        dirty |= if on_path {
            node.set_meta(meta::CRITICAL, "true")
        } else {
            node.clear_meta(meta::CRITICAL)
        };
        if node.priority != target {
            trace!(task = %id, from = node.priority, to = target, "priority adjusted");
            node.priority = target;
            dirty = true;
        }
        changed += usize::from(dirty);
    }
    Ok(changed)
}

// ========== Redundancy elimination ==========

/// Structural identity used to detect duplicates: name, kind, and the
/// sorted dependency IDs, compared field by field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeSignature {
    pub name: String,
    pub kind: TaskKind,
    pub dependencies: Vec<TaskId>,
}

impl std::fmt::Display for NodeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let deps: Vec<&str> = self.dependencies.iter().map(|d| d.as_str()).collect();
        write!(f, "{:?} ({}) after [{}]", self.name, self.kind, deps.join(", "))
    }
}

pub fn signature(graph: &TaskGraph, id: &TaskId) -> Option<NodeSignature> {
    let node = graph.get_task(id)?;
    Some(NodeSignature {
        name: node.name.clone(),
        kind: node.kind.clone(),
        // BTreeSet iteration is already sorted.
        dependencies: node.dependencies.iter().cloned().collect(),
    })
}

/// Merge nodes with identical signatures.
///
/// Walks the topological order so that by the time a node is visited its
/// dependencies have already been folded into their canonical survivors.
/// Duplicates of duplicates therefore collapse in a single run.
fn eliminate_redundancy(graph: &mut TaskGraph, config: &OptimizerConfig) -> Result<PassOutcome> {
    let order = graph.topological_order()?;
    let mut canonical_by_signature: HashMap<NodeSignature, TaskId> = HashMap::new();
    let mut groups: BTreeMap<TaskId, Redundancy> = BTreeMap::new();
    let mut merged = 0;

    for id in order {
        let Some(sig) = signature(graph, &id) else {
            continue;
        };
        match canonical_by_signature.get(&sig) {
            Some(canonical) => {
                merge_into(graph, canonical, &id)?;
                groups
                    .entry(canonical.clone())
                    .or_insert_with(|| Redundancy {
                        canonical: canonical.clone(),
                        merged: Vec::new(),
                        signature: sig.to_string(),
                    })
                    .merged
                    .push(id);
                merged += 1;
            }
            None => {
                canonical_by_signature.insert(sig, id);
            }
        }
    }

    if merged > 0 {
        // Merging can move the critical path; refresh the annotations.
        reorder(graph, config.critical_path_boost)?;
    }

    Ok(PassOutcome {
        changes: merged,
        redundancies: groups.into_values().collect(),
    })
}

/// Fold `duplicate` into `canonical`, preserving every edge of both.
fn merge_into(graph: &mut TaskGraph, canonical: &TaskId, duplicate: &TaskId) -> Result<()> {
    let dup = graph
        .get_task(duplicate)
        .cloned()
        .ok_or_else(|| Error::UnknownNode(duplicate.clone()))?;

    for dependent in &dup.dependents {
        let edge = graph
            .get_edge(duplicate, dependent)
            .cloned()
            .unwrap_or_else(|| TaskEdge::new(duplicate.clone(), dependent.clone()));
        // add_edge_with re-checks acyclicity and ignores existing edges.
        graph.add_edge_with(TaskEdge {
            source: canonical.clone(),
            ..edge
        })?;
    }
    for dependency in &dup.dependencies {
        let edge = graph
            .get_edge(dependency, duplicate)
            .cloned()
            .unwrap_or_else(|| TaskEdge::new(dependency.clone(), duplicate.clone()));
        graph.add_edge_with(TaskEdge {
            target: canonical.clone(),
            ..edge
        })?;
    }

    let survivor = graph
        .get_task_mut(canonical)
        .ok_or_else(|| Error::UnknownNode(canonical.clone()))?;
    survivor.cost = survivor.cost.max(&dup.cost);
    survivor.priority = survivor.priority.max(dup.priority);
    let base = survivor
        .meta_number::<u8>(meta::BASE_PRIORITY)
        .unwrap_or(survivor.priority)
        .max(dup.meta_number(meta::BASE_PRIORITY).unwrap_or(dup.priority));
    survivor.set_meta(meta::BASE_PRIORITY, base.to_string());
    survivor.timeout_secs = match (survivor.timeout_secs, dup.timeout_secs) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    for (key, value) in &dup.metadata {
        survivor
            .metadata
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }

    graph.remove_node(duplicate)?;
    debug!(canonical = %canonical, merged = %duplicate, "duplicate node merged");
    Ok(())
}

// ========== Batching ==========

pub fn batch_id(level: usize, kind: &str) -> String {
    format!("batch-L{}-{}", level, kind)
}

/// Tag nodes that share a level and kind with a common batch ID.
fn batch(graph: &mut TaskGraph) -> Result<usize> {
    let mut groups: BTreeMap<(usize, String), Vec<TaskId>> = BTreeMap::new();
    for (id, level) in graph.node_levels()? {
        if let Some(node) = graph.get_task(&id) {
            groups
                .entry((level, node.kind.to_string()))
                .or_default()
                .push(id);
        }
    }

    let mut changed = 0;
    for ((level, kind), ids) in groups {
        let tag = (ids.len() > 1).then(|| batch_id(level, &kind));
        for id in ids {
            let Some(node) = graph.get_task_mut(&id) else {
                continue;
            };
            let dirty = match &tag {
                Some(tag) => node.set_meta(meta::BATCH_ID, tag.as_str()),
                None => node.clear_meta(meta::BATCH_ID),
            };
            changed += usize::from(dirty);
        }
    }
    Ok(changed)
}

// ========== Short-circuit ==========

/// Flag cacheable sinks and nodes whose cache key already completed.
///
/// Only skips this pass inferred are ever withdrawn; a `SKIP` flag the
/// caller set is left untouched.
fn short_circuit(graph: &mut TaskGraph, context: &OptimizationContext) -> usize {
    let mut changed = 0;
    for id in graph.task_ids() {
        let Some(node) = graph.get_task_mut(&id) else {
            continue;
        };
        let cacheable_sink = node.dependents.is_empty() && node.flag(meta::CACHEABLE);
        let cache_hit = node
            .metadata
            .get(meta::CACHE_KEY)
            .is_some_and(|key| context.completed_cache_keys.contains(key));

        let inferred = node.metadata.contains_key(meta::SKIP_INFERRED);
        let dirty = if cacheable_sink || cache_hit {
            // A caller-set skip stays caller-owned.
            if node.flag(meta::SKIP) && !inferred {
                false
            } else {
                node.set_meta(meta::SKIP, "true") | node.set_meta(meta::SKIP_INFERRED, "true")
            }
        } else if inferred {
            node.clear_meta(meta::SKIP) | node.clear_meta(meta::SKIP_INFERRED)
        } else {
            false
        };
        if dirty {
            trace!(task = %id, skip = cacheable_sink || cache_hit, "skip flag updated");
        }
        changed += usize::from(dirty);
    }
    changed
}

// ========== Cost sort ==========

/// Rank nodes within each level by weighted cost, cheapest first.
fn cost_sort(graph: &mut TaskGraph, weights: &CostWeights) -> Result<usize> {
    let mut changed = 0;
    for level in graph.topological_levels()? {
        let mut ranked: Vec<(f64, TaskId)> = level
            .into_iter()
            .filter_map(|id| graph.get_task(&id).map(|n| (weights.score(&n.cost), id)))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        for (rank, (_, id)) in ranked.into_iter().enumerate() {
            if let Some(node) = graph.get_task_mut(&id) {
                changed += usize::from(node.set_meta(meta::COST_RANK, rank.to_string()));
            }
        }
    }
    Ok(changed)
}
