//! Task DAG (Directed Acyclic Graph) for dependency management.
//!
//! [`TaskGraph`] stores nodes in a petgraph `StableDiGraph` arena indexed by
//! [`TaskId`]. Every structural mutation is validated before it is applied,
//! so the graph is acyclic at all times and each node's dependency and
//! dependent sets always agree with the edge list.

use crate::core::task::{TaskId, TaskNode, TaskStatus};
use crate::error::{Error, Result};
use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, trace};

/// Kind of relationship between two tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum EdgeKind {
    /// Target cannot start before source completes.
    Dependency,
    /// Ordering with timing bounds between source completion and target start.
    Constraint {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_delay_secs: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_delay_secs: Option<f64>,
    },
    /// Target consumes the output of source.
    DataFlow,
    /// Target only matters when `condition` holds for the source result.
    Conditional { condition: String },
    /// Soft ordering hint.
    Weak,
}

impl Default for EdgeKind {
    fn default() -> Self {
        Self::Dependency
    }
}

impl EdgeKind {
    pub fn label(&self) -> &'static str {
        match self {
            EdgeKind::Dependency => "dependency",
            EdgeKind::Constraint { .. } => "constraint",
            EdgeKind::DataFlow => "data_flow",
            EdgeKind::Conditional { .. } => "conditional",
            EdgeKind::Weak => "weak",
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeKind::Conditional { condition } => write!(f, "conditional: {}", condition),
            other => write!(f, "{}", other.label()),
        }
    }
}

/// A directed relationship `source → target` (target depends on source).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEdge {
    pub source: TaskId,
    pub target: TaskId,
    #[serde(default)]
    pub kind: EdgeKind,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Named numeric constraints, e.g. `max_delay`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constraints: BTreeMap<String, f64>,
}

fn default_weight() -> f64 {
    1.0
}

impl TaskEdge {
    /// A plain dependency edge with weight 1.
    pub fn new(source: impl Into<TaskId>, target: impl Into<TaskId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind: EdgeKind::Dependency,
            weight: default_weight(),
            constraints: BTreeMap::new(),
        }
    }

    pub fn with_kind(mut self, kind: EdgeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_constraint(mut self, name: &str, value: f64) -> Self {
        self.constraints.insert(name.to_string(), value);
        self
    }
}

impl std::fmt::Display for TaskEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

/// Longest-duration path through the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriticalPath {
    /// Node IDs from root to sink.
    pub path: Vec<TaskId>,
    /// Sum of estimated durations along the path, in seconds.
    pub duration_secs: f64,
}

impl CriticalPath {
    pub fn contains(&self, id: &TaskId) -> bool {
        self.path.contains(id)
    }
}

/// The task dependency graph.
#[derive(Clone)]
pub struct TaskGraph {
    name: String,
    metadata: BTreeMap<String, String>,
    /// Node arena; edges point from dependency to dependent.
    graph: StableDiGraph<TaskNode, TaskEdge>,
    /// Index mapping from TaskId to NodeIndex for fast lookups.
    task_index: HashMap<TaskId, NodeIndex>,
}

impl TaskGraph {
    /// Create a new empty graph.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            metadata: BTreeMap::new(),
            graph: StableDiGraph::new(),
            task_index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.metadata
    }

    /// Add a node to the graph.
    ///
    /// The node's `dependencies`/`dependents` sets are reset; relationships
    /// are established only through [`add_edge`](Self::add_edge).
    ///
    /// # Errors
    /// Returns [`Error::DuplicateNode`] if a node with the same ID exists.
    pub fn add_node(&mut self, mut node: TaskNode) -> Result<NodeIndex> {
        if self.task_index.contains_key(&node.id) {
            return Err(Error::DuplicateNode(node.id));
        }

        node.dependencies.clear();
        node.dependents.clear();
        let id = node.id.clone();
        let index = self.graph.add_node(node);
        self.task_index.insert(id, index);
        Ok(index)
    }

    /// Add a plain dependency edge: `to` depends on `from`.
    pub fn add_edge(&mut self, from: &TaskId, to: &TaskId) -> Result<()> {
        self.add_edge_with(TaskEdge::new(from.clone(), to.clone()))
    }

    /// Add an edge, rejecting it before any mutation if it is invalid.
    ///
    /// Re-adding an existing `source → target` pair is a no-op.
    ///
    /// # Errors
    /// - [`Error::UnknownNode`] if either endpoint is missing
    /// - [`Error::Cycle`] if `source` is reachable from `target`
    pub fn add_edge_with(&mut self, edge: TaskEdge) -> Result<()> {
        let from_index = self.index_of(&edge.source)?;
        let to_index = self.index_of(&edge.target)?;

        if self.graph.find_edge(from_index, to_index).is_some() {
            return Ok(());
        }

        // Depth-first search from the target back to the source.
        if from_index == to_index || has_path_connecting(&self.graph, to_index, from_index, None)
        {
            debug!(from = %edge.source, to = %edge.target, "edge rejected: would create a cycle");
            return Err(Error::Cycle {
                from: edge.source,
                to: edge.target,
            });
        }

        let (source, target) = (edge.source.clone(), edge.target.clone());
        self.graph.add_edge(from_index, to_index, edge);
        self.graph[from_index].dependents.insert(target.clone());
        self.graph[to_index].dependencies.insert(source.clone());
        trace!(from = %source, to = %target, "edge added");
        Ok(())
    }

    /// Remove the edge `from → to`, updating both endpoints.
    pub fn remove_edge(&mut self, from: &TaskId, to: &TaskId) -> Result<TaskEdge> {
        let from_index = self.index_of(from)?;
        let to_index = self.index_of(to)?;
        let edge_index =
            self.graph
                .find_edge(from_index, to_index)
                .ok_or_else(|| Error::UnknownEdge {
                    from: from.clone(),
                    to: to.clone(),
                })?;

        let edge = self
            .graph
            .remove_edge(edge_index)
            .ok_or_else(|| Error::UnknownEdge {
                from: from.clone(),
                to: to.clone(),
            })?;
        self.graph[from_index].dependents.remove(to);
        self.graph[to_index].dependencies.remove(from);
        Ok(edge)
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, id: &TaskId) -> Result<TaskNode> {
        let index = self.index_of(id)?;
        let (dependencies, dependents) = {
            let node = &self.graph[index];
            (node.dependencies.clone(), node.dependents.clone())
        };

        for dep in &dependencies {
            if let Some(&dep_index) = self.task_index.get(dep) {
                self.graph[dep_index].dependents.remove(id);
            }
        }
        for dependent in &dependents {
            if let Some(&dependent_index) = self.task_index.get(dependent) {
                self.graph[dependent_index].dependencies.remove(id);
            }
        }

        self.task_index.remove(id);
        let mut node = self
            .graph
            .remove_node(index)
            .ok_or_else(|| Error::UnknownNode(id.clone()))?;
        node.dependencies.clear();
        node.dependents.clear();
        Ok(node)
    }

    fn index_of(&self, id: &TaskId) -> Result<NodeIndex> {
        self.task_index
            .get(id)
            .copied()
            .ok_or_else(|| Error::UnknownNode(id.clone()))
    }

    /// Get a reference to a task by its ID.
    pub fn get_task(&self, id: &TaskId) -> Option<&TaskNode> {
        self.task_index
            .get(id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    /// Get a mutable reference to a task by its ID.
    ///
    /// Intended for status, priority, and metadata updates. Edit edges
    /// through the graph, never through the node's dependency sets.
    pub fn get_task_mut(&mut self, id: &TaskId) -> Option<&mut TaskNode> {
        match self.task_index.get(id) {
            Some(&index) => self.graph.node_weight_mut(index),
            None => None,
        }
    }

    pub fn get_edge(&self, from: &TaskId, to: &TaskId) -> Option<&TaskEdge> {
        let from_idx = self.task_index.get(from)?;
        let to_idx = self.task_index.get(to)?;
        let edge = self.graph.find_edge(*from_idx, *to_idx)?;
        self.graph.edge_weight(edge)
    }

    pub fn has_edge(&self, from: &TaskId, to: &TaskId) -> bool {
        self.get_edge(from, to).is_some()
    }

    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.task_index.contains_key(id)
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// All nodes, in arena order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.graph
            .node_indices()
            .filter_map(move |index| self.graph.node_weight(index))
    }

    /// All node IDs, sorted.
    pub fn task_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.task_index.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// All edges, in arena order.
    pub fn edges(&self) -> impl Iterator<Item = &TaskEdge> {
        self.graph
            .edge_indices()
            .filter_map(move |index| self.graph.edge_weight(index))
    }

    /// Tasks that the given task depends on.
    pub fn dependencies_of(&self, id: &TaskId) -> Vec<&TaskNode> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Tasks that depend on the given task.
    pub fn dependents_of(&self, id: &TaskId) -> Vec<&TaskNode> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &TaskId, direction: Direction) -> Vec<&TaskNode> {
        match self.task_index.get(id) {
            Some(&index) => self
                .graph
                .neighbors_directed(index, direction)
                .filter_map(|n| self.graph.node_weight(n))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Nodes without dependencies, sorted by ID.
    pub fn roots(&self) -> Vec<TaskId> {
        let mut roots: Vec<TaskId> = self
            .tasks()
            .filter(|t| t.dependencies.is_empty())
            .map(|t| t.id.clone())
            .collect();
        roots.sort();
        roots
    }

    /// Nodes without dependents, sorted by ID.
    pub fn sinks(&self) -> Vec<TaskId> {
        let mut sinks: Vec<TaskId> = self
            .tasks()
            .filter(|t| t.dependents.is_empty())
            .map(|t| t.id.clone())
            .collect();
        sinks.sort();
        sinks
    }

    // ========== Ordering ==========

    /// Nodes grouped by dependency level using Kahn's algorithm.
    ///
    /// Each round removes every node whose remaining in-degree is zero, so a
    /// node's group index equals its longest-path distance from a root.
    /// IDs within a level are sorted.
    ///
    /// # Errors
    /// [`Error::CycleDetected`] if some nodes never reach in-degree zero.
    /// Unreachable while edges are added through [`add_edge_with`](Self::add_edge_with).
    pub fn topological_levels(&self) -> Result<Vec<Vec<TaskId>>> {
        let mut in_degree: HashMap<&TaskId, usize> = self
            .tasks()
            .map(|t| (&t.id, t.dependencies.len()))
            .collect();

        let mut current: Vec<&TaskId> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        current.sort();

        let mut levels = Vec::new();
        let mut visited = 0;
        while !current.is_empty() {
            visited += current.len();
            let mut next = Vec::new();
            for id in &current {
                if let Some(node) = self.get_task(id) {
                    for dependent in &node.dependents {
                        if let Some(degree) = in_degree.get_mut(dependent) {
                            *degree -= 1;
                            if *degree == 0 {
                                next.push(dependent);
                            }
                        }
                    }
                }
            }
            next.sort();
            levels.push(current.into_iter().cloned().collect());
            current = next;
        }

        if visited != self.task_count() {
            let mut stuck: Vec<TaskId> = in_degree
                .into_iter()
                .filter(|(_, d)| *d > 0)
                .map(|(id, _)| id.clone())
                .collect();
            stuck.sort();
            return Err(Error::CycleDetected(stuck));
        }

        Ok(levels)
    }

    /// Flat topological order: every node after all of its dependencies.
    pub fn topological_order(&self) -> Result<Vec<TaskId>> {
        Ok(self.topological_levels()?.into_iter().flatten().collect())
    }

    /// Longest-path distance of each node from any root.
    pub fn node_levels(&self) -> Result<BTreeMap<TaskId, usize>> {
        Ok(self
            .topological_levels()?
            .into_iter()
            .enumerate()
            .flat_map(|(level, ids)| ids.into_iter().map(move |id| (id, level)))
            .collect())
    }

    /// The path maximizing cumulative estimated duration.
    ///
    /// Single-pass longest-path dynamic programming over the topological
    /// order. Ties resolve to the smallest ID, so the result is deterministic.
    pub fn critical_path(&self) -> Result<CriticalPath> {
        let order = self.topological_order()?;
        let mut best: HashMap<&TaskId, (f64, Option<&TaskId>)> = HashMap::new();
        let mut end: Option<(&TaskId, f64)> = None;

        for id in &order {
            let Some(node) = self.get_task(id) else {
                continue;
            };
            let mut pred: Option<(&TaskId, f64)> = None;
            for dep in &node.dependencies {
                let dist = best.get(dep).map(|(d, _)| *d).unwrap_or(0.0);
                if pred.map_or(true, |(_, p)| dist > p) {
                    pred = Some((dep, dist));
                }
            }
            let dist = pred.map_or(0.0, |(_, d)| d) + node.cost.duration_secs;
            best.insert(id, (dist, pred.map(|(p, _)| p)));
            if end.map_or(true, |(_, d)| dist > d) {
                end = Some((id, dist));
            }
        }

        let Some((end_id, duration_secs)) = end else {
            return Ok(CriticalPath::default());
        };

        let mut path = vec![end_id.clone()];
        let mut cursor = best.get(end_id).and_then(|(_, p)| *p);
        while let Some(id) = cursor {
            path.push(id.clone());
            cursor = best.get(id).and_then(|(_, p)| *p);
        }
        path.reverse();

        Ok(CriticalPath {
            path,
            duration_secs,
        })
    }

    /// Sum of every node's estimated duration (fully serial execution).
    pub fn sequential_duration(&self) -> f64 {
        self.tasks().map(|t| t.cost.duration_secs).sum()
    }

    // ========== Scheduling Views ==========

    /// Pending tasks whose dependencies have all completed.
    pub fn ready_tasks(&self) -> Vec<TaskId> {
        let mut ready: Vec<TaskId> = self
            .tasks()
            .filter(|t| t.status == TaskStatus::Pending && self.dependencies_completed(&t.id))
            .map(|t| t.id.clone())
            .collect();
        ready.sort();
        ready
    }

    /// Whether every dependency of `id` has completed.
    pub fn dependencies_completed(&self, id: &TaskId) -> bool {
        self.get_task(id)
            .map(|node| {
                node.dependencies.iter().all(|dep| {
                    self.get_task(dep)
                        .map(|d| d.status == TaskStatus::Completed)
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }

    /// Every node reachable downstream of `id`, excluding `id`.
    pub fn transitive_dependents(&self, id: &TaskId) -> BTreeSet<TaskId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&TaskId> = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.get_task(current) {
                for dependent in &node.dependents {
                    if seen.insert(dependent.clone()) {
                        stack.push(dependent);
                    }
                }
            }
        }
        seen
    }

    /// Count of nodes per status name.
    pub fn status_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for task in self.tasks() {
            *counts.entry(task.status.name()).or_insert(0) += 1;
        }
        counts
    }

    /// Underlying petgraph storage for read-only algorithms and export.
    pub fn graph(&self) -> &StableDiGraph<TaskNode, TaskEdge> {
        &self.graph
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new("graph")
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("name", &self.name)
            .field("tasks", &self.task_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::CostModel;

    fn node(id: &str, duration: f64) -> TaskNode {
        TaskNode::new(id, id).with_cost(CostModel::with_duration(duration))
    }

    fn id(s: &str) -> TaskId {
        TaskId::from(s)
    }

    /// A → B, A → C, B → D, C → D with the C branch heavier.
    fn diamond() -> TaskGraph {
        let mut graph = TaskGraph::new("diamond");
        graph.add_node(node("A", 1.0)).unwrap();
        graph.add_node(node("B", 2.0)).unwrap();
        graph.add_node(node("C", 5.0)).unwrap();
        graph.add_node(node("D", 1.0)).unwrap();
        graph.add_edge(&id("A"), &id("B")).unwrap();
        graph.add_edge(&id("A"), &id("C")).unwrap();
        graph.add_edge(&id("B"), &id("D")).unwrap();
        graph.add_edge(&id("C"), &id("D")).unwrap();
        graph
    }

    // EdgeKind tests

    #[test]
    fn test_edge_kind_default() {
        assert_eq!(EdgeKind::default(), EdgeKind::Dependency);
    }

    #[test]
    fn test_edge_kind_display() {
        assert_eq!(EdgeKind::DataFlow.to_string(), "data_flow");
        assert_eq!(
            EdgeKind::Conditional {
                condition: "ok".into()
            }
            .to_string(),
            "conditional: ok"
        );
    }

    #[test]
    fn test_edge_kind_serialization() {
        let kind = EdgeKind::Constraint {
            min_delay_secs: None,
            max_delay_secs: Some(30.0),
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert!(json.contains("\"type\":\"constraint\""));
        assert!(!json.contains("min_delay_secs"));
        let parsed: EdgeKind = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, kind);
    }

    // Node tests

    #[test]
    fn test_graph_new() {
        let graph = TaskGraph::new("g");
        assert!(graph.is_empty());
        assert_eq!(graph.name(), "g");
        assert!(format!("{:?}", graph).contains("TaskGraph"));
    }

    #[test]
    fn test_add_node_duplicate() {
        let mut graph = TaskGraph::new("g");
        graph.add_node(node("A", 1.0)).unwrap();
        let err = graph.add_node(node("A", 2.0)).unwrap_err();
        assert!(matches!(err, Error::DuplicateNode(ref d) if d == &id("A")));
        assert_eq!(graph.task_count(), 1);
    }

    #[test]
    fn test_add_node_resets_relationship_sets() {
        let mut graph = TaskGraph::new("g");
        let mut n = node("A", 1.0);
        n.dependencies.insert(id("ghost"));
        graph.add_node(n).unwrap();
        assert!(graph.get_task(&id("A")).unwrap().dependencies.is_empty());
    }

    // Edge tests

    #[test]
    fn test_add_edge_updates_both_sets() {
        let graph = diamond();
        let a = graph.get_task(&id("A")).unwrap();
        let d = graph.get_task(&id("D")).unwrap();
        assert!(a.dependents.contains(&id("B")));
        assert!(a.dependents.contains(&id("C")));
        assert!(d.dependencies.contains(&id("B")));
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.dependencies_of(&id("D")).len(), 2);
        assert_eq!(graph.dependents_of(&id("A")).len(), 2);
    }

    #[test]
    fn test_add_edge_unknown_node() {
        let mut graph = diamond();
        let err = graph.add_edge(&id("A"), &id("Z")).unwrap_err();
        assert!(matches!(err, Error::UnknownNode(ref n) if n == &id("Z")));
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn test_add_edge_is_idempotent() {
        let mut graph = diamond();
        graph.add_edge(&id("A"), &id("B")).unwrap();
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn test_add_edge_preserves_kind() {
        let mut graph = diamond();
        graph.add_node(node("E", 1.0)).unwrap();
        graph
            .add_edge_with(
                TaskEdge::new("D", "E")
                    .with_kind(EdgeKind::DataFlow)
                    .with_weight(2.5)
                    .with_constraint("max_delay", 10.0),
            )
            .unwrap();
        let edge = graph.get_edge(&id("D"), &id("E")).unwrap();
        assert_eq!(edge.kind, EdgeKind::DataFlow);
        assert_eq!(edge.weight, 2.5);
        assert_eq!(edge.constraints.get("max_delay"), Some(&10.0));
    }

    // Cycle detection tests

    #[test]
    fn test_cycle_self_loop_rejected() {
        let mut graph = diamond();
        let err = graph.add_edge(&id("A"), &id("A")).unwrap_err();
        assert!(err.to_string().contains("cycle"));
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn test_cycle_long_rejected_and_graph_unchanged() {
        let mut graph = diamond();
        let before = graph.get_task(&id("A")).unwrap().dependencies.clone();
        let err = graph.add_edge(&id("D"), &id("A")).unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }));
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.get_task(&id("A")).unwrap().dependencies, before);
        assert!(!graph.get_task(&id("D")).unwrap().dependents.contains(&id("A")));
    }

    // Removal tests

    #[test]
    fn test_remove_edge() {
        let mut graph = diamond();
        let edge = graph.remove_edge(&id("B"), &id("D")).unwrap();
        assert_eq!(edge.source, id("B"));
        assert!(!graph.get_task(&id("B")).unwrap().dependents.contains(&id("D")));
        assert!(!graph.get_task(&id("D")).unwrap().dependencies.contains(&id("B")));
        assert!(matches!(
            graph.remove_edge(&id("B"), &id("D")),
            Err(Error::UnknownEdge { .. })
        ));
    }

    #[test]
    fn test_remove_node_cleans_neighbors() {
        let mut graph = diamond();
        let removed = graph.remove_node(&id("B")).unwrap();
        assert_eq!(removed.id, id("B"));
        assert_eq!(graph.task_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert!(!graph.get_task(&id("A")).unwrap().dependents.contains(&id("B")));
        assert!(!graph.get_task(&id("D")).unwrap().dependencies.contains(&id("B")));
        assert!(graph.remove_node(&id("B")).is_err());
    }

    // Ordering tests

    #[test]
    fn test_topological_levels_diamond() {
        let levels = diamond().topological_levels().unwrap();
        assert_eq!(
            levels,
            vec![vec![id("A")], vec![id("B"), id("C")], vec![id("D")]]
        );
    }

    #[test]
    fn test_topological_order_respects_dependencies() {
        let graph = diamond();
        let order = graph.topological_order().unwrap();
        let pos = |s: &str| order.iter().position(|x| x == &id(s)).unwrap();
        assert!(pos("A") < pos("B"));
        assert!(pos("B") < pos("D"));
        assert!(pos("C") < pos("D"));
    }

    #[test]
    fn test_node_levels_use_longest_path() {
        let mut graph = diamond();
        // A → D shortcut must not pull D up a level.
        graph.add_edge(&id("A"), &id("D")).unwrap();
        let levels = graph.node_levels().unwrap();
        assert_eq!(levels[&id("A")], 0);
        assert_eq!(levels[&id("C")], 1);
        assert_eq!(levels[&id("D")], 2);
    }

    #[test]
    fn test_critical_path_diamond() {
        let cp = diamond().critical_path().unwrap();
        assert_eq!(cp.path, vec![id("A"), id("C"), id("D")]);
        assert_eq!(cp.duration_secs, 7.0);
        assert!(cp.contains(&id("C")));
    }

    #[test]
    fn test_critical_path_empty() {
        let cp = TaskGraph::new("g").critical_path().unwrap();
        assert!(cp.path.is_empty());
        assert_eq!(cp.duration_secs, 0.0);
    }

    #[test]
    fn test_sequential_duration() {
        assert_eq!(diamond().sequential_duration(), 9.0);
    }

    // Scheduling view tests

    #[test]
    fn test_ready_tasks_follow_completion() {
        let mut graph = diamond();
        assert_eq!(graph.ready_tasks(), vec![id("A")]);
        graph.get_task_mut(&id("A")).unwrap().complete();
        assert_eq!(graph.ready_tasks(), vec![id("B"), id("C")]);
        graph.get_task_mut(&id("B")).unwrap().complete();
        assert_eq!(graph.ready_tasks(), vec![id("C")]);
    }

    #[test]
    fn test_transitive_dependents() {
        let graph = diamond();
        let downstream = graph.transitive_dependents(&id("B"));
        assert_eq!(downstream.into_iter().collect::<Vec<_>>(), vec![id("D")]);
        assert_eq!(graph.transitive_dependents(&id("A")).len(), 3);
    }

    #[test]
    fn test_roots_and_sinks() {
        let graph = diamond();
        assert_eq!(graph.roots(), vec![id("A")]);
        assert_eq!(graph.sinks(), vec![id("D")]);
    }

    #[test]
    fn test_status_counts() {
        let mut graph = diamond();
        graph.get_task_mut(&id("A")).unwrap().complete();
        let counts = graph.status_counts();
        assert_eq!(counts.get("completed"), Some(&1));
        assert_eq!(counts.get("pending"), Some(&3));
    }

    #[test]
    fn test_clone_is_independent() {
        let original = diamond();
        let mut copy = original.clone();
        copy.remove_node(&id("D")).unwrap();
        assert_eq!(original.task_count(), 4);
        assert_eq!(copy.task_count(), 3);
    }
}
