//! Conversion between [`TaskGraph`] and external task formats.
//!
//! Two inputs are supported:
//! - [`GraphDocument`], the structured tree form used for full round-trips
//! - flat [`TaskSpec`] lists produced by an upstream planning layer, with
//!   edges taken from explicit dependency names or inferred from a
//!   caller-supplied [`DependencyPatterns`] table
//!
//! Both paths treat their input as untrusted and run it through
//! [`GraphValidator::validate_document`] before any node is built.

use crate::analysis::GraphValidator;
use crate::core::dag::{TaskEdge, TaskGraph};
use crate::core::task::{CostModel, TaskId, TaskKind, TaskNode, DEFAULT_PRIORITY};
use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Serializable tree form of a graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub nodes: Vec<TaskNode>,
    #[serde(default)]
    pub edges: Vec<TaskEdge>,
}

impl GraphDocument {
    /// Dependency IDs of every node: the union of each node's declared
    /// `dependencies` and the sources of edges targeting it.
    pub fn dependency_map(&self) -> BTreeMap<TaskId, Vec<TaskId>> {
        let mut deps: BTreeMap<TaskId, Vec<TaskId>> = BTreeMap::new();
        for node in &self.nodes {
            let entry = deps.entry(node.id.clone()).or_default();
            entry.extend(node.dependencies.iter().cloned());
        }
        for edge in &self.edges {
            deps.entry(edge.target.clone())
                .or_default()
                .push(edge.source.clone());
        }
        for list in deps.values_mut() {
            list.sort();
            list.dedup();
        }
        deps
    }
}

/// One record of the planning layer's flat task list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(rename = "type", default)]
    pub kind: TaskKind,
    /// Names of tasks this one depends on. `None` lets dependency patterns
    /// decide; `Some(vec![])` means explicitly independent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostModel>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

impl TaskSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            priority: DEFAULT_PRIORITY,
            kind: TaskKind::Generic,
            dependencies: None,
            cost: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<TaskKind>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn depends_on(mut self, names: &[&str]) -> Self {
        self.dependencies = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }
}

/// A name-based implicit dependency: tasks whose name matches `task`
/// depend on every other task whose name matches `depends_on`.
#[derive(Debug, Clone)]
pub struct DependencyPattern {
    task: Regex,
    depends_on: Regex,
}

impl DependencyPattern {
    pub fn new(task: &str, depends_on: &str) -> Result<Self> {
        Ok(Self {
            task: Regex::new(task)?,
            depends_on: Regex::new(depends_on)?,
        })
    }

    fn applies(&self, task_name: &str, candidate_name: &str) -> bool {
        self.task.is_match(task_name) && self.depends_on.is_match(candidate_name)
    }
}

/// Pattern table for one workflow family, owned by the caller.
///
/// ```
/// use dagflow::core::DependencyPatterns;
///
/// let patterns = DependencyPatterns::new()
///     .rule("^store", "^fetch")
///     .unwrap();
/// assert_eq!(patterns.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DependencyPatterns {
    rules: Vec<DependencyPattern>,
}

impl DependencyPatterns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule; both arguments are regular expressions over task names.
    pub fn rule(mut self, task: &str, depends_on: &str) -> Result<Self> {
        self.rules.push(DependencyPattern::new(task, depends_on)?);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn implies(&self, task_name: &str, candidate_name: &str) -> bool {
        self.rules.iter().any(|r| r.applies(task_name, candidate_name))
    }
}

impl TaskGraph {
    /// Serialize into the structured tree form.
    ///
    /// Nodes are sorted by ID and edges by `(source, target)`.
    pub fn to_document(&self) -> GraphDocument {
        let mut nodes: Vec<TaskNode> = self.tasks().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut edges: Vec<TaskEdge> = self.edges().cloned().collect();
        edges.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
        GraphDocument {
            name: self.name().to_string(),
            metadata: self.metadata().clone(),
            nodes,
            edges,
        }
    }

    /// Build a graph from an untrusted document.
    ///
    /// Node dependency sets that are not backed by an edge become plain
    /// dependency edges; node statuses and metadata are preserved.
    ///
    /// # Errors
    /// [`Error::Validation`] carrying the full report when the document
    /// contains cycles, dangling references, duplicate IDs, or schema errors.
    pub fn from_document(document: GraphDocument) -> Result<Self> {
        let report = GraphValidator::new().validate_document(&document);
        if !report.valid {
            return Err(Error::Validation(Box::new(report)));
        }

        let dependencies = document.dependency_map();
        let mut graph = TaskGraph::new(&document.name);
        *graph.metadata_mut() = document.metadata;
        for node in document.nodes {
            graph.add_node(node)?;
        }
        for edge in document.edges {
            graph.add_edge_with(edge)?;
        }
        for (target, sources) in dependencies {
            for source in sources {
                graph.add_edge(&source, &target)?;
            }
        }

        debug!(
            graph = %graph.name(),
            tasks = graph.task_count(),
            edges = graph.edge_count(),
            "graph built from document"
        );
        Ok(graph)
    }

    /// Build a graph from the planning layer's flat task list.
    ///
    /// Each task gets its name as ID; repeated names get `-2`, `-3`, ...
    /// suffixes, skipping any suffixed ID that is already a task name. A
    /// dependency name refers to every task carrying that name.
    /// Tasks without an explicit dependency list take edges from `patterns`;
    /// an inferred edge that would close a cycle is skipped with a warning.
    ///
    /// # Errors
    /// [`Error::Validation`] if explicit dependencies name unknown tasks or
    /// form a cycle.
    pub fn from_specs(
        name: &str,
        specs: &[TaskSpec],
        patterns: Option<&DependencyPatterns>,
    ) -> Result<Self> {
        // Every distinct name keeps its own ID; suffixes skip anything taken.
        let mut taken: HashSet<String> = specs.iter().map(|s| s.name.clone()).collect();
        let mut named: HashSet<&str> = HashSet::new();
        let mut suffixes: HashMap<&str, usize> = HashMap::new();
        let ids: Vec<TaskId> = specs
            .iter()
            .map(|spec| {
                let name = spec.name.as_str();
                if named.insert(name) {
                    return TaskId::from(name);
                }
                let suffix = suffixes.entry(name).or_insert(1);
                loop {
                    *suffix += 1;
                    let candidate = format!("{}-{}", name, suffix);
                    if taken.insert(candidate.clone()) {
                        break TaskId::from(candidate);
                    }
                }
            })
            .collect();

        let mut by_name: HashMap<&str, Vec<&TaskId>> = HashMap::new();
        for (spec, id) in specs.iter().zip(&ids) {
            by_name.entry(spec.name.as_str()).or_default().push(id);
        }

        let mut nodes = Vec::with_capacity(specs.len());
        for (spec, id) in specs.iter().zip(&ids) {
            let mut node = TaskNode::new(id.clone(), &spec.name)
                .with_kind(spec.kind.clone())
                .with_priority(spec.priority)
                .with_cost(spec.cost.unwrap_or_default());
            node.metadata = spec.metadata.clone();
            for dep_name in spec.dependencies.iter().flatten() {
                match by_name.get(dep_name.as_str()) {
                    Some(targets) => {
                        for target in targets {
                            if *target != id {
                                node.dependencies.insert((*target).clone());
                            }
                        }
                    }
                    // Kept so the validator reports it as dangling.
                    None => {
                        node.dependencies.insert(TaskId::from(dep_name.as_str()));
                    }
                }
            }
            nodes.push(node);
        }

        let mut graph = Self::from_document(GraphDocument {
            name: name.to_string(),
            metadata: BTreeMap::new(),
            nodes,
            edges: Vec::new(),
        })?;

        if let Some(patterns) = patterns.filter(|p| !p.is_empty()) {
            for (spec, id) in specs.iter().zip(&ids) {
                if spec.dependencies.is_some() {
                    continue;
                }
                for (candidate, candidate_id) in specs.iter().zip(&ids) {
                    if candidate_id == id || !patterns.implies(&spec.name, &candidate.name) {
                        continue;
                    }
                    match graph.add_edge(candidate_id, id) {
                        Ok(()) => {}
                        Err(Error::Cycle { from, to }) => {
                            warn!(%from, %to, "skipping inferred dependency that would create a cycle");
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        Ok(graph)
    }
}
