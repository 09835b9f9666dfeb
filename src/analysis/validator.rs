//! Structural and schema validation of task graphs.
//!
//! [`GraphValidator`] never mutates its input. It re-verifies acyclicity
//! independently of the graph's own insertion checks so it can gate graphs
//! built from untrusted documents, then checks dangling references, orphan
//! nodes, and node attributes.

use crate::core::task::{meta, TaskId, TaskNode, MAX_PRIORITY};
use crate::core::{GraphDocument, TaskGraph};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Category of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Cycle,
    DanglingDependency,
    DuplicateNode,
    Orphan,
    Schema,
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    /// Node the finding is about, if any.
    pub node: Option<TaskId>,
    /// Other nodes involved (cycle members, missing dependency).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<TaskId>,
    pub message: String,
}

impl ValidationIssue {
    fn new(kind: IssueKind, node: Option<&TaskId>, related: Vec<TaskId>, message: String) -> Self {
        Self {
            kind,
            node: node.cloned(),
            related,
            message,
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Outcome of a validation run.
///
/// Errors block optimization and scheduling; warnings are informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl ValidationReport {
    fn error(&mut self, issue: ValidationIssue) {
        self.valid = false;
        self.errors.push(issue);
    }

    fn warning(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }

    /// Whether any error of the given kind was found.
    pub fn has_error(&self, kind: IssueKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "valid ({} warning(s))", self.warnings.len());
        }
        let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
        write!(f, "{} error(s): {}", self.errors.len(), messages.join("; "))
    }
}

/// Borrowed adjacency view shared by graph and document validation.
struct View<'a> {
    nodes: Vec<&'a TaskNode>,
    /// Node ID → dependency IDs (may reference unknown nodes).
    deps: BTreeMap<TaskId, Vec<TaskId>>,
}

impl<'a> View<'a> {
    fn from_graph(graph: &'a TaskGraph) -> Self {
        let mut nodes: Vec<&TaskNode> = graph.tasks().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let deps = nodes
            .iter()
            .map(|n| (n.id.clone(), n.dependencies.iter().cloned().collect()))
            .collect();
        Self { nodes, deps }
    }

    fn from_document(document: &'a GraphDocument) -> Self {
        Self {
            nodes: document.nodes.iter().collect(),
            deps: document.dependency_map(),
        }
    }

    fn known(&self) -> BTreeSet<&TaskId> {
        self.nodes.iter().map(|n| &n.id).collect()
    }
}

/// Validates graphs before optimization and scheduling.
#[derive(Debug, Clone, Default)]
pub struct GraphValidator;

impl GraphValidator {
    pub fn new() -> Self {
        Self
    }

    /// Full validation of a constructed graph.
    pub fn validate(&self, graph: &TaskGraph) -> ValidationReport {
        let report = self.run(&View::from_graph(graph), false);
        debug!(graph = %graph.name(), valid = report.valid, errors = report.errors.len(),
            warnings = report.warnings.len(), "graph validated");
        report
    }

    /// Full validation of an untrusted document, including duplicate IDs.
    pub fn validate_document(&self, document: &GraphDocument) -> ValidationReport {
        self.run(&View::from_document(document), true)
    }

    /// Cycle and dangling-dependency checks only, for low-latency gating.
    pub fn quick_check(&self, graph: &TaskGraph) -> bool {
        let view = View::from_graph(graph);
        let known = view.known();
        find_cycles(&view.deps, &known).is_empty() && dangling(&view.deps, &known).is_empty()
    }

    fn run(&self, view: &View<'_>, check_duplicates: bool) -> ValidationReport {
        let mut report = ValidationReport::default();
        let known = view.known();

        if check_duplicates {
            let mut seen = BTreeSet::new();
            for node in &view.nodes {
                if !seen.insert(&node.id) {
                    report.error(ValidationIssue::new(
                        IssueKind::DuplicateNode,
                        Some(&node.id),
                        Vec::new(),
                        format!("duplicate node id {}", node.id),
                    ));
                }
            }
        }

        // 1. Cycles
        for cycle in find_cycles(&view.deps, &known) {
            let names: Vec<&str> = cycle.iter().map(|id| id.as_str()).collect();
            report.error(ValidationIssue::new(
                IssueKind::Cycle,
                cycle.first(),
                cycle.clone(),
                format!("cycle detected: {}", names.join(" -> ")),
            ));
        }

        // 2. Dangling dependencies
        for (node, missing) in dangling(&view.deps, &known) {
            report.error(ValidationIssue::new(
                IssueKind::DanglingDependency,
                Some(&node),
                vec![missing.clone()],
                format!("node {} depends on unknown node {}", node, missing),
            ));
        }

        // 3. Orphans
        if view.nodes.len() > 1 {
            let mut has_dependents: BTreeSet<&TaskId> = BTreeSet::new();
            for deps in view.deps.values() {
                has_dependents.extend(deps.iter());
            }
            for node in &view.nodes {
                let has_deps = view.deps.get(&node.id).map_or(false, |d| !d.is_empty());
                let role = node.metadata.get(meta::ROLE).map(String::as_str);
                if !has_deps
                    && !has_dependents.contains(&node.id)
                    && !matches!(role, Some("root") | Some("sink"))
                {
                    report.warning(ValidationIssue::new(
                        IssueKind::Orphan,
                        Some(&node.id),
                        Vec::new(),
                        format!("node {} has no dependencies and no dependents", node.id),
                    ));
                }
            }
        }

        // 4. Schema
        for node in &view.nodes {
            for problem in schema_problems(node) {
                report.error(ValidationIssue::new(
                    IssueKind::Schema,
                    Some(&node.id),
                    Vec::new(),
                    format!("node {}: {}", node.id, problem),
                ));
            }
        }

        report
    }
}

fn schema_problems(node: &TaskNode) -> Vec<String> {
    let mut problems = Vec::new();
    if node.name.trim().is_empty() {
        problems.push("name is empty".to_string());
    }
    if node.priority > MAX_PRIORITY {
        problems.push(format!(
            "priority {} exceeds maximum {}",
            node.priority, MAX_PRIORITY
        ));
    }
    for field in node.cost.invalid_fields() {
        problems.push(format!("cost field {} must be a non-negative number", field));
    }
    if let Some(timeout) = node.timeout_secs {
        if !timeout.is_finite() || timeout < 0.0 {
            problems.push("timeout must be a non-negative number".to_string());
        }
    }
    problems
}

fn dangling(
    deps: &BTreeMap<TaskId, Vec<TaskId>>,
    known: &BTreeSet<&TaskId>,
) -> Vec<(TaskId, TaskId)> {
    let mut found = Vec::new();
    for (node, list) in deps {
        for dep in list {
            if !known.contains(dep) {
                found.push((node.clone(), dep.clone()));
            }
        }
    }
    found
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Iterative three-color DFS over dependency lists. Returns one entry per
/// back edge, each listing the cycle's members in dependency order.
fn find_cycles(
    deps: &BTreeMap<TaskId, Vec<TaskId>>,
    known: &BTreeSet<&TaskId>,
) -> Vec<Vec<TaskId>> {
    let empty = Vec::new();
    let mut marks: HashMap<&TaskId, Mark> = known.iter().map(|id| (*id, Mark::Unvisited)).collect();
    let mut cycles = Vec::new();

    for &start in known {
        if marks.get(start) != Some(&Mark::Unvisited) {
            continue;
        }
        marks.insert(start, Mark::InProgress);
        let mut stack: Vec<(&TaskId, usize)> = vec![(start, 0)];

        while let Some(&(node, cursor)) = stack.last() {
            let children = deps.get(node).unwrap_or(&empty);
            if cursor >= children.len() {
                marks.insert(node, Mark::Done);
                stack.pop();
                continue;
            }
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }

            let child = &children[cursor];
            match marks.get(child) {
                Some(Mark::Unvisited) => {
                    marks.insert(child, Mark::InProgress);
                    stack.push((child, 0));
                }
                Some(Mark::InProgress) => {
                    let from = stack.iter().position(|(id, _)| *id == child).unwrap_or(0);
                    let mut cycle: Vec<TaskId> =
                        stack[from..].iter().map(|(id, _)| (*id).clone()).collect();
                    cycle.reverse();
                    cycles.push(cycle);
                }
                // Done, or unknown (reported as dangling).
                _ => {}
            }
        }
    }

    cycles
}
