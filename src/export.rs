//! Read-only serialization of a graph, optionally annotated with an
//! optimization report and an analysis.
//!
//! - JSON: full round-trip through [`ExportDocument`]
//! - DOT: Graphviz description for visualization tools
//! - Markdown: a table per node plus summaries for human review

use crate::analysis::GraphAnalysis;
use crate::core::task::meta;
use crate::core::{GraphDocument, TaskEdge, TaskGraph, TaskNode, TaskStatus};
use crate::error::Result;
use crate::optimize::OptimizationReport;
use petgraph::dot::{Config, Dot};
use petgraph::stable_graph::{EdgeReference, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

/// Optional material attached to an export.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions<'a> {
    pub report: Option<&'a OptimizationReport>,
    pub analysis: Option<&'a GraphAnalysis>,
}

impl<'a> ExportOptions<'a> {
    pub fn with_report(mut self, report: &'a OptimizationReport) -> Self {
        self.report = Some(report);
        self
    }

    pub fn with_analysis(mut self, analysis: &'a GraphAnalysis) -> Self {
        self.analysis = Some(analysis);
        self
    }
}

/// The JSON export format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub graph: GraphDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<OptimizationReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<GraphAnalysis>,
}

impl ExportDocument {
    pub fn new(graph: &TaskGraph, options: ExportOptions<'_>) -> Self {
        Self {
            graph: graph.to_document(),
            report: options.report.cloned(),
            analysis: options.analysis.cloned(),
        }
    }

    /// Rebuild the graph, validating it first.
    pub fn into_graph(self) -> Result<TaskGraph> {
        TaskGraph::from_document(self.graph)
    }
}

pub fn to_json(graph: &TaskGraph, options: ExportOptions<'_>) -> Result<String> {
    Ok(serde_json::to_string_pretty(&ExportDocument::new(
        graph, options,
    ))?)
}

pub fn from_json(json: &str) -> Result<ExportDocument> {
    Ok(serde_json::from_str(json)?)
}

// ========== DOT ==========

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn node_attributes(node: &TaskNode) -> String {
    let mut attrs = vec![format!(
        "label = \"{}\\n{} p{} {:.1}s\"",
        escape(&node.name),
        escape(node.kind.as_str()),
        node.priority,
        node.cost.duration_secs
    )];
    let fill = match node.status {
        TaskStatus::Completed => Some("palegreen"),
        TaskStatus::Failed { .. } => Some("salmon"),
        TaskStatus::Running => Some("lightblue"),
        TaskStatus::Blocked { .. } | TaskStatus::Cancelled => Some("lightgray"),
        TaskStatus::Pending | TaskStatus::Ready => None,
    };
    if let Some(fill) = fill {
        attrs.push(format!("style = filled, fillcolor = {}", fill));
    }
    if node.flag(meta::CRITICAL) {
        attrs.push("color = red, penwidth = 2".to_string());
    }
    if node.is_skippable() {
        attrs.push("peripheries = 2".to_string());
    }
    if let Some(batch) = node.metadata.get(meta::BATCH_ID) {
        attrs.push(format!("tooltip = \"{}\"", escape(batch)));
    }
    attrs.join(", ")
}

fn edge_attributes(edge: &TaskEdge) -> String {
    let mut attrs = Vec::new();
    if edge.kind != crate::core::EdgeKind::Dependency {
        attrs.push(format!("label = \"{}\"", escape(&edge.kind.to_string())));
    }
    if matches!(edge.kind, crate::core::EdgeKind::Weak) {
        attrs.push("style = dashed".to_string());
    }
    if (edge.weight - 1.0).abs() > f64::EPSILON {
        attrs.push(format!("penwidth = {:.1}", edge.weight.clamp(0.1, 8.0)));
    }
    attrs.join(", ")
}

/// Graphviz description of the graph.
///
/// Critical-path nodes are outlined in red, skippable nodes get a double
/// border, and node fill follows status. With a report attached, the graph
/// label summarizes it.
pub fn to_dot(graph: &TaskGraph, options: ExportOptions<'_>) -> String {
    let get_edge = |_: &StableDiGraph<TaskNode, TaskEdge>, e: EdgeReference<'_, TaskEdge>| {
        edge_attributes(e.weight())
    };
    let get_node = |_: &StableDiGraph<TaskNode, TaskEdge>, (_, n): (NodeIndex, &TaskNode)| {
        node_attributes(n)
    };
    let dot = Dot::with_attr_getters(
        graph.graph(),
        &[Config::NodeNoLabel, Config::EdgeNoLabel],
        &get_edge,
        &get_node,
    );
    let body = dot.to_string();

    let mut header = vec![format!("    label = \"{}\"", escape(graph.name()))];
    if let Some(report) = options.report {
        header[0] = format!("    label = \"{}\"", escape(&report.to_string()));
    }
    header.push("    labelloc = t".to_string());

    match body.split_once('\n') {
        Some((first, rest)) => format!("{}\n{}\n{}", first, header.join("\n"), rest),
        None => body,
    }
}

// ========== Markdown ==========

fn cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

/// Tabular document for human review.
pub fn to_markdown(graph: &TaskGraph, options: ExportOptions<'_>) -> Result<String> {
    let mut lines = vec![format!("# {}", cell(graph.name())), String::new()];
    lines.push(format!(
        "{} tasks, {} edges",
        graph.task_count(),
        graph.edge_count()
    ));
    lines.push(String::new());

    lines.push(
        "| ID | Name | Kind | Priority | Status | Duration (s) | Level | Batch | Skip | Depends on |"
            .to_string(),
    );
    lines.push("|---|---|---|---|---|---|---|---|---|---|".to_string());
    for id in graph.topological_order()? {
        let Some(node) = graph.get_task(&id) else {
            continue;
        };
        let deps: Vec<&str> = node.dependencies.iter().map(|d| d.as_str()).collect();
        lines.push(format!(
            "| {} | {} | {} | {} | {} | {:.2} | {} | {} | {} | {} |",
            cell(node.id.as_str()),
            cell(&node.name),
            cell(node.kind.as_str()),
            node.priority,
            node.status.name(),
            node.cost.duration_secs,
            node.metadata.get(meta::LEVEL).map(String::as_str).unwrap_or("-"),
            node.metadata
                .get(meta::BATCH_ID)
                .map(|b| cell(b))
                .unwrap_or_else(|| "-".to_string()),
            if node.is_skippable() { "yes" } else { "" },
            cell(&deps.join(", "))
        ));
    }

    let critical = graph.critical_path()?;
    lines.push(String::new());
    lines.push("## Critical path".to_string());
    lines.push(String::new());
    let path: Vec<&str> = critical.path.iter().map(|id| id.as_str()).collect();
    lines.push(format!(
        "{} ({:.2}s)",
        if path.is_empty() {
            "-".to_string()
        } else {
            path.join(" -> ")
        },
        critical.duration_secs
    ));

    if let Some(report) = options.report {
        lines.push(String::new());
        lines.push("## Optimization".to_string());
        lines.push(String::new());
        lines.push(format!(
            "- Nodes: {} -> {}",
            report.nodes_before, report.nodes_after
        ));
        lines.push(format!(
            "- Edges: {} -> {}",
            report.edges_before, report.edges_after
        ));
        lines.push(format!(
            "- Estimated time saved: {:.2}s",
            report.estimated_time_saved_secs
        ));
        lines.push(format!(
            "- Estimated cost saved: {:.2}",
            report.estimated_cost_saved
        ));
        lines.push(format!(
            "- Parallelization: {:.2} -> {:.2}",
            report.parallelization_before, report.parallelization_after
        ));
        lines.push(String::new());
        lines.push("| Pass | Changes |".to_string());
        lines.push("|---|---|".to_string());
        for pass in &report.passes {
            lines.push(format!("| {} | {} |", pass.pass, pass.changes));
        }
        for redundancy in &report.redundancies {
            let merged: Vec<&str> = redundancy.merged.iter().map(|id| id.as_str()).collect();
            lines.push(format!(
                "- Merged {} into {}",
                merged.join(", "),
                redundancy.canonical
            ));
        }
        for warning in &report.warnings {
            lines.push(format!("- Warning: {}", warning));
        }
    }

    if let Some(analysis) = options.analysis {
        lines.push(String::new());
        lines.push("## Analysis".to_string());
        lines.push(String::new());
        lines.push(format!(
            "- Health: {:.1} ({})",
            analysis.health.score, analysis.health.status
        ));
        lines.push(format!(
            "- Parallelization index: {:.2}",
            analysis.parallelization_index
        ));
        lines.push(format!(
            "- Speedup over sequential: {:.2}x",
            analysis.resources.parallel_speedup
        ));
        for b in &analysis.bottlenecks {
            lines.push(format!(
                "- Bottleneck: {} ({}, {} in / {} out)",
                b.task_id, b.role, b.fan_in, b.fan_out
            ));
        }
        for issue in &analysis.health.issues {
            lines.push(format!("- Issue: {}", issue));
        }
    }

    lines.push(String::new());
    Ok(lines.join("\n"))
}
