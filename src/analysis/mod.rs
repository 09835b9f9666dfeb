//! Validation and structural analysis of task graphs.

pub mod analyzer;
pub mod validator;

pub use analyzer::{
    AnalyzerConfig, Bottleneck, BottleneckRole, GraphAnalysis, GraphAnalyzer, HealthReport,
    HealthStatus, InfluenceScore, ResourceTotals,
};
pub use validator::{GraphValidator, IssueKind, ValidationIssue, ValidationReport};
