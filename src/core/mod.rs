//! Core domain models for the task graph engine.
//!
//! This module contains the fundamental data structures used throughout
//! the engine: task nodes, the dependency DAG, and conversion from
//! external task formats.

pub mod convert;
pub mod dag;
pub mod task;

pub use convert::{DependencyPattern, DependencyPatterns, GraphDocument, TaskSpec};
pub use dag::{CriticalPath, EdgeKind, TaskEdge, TaskGraph};
pub use task::{CostModel, TaskId, TaskKind, TaskNode, TaskStatus};
