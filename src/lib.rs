//! Task graph construction, analysis, optimization, and execution.
//!
//! A [`TaskGraph`] is built from nodes and dependency edges, checked by the
//! [`analysis::GraphValidator`], measured by the [`analysis::GraphAnalyzer`],
//! rewritten by the [`optimize::OptimizationPipeline`], and finally run by
//! the [`orchestration::Scheduler`] over a pool of async workers. The
//! [`Engine`] wires those stages together.

pub mod analysis;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod export;
pub mod log;
pub mod optimize;
pub mod orchestration;

pub use crate::config::EngineConfig;
pub use crate::core::{TaskGraph, TaskId, TaskNode, TaskStatus};
pub use engine::{Engine, PreparedGraph};
pub use error::{Error, ErrorCategory, Result};
