//! Integration test suite for dagflow.
//!
//! These tests drive the public API end to end: building graphs from flat
//! task lists, optimizing them, exporting the results, and executing them on
//! the async scheduler.
//!
//! # Test Categories
//!
//! - `pipeline_e2e`: Construction, optimization, and export
//! - `scheduling`: Engine execution, failure policies, and events
//! - `properties`: Randomized checks over generated DAGs

mod fixtures;

mod pipeline_e2e;
mod properties;
mod scheduling;
