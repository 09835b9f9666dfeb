//! Graph rewriting.
//!
//! [`OptimizationPipeline`] applies five passes in a fixed order to a copy
//! of a validated graph:
//!
//! 1. **Reordering**: annotate levels, boost critical-path priority
//! 2. **Redundancy elimination**: merge nodes with identical signatures
//! 3. **Batching**: tag same-level, same-kind nodes with a batch ID
//! 4. **Short-circuit**: flag cacheable sinks and cache hits as skippable
//! 5. **Cost sort**: rank nodes within a level, cheapest first
//!
//! Only pass 2 changes topology. Every pass is idempotent.

pub mod passes;
pub mod pipeline;
pub mod report;

pub use passes::{CostWeights, NodeSignature, PassKind, PassOutcome};
pub use pipeline::{OptimizationContext, OptimizationPipeline, OptimizerConfig};
pub use report::{OptimizationReport, PassStats, Redundancy};
