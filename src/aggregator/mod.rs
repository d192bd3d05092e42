//! Aggregation of merged trace data.
//!
//! This module transforms merged traces into:
//! - Loop-collapsed entry trees
//! - Folded stack format (for flamegraph rendering)
//! - Hot path analysis (top time consumers)
//! - Time distribution statistics

pub mod collapse;
pub mod metrics;
pub mod stack_builder;

// Re-export main types and functions
pub use collapse::{collapse_occurrences, merge_identical_forests, render_forest, CollapsedNode, Occurrence};
pub use metrics::{calculate_hot_paths, calculate_time_distribution, HotPath, TimeDistribution};
pub use stack_builder::{build_folded_stacks, sort_by_weight, FoldedStack};
