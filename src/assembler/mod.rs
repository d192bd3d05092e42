//! Final assembly of the merged root context.
//!
//! This module handles:
//! - Adding percent-of-total next to percent-of-parent
//! - Total run-time footers
//! - Folding the raw flamegraph trace
//! - Publishing the text artifacts and the JSON summary

pub mod cleanup;
pub mod percent;
pub mod publish;

// Re-export main types and functions
pub use cleanup::strip_substitution_markers;
pub use percent::{add_percent_of_total, entry_runtime, percent_of_total, with_footer};
pub use publish::{assemble, Artifacts};
