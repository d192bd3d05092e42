//! Per-context merging of raw trace logs.
//!
//! This module handles:
//! - The on-disk layout of a trace directory and run-wide merge state
//! - Resolving end times that were never recorded
//! - Disambiguated line ids and percent-of-context
//! - Rendering the full log with child contexts spliced in

pub mod context;
pub mod endtime;
pub mod line_id;
pub mod merger;
pub mod render;

// Re-export main types
pub use context::{ContextTotals, RunContext, TraceDir};
pub use endtime::EndTimeResolver;
pub use line_id::{assign_line_ids, LineId};
pub use merger::{merge_context, percent_of_context, MergeJob, MergeOutcome};
pub use render::{format_percent, format_secs, splice_child, EntryLine};
