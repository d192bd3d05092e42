//! Raw trace parsing and the typed record model.
//!
//! This module handles:
//! - Splitting raw per-context trace lines into fields
//! - Detecting command types from instrumentation markers
//! - Normalizing quoted command text
//! - Building typed ancestry frames and context ids

pub mod ancestry;
pub mod record;

// Re-export main types
pub use ancestry::{parse_ancestry, AncestryFrame, ContextId, FrameKind, SequenceId};
pub use record::{
    normalize_command, parse_context_log, parse_record, parse_timestamp, CommandType,
    ExecutionRecord, Micros,
};
