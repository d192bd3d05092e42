//! Flamegraph trace lines.
//!
//! Every leaf command becomes one `frame;frame;...;command<TAB>micros`
//! line, the standard input format of flamegraph renderers. Lines are
//! collected per context while merging and published by the assembler.

pub mod trace;

// Re-export main types
pub use trace::{FlameLine, FlamegraphSink};
