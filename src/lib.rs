//! cmdtrace
//!
//! Post-processing engine for per-command shell execution traces.
//!
//! An instrumented shell writes one raw log per context (function call,
//! subshell, or forked process). This crate merges those logs bottom-up
//! into a single tree-drawn profile with per-command runtimes, a
//! loop-collapsed profile, and flamegraph traces.
//!
//! ## Getting Started
//!
//! ```ignore
//! use cmdtrace::commands::{execute_profile, ProfileArgs};
//!
//! let report = execute_profile(ProfileArgs::new("/tmp/trace"))?;
//! println!("{}", report.artifacts.full_profile.display());
//! ```

pub mod aggregator;
pub mod assembler;
pub mod commands;
pub mod flamegraph;
pub mod merge;
pub mod output;
pub mod parser;
pub mod scheduler;
pub mod timing;
pub mod utils;
