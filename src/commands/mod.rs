//! Command implementations.
//!
//! Commands orchestrate the various library components to perform user tasks.

pub mod models;
pub mod profile;

// Re-export main command functions
pub use models::ProfileArgs;
pub use profile::{execute_profile, validate_args, RunReport};
