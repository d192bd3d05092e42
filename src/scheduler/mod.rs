//! Nesting-level scheduling of context merges.
//!
//! A context can only be merged once all of its children are, so levels run
//! deepest first with a full barrier in between. Inside a level, contexts are
//! independent and spread over a bounded worker pool.

pub mod levels;
pub mod pool;

pub use levels::{discover_contexts, group_levels, Level};
pub use pool::{run_level, Completion, ContextJob, LevelReport, PoolConfig};

use crate::merge::TraceDir;
use crate::utils::error::SchedulerError;
use log::info;
use std::sync::Arc;

/// Totals over every level of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    pub contexts: usize,
    pub levels: usize,
    pub retries: usize,
    pub workers_spawned: usize,
}

/// Run `job` over every context of the trace directory, deepest level first
///
/// **Public** - main entry point of the scheduler
///
/// # Errors
/// Discovery errors, a missing or duplicated root, or an exhausted retry
/// budget in any level (later levels are not started).
pub fn run_levels<J: ContextJob>(
    job: Arc<J>,
    dir: &TraceDir,
    config: &PoolConfig,
) -> Result<ScheduleReport, SchedulerError> {
    let ids = discover_contexts(dir)?;
    let levels = group_levels(&ids)?;

    let mut report = ScheduleReport {
        levels: levels.len(),
        ..ScheduleReport::default()
    };
    for level in &levels {
        info!(
            "Merging level {} ({} contexts, up to {} workers)",
            level.depth,
            level.contexts.len(),
            config.max_workers.min(level.contexts.len())
        );
        let level_report = run_level(Arc::clone(&job), &level.contexts, config)?;
        report.contexts += level_report.completed;
        report.retries += level_report.retries;
        report.workers_spawned += level_report.workers_spawned;
    }
    Ok(report)
}
