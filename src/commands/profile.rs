//! Profile command implementation.
//!
//! The profile command:
//! 1. Validates arguments
//! 2. Calibrates instrumentation overhead
//! 3. Prepares the run state
//! 4. Merges every context, deepest level first
//! 5. Assembles and publishes the artifacts
//! 6. Cleans up raw-log backups

use super::models::ProfileArgs;
use crate::assembler::{assemble, Artifacts};
use crate::merge::{MergeJob, RunContext, TraceDir};
use crate::output::RunSummary;
use crate::scheduler::{run_levels, PoolConfig, ScheduleReport};
use crate::timing::{calibrate, RecordingHook};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of a profiling run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub artifacts: Artifacts,
    pub summary: RunSummary,
    pub schedule: ScheduleReport,
    pub elapsed: Duration,
}

/// Execute the profile command
///
/// **Public** - library entry point
///
/// # Arguments
/// * `args` - Profile command arguments
///
/// # Returns
/// Paths of the published artifacts and the run summary
///
/// # Errors
/// * Invalid arguments
/// * Missing trace directory, or no single root context
/// * A context that kept failing past its retry budget
/// * File write errors
pub fn execute_profile(args: ProfileArgs) -> Result<RunReport> {
    let start_time = Instant::now();

    info!("Starting profile of trace directory: {}", args.trace_dir.display());

    // Step 1: Validate arguments
    info!("Step 1/6: Validating arguments...");
    validate_args(&args)?;

    // Step 2: Calibrate
    let calibration = match args.calibration {
        Some(calibration) => {
            info!("Step 2/6: Using configured overhead calibration");
            calibration
        }
        None => {
            info!("Step 2/6: Calibrating instrumentation overhead...");
            let mut hook = RecordingHook::new();
            calibrate(&mut hook, args.calibration_iterations)
        }
    };
    debug!("Calibration: {:?}", calibration);

    // Step 3: Prepare run state
    info!("Step 3/6: Preparing run state...");
    let trace_dir = TraceDir::new(&args.trace_dir);
    let mut run = RunContext::new(trace_dir.clone(), calibration)
        .with_polling(args.poll_attempts, args.poll_backoff());
    let run_end = run
        .detect_run_end()
        .context("Failed to read the root context log")?;
    run = run.with_run_end(run_end);
    let run = Arc::new(run);

    // Step 4: Merge
    info!("Step 4/6: Merging contexts...");
    let pool = PoolConfig {
        max_workers: args.max_workers,
        progress_timeout: args.progress_timeout(),
        retry_budget: args.retry_budget,
        retry_deadline: args.retry_deadline(),
    };
    let schedule = run_levels(Arc::new(MergeJob::new(Arc::clone(&run))), &trace_dir, &pool)
        .context("Failed to merge context logs")?;
    info!(
        "Merged {} contexts over {} levels ({} retries)",
        schedule.contexts, schedule.levels, schedule.retries
    );

    // Step 5: Assemble
    info!("Step 5/6: Assembling final profile...");
    let (artifacts, summary) = assemble(&run, args.output_dir(), args.top_paths)
        .context("Failed to assemble final profile")?;
    info!("✓ Full profile written to: {}", artifacts.full_profile.display());
    info!("✓ Flamegraph trace written to: {}", artifacts.folded_flamegraph.display());

    // Step 6: Clean up
    if args.keep_backups {
        info!("Step 6/6: Keeping raw-log backups");
    } else {
        info!("Step 6/6: Removing raw-log backups...");
        match trace_dir.remove_backups() {
            Ok(removed) => debug!("Removed {} backups", removed),
            Err(e) => warn!("Failed to remove raw-log backups: {}", e),
        }
    }

    let elapsed = start_time.elapsed();
    info!("Profile completed in {:.2}s", elapsed.as_secs_f64());

    Ok(RunReport {
        artifacts,
        summary,
        schedule,
        elapsed,
    })
}

/// Validate profile arguments
///
/// **Public** - can be called before execute_profile for early validation
///
/// # Arguments
/// * `args` - Arguments to validate
///
/// # Returns
/// Ok if arguments are valid, Err with message if not
pub fn validate_args(args: &ProfileArgs) -> Result<()> {
    if args.trace_dir.as_os_str().is_empty() {
        anyhow::bail!("Trace directory cannot be empty");
    }

    if !args.trace_dir.is_dir() {
        anyhow::bail!(
            "Trace directory does not exist: {}",
            args.trace_dir.display()
        );
    }

    if args.max_workers == 0 {
        anyhow::bail!("max_workers must be greater than 0");
    }

    if args.progress_timeout_ms == 0 {
        anyhow::bail!("progress_timeout_ms must be greater than 0");
    }

    // Validate top_paths
    if args.top_paths == 0 {
        anyhow::bail!("top_paths must be greater than 0");
    }

    if args.top_paths > 1000 {
        anyhow::bail!("top_paths is too large (max 1000)");
    }

    Ok(())
}
