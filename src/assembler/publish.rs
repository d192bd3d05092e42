//! Publishing of the final artifacts once the root context is merged.

use super::cleanup::strip_substitution_markers;
use super::percent::{add_percent_of_total, with_footer};
use crate::aggregator::{build_folded_stacks, calculate_hot_paths, calculate_time_distribution};
use crate::merge::RunContext;
use crate::output::{write_artifact, write_summary, RunSummary};
use crate::parser::ContextId;
use crate::utils::config::{
    COLLAPSED_PROFILE_FILE, FOLDED_FLAMEGRAPH_FILE, FULL_PROFILE_FILE, RAW_FLAMEGRAPH_FILE,
    SCHEMA_VERSION, SUMMARY_FILE,
};
use crate::utils::error::AssembleError;
use chrono::Utc;
use log::{debug, info};
use std::path::{Path, PathBuf};

/// Paths of every published artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub full_profile: PathBuf,
    pub collapsed_profile: PathBuf,
    pub raw_flamegraph: PathBuf,
    pub folded_flamegraph: PathBuf,
    pub summary: PathBuf,
}

impl Artifacts {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            full_profile: dir.join(FULL_PROFILE_FILE),
            collapsed_profile: dir.join(COLLAPSED_PROFILE_FILE),
            raw_flamegraph: dir.join(RAW_FLAMEGRAPH_FILE),
            folded_flamegraph: dir.join(FOLDED_FLAMEGRAPH_FILE),
            summary: dir.join(SUMMARY_FILE),
        }
    }
}

/// Assemble and publish the final profile of a fully merged run
///
/// **Public** - last stage of a run
///
/// # Arguments
/// * `run` - Run state, with the root merged and the flamegraph sink filled
/// * `output_dir` - Directory receiving the artifacts
/// * `top_paths` - Hot paths listed in the JSON summary
///
/// # Errors
/// * `AssembleError::RootNotMerged` - the root has no totals record
/// * `AssembleError::EmptyRoot` - the root recorded no entries
/// * `AssembleError::Merge` / `AssembleError::Output` - I/O failures
pub fn assemble(
    run: &RunContext,
    output_dir: &Path,
    top_paths: usize,
) -> Result<(Artifacts, RunSummary), AssembleError> {
    let root = ContextId::root();
    let totals = run
        .trace_dir
        .read_totals(&root)?
        .ok_or_else(|| AssembleError::RootNotMerged(root.to_string()))?;
    if totals.records == 0 {
        return Err(AssembleError::EmptyRoot);
    }
    let total = totals.runtime;
    let artifacts = Artifacts::in_dir(output_dir);

    // Full profile
    let full: Vec<String> = run
        .trace_dir
        .read_merged(&root)?
        .lines()
        .map(str::to_string)
        .collect();
    let full = add_percent_of_total(&full, total);
    let full = strip_substitution_markers(full);
    write_artifact(&with_footer(&full, total), &artifacts.full_profile)?;

    // Collapsed profile
    let collapsed: Vec<String> = run
        .trace_dir
        .read_collapsed(&root)?
        .lines()
        .map(str::to_string)
        .collect();
    write_artifact(&with_footer(&collapsed, total), &artifacts.collapsed_profile)?;

    // Flamegraph traces
    let raw = run.flamegraph.raw_lines();
    write_artifact(&raw, &artifacts.raw_flamegraph)?;
    let folded = build_folded_stacks(&raw);
    let folded_lines: Vec<String> = folded.iter().map(|s| s.to_line()).collect();
    write_artifact(&folded_lines, &artifacts.folded_flamegraph)?;

    // Summary
    let distribution = calculate_time_distribution(&folded);
    info!("Time distribution: {}", distribution.summary());
    let hot_paths = calculate_hot_paths(&folded, total, top_paths);
    for (i, path) in hot_paths.iter().take(3).enumerate() {
        debug!(
            "  {}. {}us ({:.1}%): {}",
            i + 1,
            path.micros,
            path.percentage,
            path.stack
        );
    }

    let summary = RunSummary {
        version: SCHEMA_VERSION.to_string(),
        root: root.to_string(),
        total_runtime_us: total,
        contexts: run.merged_contexts(),
        records: run.merged_records(),
        calibration: run.calibration,
        distribution,
        hot_paths,
        generated_at: Utc::now().to_rfc3339(),
    };
    write_summary(&summary, &artifacts.summary)?;

    Ok((artifacts, summary))
}
