//! Hot paths and runtime spread over folded stacks.
//!
//! A hot path is a leaf command together with the function chain it ran
//! under. The distribution describes how evenly the run's time spreads over
//! those leaves: median, 90th percentile and the slowest one.

use super::stack_builder::{sort_by_weight, FoldedStack};
use crate::merge::render::format_secs;
use log::debug;
use serde::{Deserialize, Serialize};

/// One heavy call stack
///
/// **Public** - part of the JSON run summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotPath {
    /// Semicolon-separated stack
    pub stack: String,

    /// Leaf command of the stack
    pub command: String,

    /// Frames above the leaf
    pub depth: usize,

    /// Summed duration (µs)
    pub micros: u64,

    /// Share of the run's total runtime
    pub percentage: f64,
}

impl HotPath {
    fn from_stack(stack: &FoldedStack, total_micros: u64) -> Self {
        let (frames, command) = match stack.stack.rsplit_once(';') {
            Some((frames, leaf)) => (frames.split(';').count(), leaf),
            None => (0, stack.stack.as_str()),
        };
        let percentage = if total_micros > 0 {
            (stack.micros as f64 / total_micros as f64) * 100.0
        } else {
            0.0
        };

        Self {
            stack: stack.stack.clone(),
            command: command.to_string(),
            depth: frames,
            micros: stack.micros,
            percentage,
        }
    }
}

/// Heaviest `top_n` stacks, heaviest first
///
/// **Public** - main entry point for metrics calculation
///
/// # Arguments
/// * `stacks` - Folded stacks from stack_builder
/// * `total_micros` - Total runtime of the run (the root's corrected total)
/// * `top_n` - Number of paths to return
pub fn calculate_hot_paths(
    stacks: &[FoldedStack],
    total_micros: u64,
    top_n: usize,
) -> Vec<HotPath> {
    debug!("Calculating top {} hot paths from {} stacks", top_n, stacks.len());

    sort_by_weight(stacks)
        .iter()
        .take(top_n)
        .map(|stack| HotPath::from_stack(stack, total_micros))
        .collect()
}

/// Runtime spread over the folded stacks of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeDistribution {
    /// Summed time of every leaf
    pub total_micros: u64,

    /// Number of unique stacks
    pub stack_count: usize,

    pub median_micros: u64,
    pub p90_micros: u64,
    pub max_micros: u64,

    /// Share of the summed time spent in the slowest tenth of stacks
    pub top_decile_share: f64,
}

impl TimeDistribution {
    /// One-line summary in seconds, for the run log
    pub fn summary(&self) -> String {
        format!(
            "{} stacks, {}s | median {}s | p90 {}s | max {}s | slowest 10%: {:.1}%",
            self.stack_count,
            format_secs(self.total_micros),
            format_secs(self.median_micros),
            format_secs(self.p90_micros),
            format_secs(self.max_micros),
            self.top_decile_share
        )
    }
}

/// Calculate the runtime spread of `stacks`
///
/// **Public** - stored in the run summary and logged by the assembler
pub fn calculate_time_distribution(stacks: &[FoldedStack]) -> TimeDistribution {
    let mut weights: Vec<u64> = stacks.iter().map(|s| s.micros).collect();
    if weights.is_empty() {
        return TimeDistribution::default();
    }
    weights.sort_unstable();

    let total: u64 = weights.iter().sum();
    let top_count = weights.len().div_ceil(10);
    let top: u64 = weights.iter().rev().take(top_count).sum();

    TimeDistribution {
        total_micros: total,
        stack_count: weights.len(),
        median_micros: nearest_rank(&weights, 50),
        p90_micros: nearest_rank(&weights, 90),
        max_micros: weights[weights.len() - 1],
        top_decile_share: if total > 0 {
            (top as f64 / total as f64) * 100.0
        } else {
            0.0
        },
    }
}

/// Nearest-rank percentile of sorted, non-empty `weights`
fn nearest_rank(weights: &[u64], percentile: usize) -> u64 {
    let rank = (percentile * weights.len()).div_ceil(100).max(1);
    weights[rank.min(weights.len()) - 1]
}
