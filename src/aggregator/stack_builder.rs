//! Fold raw flamegraph lines into unique stacks.
//!
//! Folded stacks are the input format for flamegraph renderers.
//! Format: "frame;frame;leaf<TAB>micros"
//!
//! Example: "main;FUNCTION:build;make -j4\t1200000"
//! This means: `make -j4`, run from function `build`, took 1.2 s in total.

use log::{debug, warn};
use std::collections::BTreeMap;

/// A single folded stack entry
///
/// **Public** - used by the assembler and metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldedStack {
    /// Stack trace as semicolon-separated string
    pub stack: String,

    /// Summed duration of every leaf with this stack (µs)
    pub micros: u64,
}

impl FoldedStack {
    /// Create a new folded stack
    ///
    /// **Public** - constructor
    pub fn new(stack: String, micros: u64) -> Self {
        Self { stack, micros }
    }

    /// Render as `<stack>\t<micros>`
    pub fn to_line(&self) -> String {
        format!("{}\t{}", self.stack, self.micros)
    }
}

/// Fold raw flamegraph lines
///
/// **Public** - main entry point for stack folding
///
/// # Arguments
/// * `raw_lines` - `<stack>\t<micros>` lines, in any order
///
/// # Returns
/// One entry per unique stack, durations summed, sorted by stack
///
/// # Algorithm
/// 1. Split each line at its last tab
/// 2. Aggregate by stack (sum durations)
/// 3. Emit in stack order
pub fn build_folded_stacks<S: AsRef<str>>(raw_lines: &[S]) -> Vec<FoldedStack> {
    debug!("Folding {} raw flamegraph lines", raw_lines.len());

    let mut stack_map: BTreeMap<&str, u64> = BTreeMap::new();

    for line in raw_lines {
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }
        let parsed = line
            .rsplit_once('\t')
            .and_then(|(stack, micros)| micros.trim().parse::<u64>().ok().map(|m| (stack, m)));
        match parsed {
            Some((stack, micros)) => *stack_map.entry(stack).or_insert(0) += micros,
            None => warn!("Skipping malformed flamegraph line: {}", line),
        }
    }

    let stacks: Vec<FoldedStack> = stack_map
        .into_iter()
        .map(|(stack, micros)| FoldedStack::new(stack.to_string(), micros))
        .collect();

    debug!("Folded into {} unique stacks", stacks.len());

    stacks
}

/// Stacks sorted by duration, heaviest first (ties keep stack order)
///
/// **Public** - feeds hot path calculation
pub fn sort_by_weight(stacks: &[FoldedStack]) -> Vec<FoldedStack> {
    let mut sorted = stacks.to_vec();
    sorted.sort_by(|a, b| b.micros.cmp(&a.micros));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folded_stack_to_line() {
        let stack = FoldedStack::new("root;FUNCTION:f;sleep 1".to_string(), 1000);
        assert_eq!(stack.to_line(), "root;FUNCTION:f;sleep 1\t1000");
    }

    #[test]
    fn test_fold_sums_identical_stacks() {
        let lines = vec![
            "root;b\t10",
            "root;a\t5",
            "root;b\t7",
            "garbage",
            "",
        ];
        let folded = build_folded_stacks(&lines);
        assert_eq!(
            folded,
            vec![
                FoldedStack::new("root;a".to_string(), 5),
                FoldedStack::new("root;b".to_string(), 17),
            ]
        );
    }

    #[test]
    fn test_sort_by_weight() {
        let stacks = vec![
            FoldedStack::new("a".to_string(), 1),
            FoldedStack::new("b".to_string(), 9),
        ];
        let sorted = sort_by_weight(&stacks);
        assert_eq!(sorted[0].stack, "b");
    }
}
