//! Loop-aware collapsed view of a context.
//!
//! Every execution of the same disambiguated line folds into one node:
//! occurrence count, summed runtime, and the average of the individual
//! percentages (not the percentage of the summed runtime).
//!
//! Child subtrees of the folded occurrences are grouped by structure.
//! Structurally identical subtrees print once, with their counts multiplied,
//! which keeps a loop of N iterations over a function from producing N
//! copies of the function's tree.

use crate::merge::line_id::LineId;
use crate::merge::render::{format_percent, format_secs, splice_child};
use crate::parser::Micros;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One collapsed entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollapsedNode {
    pub line: LineId,
    pub command: String,
    pub count: u64,
    pub runtime: Micros,

    /// Sum of the per-occurrence percentages (basis points)
    pub percent_sum: u64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CollapsedNode>,
}

impl CollapsedNode {
    /// Average percentage of the folded occurrences, rounded to nearest
    pub fn average_percent(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            (self.percent_sum + self.count / 2) / self.count
        }
    }

    /// Structure key: ids, commands, counts and shape, never timings
    pub fn signature(&self) -> String {
        let mut out = String::new();
        self.write_signature(&mut out);
        out
    }

    fn write_signature(&self, out: &mut String) {
        out.push_str(&format!("{}\u{1f}{}\u{1f}{}[", self.line, self.command, self.count));
        for child in &self.children {
            child.write_signature(out);
            out.push('\u{1e}');
        }
        out.push(']');
    }

    /// Fold a structurally identical node into this one
    fn absorb(&mut self, other: &CollapsedNode) {
        self.count += other.count;
        self.runtime += other.runtime;
        self.percent_sum += other.percent_sum;
        for (mine, theirs) in self.children.iter_mut().zip(other.children.iter()) {
            mine.absorb(theirs);
        }
    }

    /// `<line>: (<sum>s|<avg>%)  (<count>x) <command>`
    pub fn entry_line(&self) -> String {
        format!(
            "{}: ({}s|{}%)  ({}x) {}",
            self.line,
            format_secs(self.runtime),
            format_percent(self.average_percent()),
            self.count,
            self.command
        )
    }
}

/// One execution of a line, as seen by the collapsing pass
#[derive(Debug, Clone)]
pub struct Occurrence {
    pub line: LineId,
    pub command: String,
    pub runtime: Micros,
    pub percent: u64,

    /// Collapsed trees of the child contexts this execution opened
    pub children: Vec<Vec<CollapsedNode>>,
}

/// Fold occurrences into one node per line id, in first-seen order
pub fn collapse_occurrences(occurrences: Vec<Occurrence>) -> Vec<CollapsedNode> {
    let mut order: Vec<LineId> = Vec::new();
    let mut groups: HashMap<LineId, (CollapsedNode, Vec<Vec<CollapsedNode>>)> = HashMap::new();

    for occurrence in occurrences {
        let forest: Vec<CollapsedNode> = occurrence.children.into_iter().flatten().collect();
        let (node, forests) = groups.entry(occurrence.line).or_insert_with(|| {
            order.push(occurrence.line);
            (
                CollapsedNode {
                    line: occurrence.line,
                    command: occurrence.command.clone(),
                    count: 0,
                    runtime: 0,
                    percent_sum: 0,
                    children: Vec::new(),
                },
                Vec::new(),
            )
        });
        node.count += 1;
        node.runtime += occurrence.runtime;
        node.percent_sum += occurrence.percent;
        if !forest.is_empty() {
            forests.push(forest);
        }
    }

    order
        .into_iter()
        .filter_map(|line| groups.remove(&line))
        .map(|(mut node, forests)| {
            node.children = merge_identical_forests(forests);
            node
        })
        .collect()
}

/// Group child forests by structure and fold each group into one forest
pub fn merge_identical_forests(forests: Vec<Vec<CollapsedNode>>) -> Vec<CollapsedNode> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, Vec<CollapsedNode>> = HashMap::new();

    for forest in forests {
        let key: String = forest.iter().map(CollapsedNode::signature).collect::<Vec<_>>().join("\u{1d}");
        match merged.get_mut(&key) {
            Some(existing) => {
                for (mine, theirs) in existing.iter_mut().zip(forest.iter()) {
                    mine.absorb(theirs);
                }
            }
            None => {
                order.push(key.clone());
                merged.insert(key, forest);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| merged.remove(&key))
        .flatten()
        .collect()
}

/// Render a collapsed forest as tree-drawn text lines
pub fn render_forest(nodes: &[CollapsedNode]) -> Vec<String> {
    let mut out = Vec::new();
    for node in nodes {
        out.push(node.entry_line());
        if !node.children.is_empty() {
            let child_text = render_forest(&node.children).join("\n");
            splice_child(&child_text, &mut out);
        }
    }
    out
}
