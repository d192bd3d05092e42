//! Presentation cleanup of the final full profile.
//!
//! A process substitution runs its command in a forked process, so the sole
//! command inside `<(...)` / `>(...)` is rendered asynchronous although the
//! caller waits for it. The marker is removed from that single child entry.
//! This is a text heuristic: it only looks at tree depth and entry count.

use crate::utils::config::ASYNC_TAG;
use log::debug;

const PREFIX_WIDTH: usize = 4;

/// Tree depth of a rendered line (number of `|-- ` / `|   ` units)
fn depth(line: &str) -> usize {
    let mut depth = 0;
    let mut rest = line;
    while rest.starts_with("|-- ") || rest.starts_with("|   ") {
        depth += 1;
        rest = &rest[PREFIX_WIDTH..];
    }
    depth
}

/// Command text of an entry line: everything after the metadata group
fn command(line: &str) -> Option<&str> {
    let after_meta = line.split_once(")  (")?.1;
    Some(after_meta.split_once(")  ")?.1)
}

fn is_process_substitution(line: &str) -> bool {
    command(line).is_some_and(|c| c.contains("<(") || c.contains(">("))
}

/// Remove the async marker from the sole child of process substitutions
pub fn strip_substitution_markers(lines: Vec<String>) -> Vec<String> {
    let mut lines = lines;
    let mut cleaned = 0;
    for i in 0..lines.len() {
        if !is_process_substitution(&lines[i]) {
            continue;
        }
        let parent_depth = depth(&lines[i]);
        let children: Vec<usize> = (i + 1..lines.len())
            .take_while(|&j| depth(&lines[j]) > parent_depth)
            .filter(|&j| depth(&lines[j]) == parent_depth + 1)
            .collect();
        if let [only] = children[..] {
            if let Some(stripped) = lines[only].strip_suffix(ASYNC_TAG) {
                lines[only] = stripped.to_string();
                cleaned += 1;
            }
        }
    }
    if cleaned > 0 {
        debug!("Removed {} process-substitution async markers", cleaned);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_depth() {
        assert_eq!(depth("1: x"), 0);
        assert_eq!(depth("|-- 1: x"), 1);
        assert_eq!(depth("|   |-- 1: x"), 2);
    }

    #[test]
    fn test_sole_child_marker_removed() {
        let lines = owned(&[
            "4: (0.1s|1%|1%)  (9|0.4|SUBSHELL)  diff <(sort a)",
            "|-- 1: (0.1s|1%|100.00%)  (10|0.4.1)  sort a (&)",
            "5: (0.1s|1%|1%)  (9|0.5)  sleep 1 (&)",
        ]);
        let cleaned = strip_substitution_markers(lines);
        assert_eq!(cleaned[1], "|-- 1: (0.1s|1%|100.00%)  (10|0.4.1)  sort a");
        // unrelated background job keeps its marker
        assert_eq!(cleaned[2], "5: (0.1s|1%|1%)  (9|0.5)  sleep 1 (&)");
    }

    #[test]
    fn test_multiple_children_left_alone() {
        let lines = owned(&[
            "4: (0.1s|1%|1%)  (9|0.4)  cat <(a)",
            "|-- 1: (0.1s|1%|50.00%)  (10|0.4.1)  a (&)",
            "|-- 2: (0.1s|1%|50.00%)  (10|0.4.2)  b (&)",
        ]);
        let cleaned = strip_substitution_markers(lines.clone());
        assert_eq!(cleaned, lines);
    }
}
