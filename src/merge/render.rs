//! Text rendering of merged entries.
//!
//! Full log entry:
//! `<line>: (<runtime>s|<percent>%)  (<pid>|<sequence>[|type][|cpu:<t>s])  <command>`
//!
//! Child logs are spliced beneath their indicator with one extra level of
//! `|-- ` / `|   ` prefixes.

use crate::parser::Micros;
use crate::utils::config::{CHILD_ENTRY_PREFIX, CHILD_NESTED_PREFIX};

/// `1234567` µs -> `1.234567`
pub fn format_secs(micros: Micros) -> String {
    format!("{}.{:06}", micros / 1_000_000, micros % 1_000_000)
}

/// `2857` basis points -> `28.57`
pub fn format_percent(basis_points: u64) -> String {
    format!("{}.{:02}", basis_points / 100, basis_points % 100)
}

/// Shift a rendered child block one level deeper.
///
/// Top-level child lines get `|-- `, lines that already carry a tree
/// prefix get `|   `.
pub fn splice_child(child: &str, out: &mut Vec<String>) {
    for line in child.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with('|') {
            out.push(format!("{}{}", CHILD_NESTED_PREFIX, line));
        } else {
            out.push(format!("{}{}", CHILD_ENTRY_PREFIX, line));
        }
    }
}

/// Fields of one full-log entry line
#[derive(Debug, Clone)]
pub struct EntryLine<'a> {
    pub line_id: String,
    pub runtime: Micros,
    pub percent: u64,
    pub metadata: &'a str,
    pub command: &'a str,
    pub asynchronous: bool,
}

impl EntryLine<'_> {
    pub fn render(&self) -> String {
        format!(
            "{}: ({}s|{}%)  ({})  {}{}",
            self.line_id,
            format_secs(self.runtime),
            format_percent(self.percent),
            self.metadata,
            self.command,
            if self.asynchronous {
                crate::utils::config::ASYNC_TAG
            } else {
                ""
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatters() {
        assert_eq!(format_secs(1_000), "0.001000");
        assert_eq!(format_secs(2_500_001), "2.500001");
        assert_eq!(format_percent(10_000), "100.00");
        assert_eq!(format_percent(1_429), "14.29");
        assert_eq!(format_percent(7), "0.07");
    }

    #[test]
    fn test_splice_child_adds_one_level() {
        let child = "1: a\n|-- 2: b\n|   |-- 3: c\n";
        let mut out = Vec::new();
        splice_child(child, &mut out);
        assert_eq!(out, vec!["|-- 1: a", "|   |-- 2: b", "|   |   |-- 3: c"]);
    }

    #[test]
    fn test_entry_line_render() {
        let entry = EntryLine {
            line_id: "4.1".to_string(),
            runtime: 1_000,
            percent: 2_857,
            metadata: "100|0.2",
            command: "sleep 1",
            asynchronous: true,
        };
        assert_eq!(entry.render(), "4.1: (0.001000s|28.57%)  (100|0.2)  sleep 1 (&)");
    }
}
