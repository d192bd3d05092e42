//! Typed ancestry: context identifiers, sequence ids, and call-stack frames.
//!
//! String keys (`0.3.7`, `main>f`) only exist at the file/line boundary;
//! everything past the parser works with these types.

use crate::utils::config::{
    CHAIN_SEPARATOR, FORKED_PID_SUFFIX, ROOT_CONTEXT_ID, SEQUENCE_SEPARATOR,
};
use crate::utils::error::ParseError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identifier of one context (function activation, subshell, or fork).
///
/// The root is `0`; a child opened by the record with sequence id `P.n`
/// is named `P.n`. Depth is the number of separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    pub fn root() -> Self {
        Self(ROOT_CONTEXT_ID.to_string())
    }

    /// Parse a context id from a file name; `None` for side files.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let valid = !name.is_empty()
            && name
                .split(SEQUENCE_SEPARATOR)
                .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
        valid.then(|| Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.matches(SEQUENCE_SEPARATOR).count()
    }

    pub fn parent(&self) -> Option<ContextId> {
        self.0
            .rsplit_once(SEQUENCE_SEPARATOR)
            .map(|(parent, _)| Self(parent.to_string()))
    }

    /// Ancestors from the direct parent up to the root.
    pub fn ancestors(&self) -> Vec<ContextId> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(id) = current {
            current = id.parent();
            out.push(id);
        }
        out
    }

    fn components(&self) -> impl Iterator<Item = u64> + '_ {
        self.0
            .split(SEQUENCE_SEPARATOR)
            .map(|part| part.parse::<u64>().unwrap_or(u64::MAX))
    }
}

impl Ord for ContextId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components().cmp(other.components())
    }
}

impl PartialOrd for ContextId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dotted per-context ordering path of one record (`0.3.7`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceId(Vec<u64>);

impl SequenceId {
    pub fn parse(value: &str) -> Result<Self, ParseError> {
        let parts: Result<Vec<u64>, _> = value
            .split(SEQUENCE_SEPARATOR)
            .map(|part| part.parse::<u64>())
            .collect();
        match parts {
            Ok(parts) if parts.len() >= 2 => Ok(Self(parts)),
            _ => Err(ParseError::InvalidField {
                field: "sequence id",
                value: value.to_string(),
            }),
        }
    }

    /// The context this record belongs to
    pub fn context(&self) -> ContextId {
        let parts = &self.0[..self.0.len() - 1];
        ContextId(join_components(parts))
    }

    /// The child context a merge indicator with this id opens
    pub fn child_context(&self) -> ContextId {
        ContextId(join_components(&self.0))
    }
}

fn join_components(parts: &[u64]) -> String {
    parts
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(&SEQUENCE_SEPARATOR.to_string())
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_components(&self.0))
    }
}

/// Kind of nesting boundary a frame represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Root,
    Function,
    Subshell,
    Fork,
}

/// One level of a record's call hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AncestryFrame {
    pub kind: FrameKind,
    pub label: String,
    /// Process id in effect at this level
    pub pid: String,
}

impl AncestryFrame {
    /// Label used in flamegraph stacks
    pub fn stack_label(&self) -> String {
        match self.kind {
            FrameKind::Root => self.label.clone(),
            FrameKind::Function => format!("FUNCTION:{}", self.label),
            FrameKind::Subshell => format!("SUBSHELL:{}", self.label),
            FrameKind::Fork => format!("FORK:{}", self.label),
        }
    }
}

/// Build typed frames from the function-name and process-id chains.
///
/// Both chains carry one entry per nesting level. A pid suffixed with `&`
/// opened a background fork, any other pid change a subshell; a level that
/// keeps its pid is a function call.
pub fn parse_ancestry(functions: &str, processes: &str) -> Result<Vec<AncestryFrame>, ParseError> {
    let names: Vec<&str> = functions.split(CHAIN_SEPARATOR).collect();
    let pids: Vec<&str> = processes.split(CHAIN_SEPARATOR).collect();

    if names.len() != pids.len() {
        return Err(ParseError::AncestryMismatch {
            functions: names.len(),
            processes: pids.len(),
        });
    }
    if pids.iter().any(|pid| pid.trim_end_matches(FORKED_PID_SUFFIX).is_empty()) {
        return Err(ParseError::InvalidField {
            field: "process chain",
            value: processes.to_string(),
        });
    }

    let mut frames = Vec::with_capacity(names.len());
    let mut previous_pid = "";
    for (level, (name, raw_pid)) in names.iter().zip(pids.iter()).enumerate() {
        let forked = raw_pid.ends_with(FORKED_PID_SUFFIX);
        let pid = raw_pid.trim_end_matches(FORKED_PID_SUFFIX);
        let name = if name.is_empty() { "main" } else { name };

        let (kind, label) = if level == 0 {
            (FrameKind::Root, name.to_string())
        } else if forked {
            (FrameKind::Fork, pid.to_string())
        } else if pid != previous_pid {
            (FrameKind::Subshell, pid.to_string())
        } else {
            (FrameKind::Function, name.to_string())
        };

        frames.push(AncestryFrame {
            kind,
            label,
            pid: pid.to_string(),
        });
        previous_pid = pid;
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_id_depth_and_parents() {
        let id = ContextId::from_file_name("0.3.7").unwrap();
        assert_eq!(id.depth(), 2);
        assert_eq!(id.parent().unwrap().as_str(), "0.3");
        let ancestors: Vec<String> = id.ancestors().iter().map(|a| a.to_string()).collect();
        assert_eq!(ancestors, vec!["0.3", "0"]);
        assert_eq!(ContextId::root().depth(), 0);
        assert!(ContextId::root().parent().is_none());
    }

    #[test]
    fn test_context_id_rejects_side_files() {
        assert!(ContextId::from_file_name("0.3.orig").is_none());
        assert!(ContextId::from_file_name("0.3.totals.json").is_none());
        assert!(ContextId::from_file_name("0..3").is_none());
        assert!(ContextId::from_file_name("").is_none());
    }

    #[test]
    fn test_context_id_orders_numerically() {
        let mut ids: Vec<ContextId> = ["0.10", "0.9", "0.9.1"]
            .iter()
            .filter_map(|s| ContextId::from_file_name(s))
            .collect();
        ids.sort();
        let names: Vec<&str> = ids.iter().map(|i| i.as_str()).collect();
        assert_eq!(names, vec!["0.9", "0.9.1", "0.10"]);
    }

    #[test]
    fn test_sequence_id_contexts() {
        let seq = SequenceId::parse("0.3.12").unwrap();
        assert_eq!(seq.context().as_str(), "0.3");
        assert_eq!(seq.child_context().as_str(), "0.3.12");
        assert!(SequenceId::parse("7").is_err());
        assert!(SequenceId::parse("0.x").is_err());
        assert!(SequenceId::parse("0.2").unwrap() < SequenceId::parse("0.10").unwrap());
    }

    #[test]
    fn test_parse_ancestry_kinds() {
        let frames = parse_ancestry("main>f>f>f", "100>100>205>310&").unwrap();
        let kinds: Vec<FrameKind> = frames.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![FrameKind::Root, FrameKind::Function, FrameKind::Subshell, FrameKind::Fork]
        );
        assert_eq!(frames[1].stack_label(), "FUNCTION:f");
        assert_eq!(frames[2].stack_label(), "SUBSHELL:205");
        assert_eq!(frames[3].stack_label(), "FORK:310");
    }

    #[test]
    fn test_parse_ancestry_recursion_is_function() {
        let frames = parse_ancestry("main>fib>fib", "100>100>100").unwrap();
        assert_eq!(frames[2].kind, FrameKind::Function);
        assert_eq!(frames[2].label, "fib");
    }

    #[test]
    fn test_parse_ancestry_length_mismatch() {
        assert_eq!(
            parse_ancestry("main>f", "100"),
            Err(ParseError::AncestryMismatch { functions: 2, processes: 1 })
        );
    }
}
