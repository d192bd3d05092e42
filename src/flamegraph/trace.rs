//! Raw flamegraph trace lines and the run-wide sink they are appended to.

use crate::parser::{AncestryFrame, ContextId, Micros};
use log::debug;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// One leaf command with its call stack and corrected duration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlameLine {
    /// Stack frames from the outermost caller inwards
    pub frames: Vec<String>,

    /// Leaf command text
    pub command: String,

    /// Duration in microseconds
    pub micros: Micros,
}

impl FlameLine {
    pub fn new(ancestry: &[AncestryFrame], command: &str, micros: Micros) -> Self {
        Self {
            frames: ancestry.iter().map(AncestryFrame::stack_label).collect(),
            command: command.to_string(),
            micros,
        }
    }

    /// `frames;...;command` with separators that would split a frame replaced
    pub fn stack(&self) -> String {
        self.frames
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.command.as_str()))
            .map(sanitize_frame)
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Render as `<stack>\t<micros>`
    pub fn to_line(&self) -> String {
        format!("{}\t{}", self.stack(), self.micros)
    }
}

fn sanitize_frame(frame: &str) -> String {
    frame.replace(';', ",").replace('\t', " ")
}

/// Run-wide collection of flamegraph lines, keyed by context.
///
/// A context's lines are inserted in one locked operation; a retried
/// context replaces whatever an earlier attempt left behind.
#[derive(Debug, Default)]
pub struct FlamegraphSink {
    lines: Mutex<BTreeMap<ContextId, Vec<FlameLine>>>,
}

impl FlamegraphSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish every leaf line of one context
    pub fn record(&self, context: &ContextId, lines: Vec<FlameLine>) {
        debug!("Recording {} flamegraph lines for context {}", lines.len(), context);
        let mut guard = match self.lines.lock() {
            Ok(guard) => guard,
            // a panicking merger cannot leave a half-inserted entry behind
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(context.clone(), lines);
    }

    /// Rendered raw trace, grouped by context id
    pub fn raw_lines(&self) -> Vec<String> {
        let guard = match self.lines.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .values()
            .flat_map(|lines| lines.iter().map(FlameLine::to_line))
            .collect()
    }

    pub fn len(&self) -> usize {
        match self.lines.lock() {
            Ok(guard) => guard.values().map(Vec::len).sum(),
            Err(poisoned) => poisoned.into_inner().values().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_ancestry;

    #[test]
    fn test_flame_line_rendering() {
        let ancestry = parse_ancestry("main>f>f", "10>10>22").unwrap();
        let line = FlameLine::new(&ancestry, "echo a; echo b", 1500);
        assert_eq!(line.to_line(), "main;FUNCTION:f;SUBSHELL:22;echo a, echo b\t1500");
    }

    #[test]
    fn test_sink_replaces_retried_context() {
        let sink = FlamegraphSink::new();
        let ancestry = parse_ancestry("main", "1").unwrap();
        let id = ContextId::root();
        sink.record(&id, vec![FlameLine::new(&ancestry, "a", 1)]);
        sink.record(&id, vec![FlameLine::new(&ancestry, "b", 2)]);
        assert_eq!(sink.raw_lines(), vec!["main;b\t2".to_string()]);
        assert_eq!(sink.len(), 1);
    }
}
