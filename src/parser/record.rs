//! Execution record parser for raw per-context trace lines.
//!
//! One line per executed command, tab separated:
//! `pipe, start, [cpu_start], end|-, functions, pids, sequence, line, ::, command, [(&)]`

use super::ancestry::{parse_ancestry, AncestryFrame, ContextId, SequenceId};
use crate::utils::config::{
    COMMAND_FIELD_MARKER, FIELDS_WITHOUT_CPU, FIELDS_WITH_CPU, FIELD_SEPARATOR, FORK_MARKER,
    UNRESOLVED_END_SENTINEL,
};
use crate::utils::error::ParseError;
use log::{debug, warn};

/// Timestamps and durations are carried in microseconds
pub type Micros = u64;

/// Kind of command a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    Normal,
    Subshell,
    BackgroundFork,
    FunctionEntry,
    SimpleFork,
    ExecReplace,
}

/// Sentinel markers the instrumentation prefixes onto command text
const COMMAND_TYPE_MARKERS: &[(&str, CommandType)] = &[
    ("<<(SUBSHELL)>>", CommandType::Subshell),
    ("<<(BACKGROUND)>>", CommandType::BackgroundFork),
    ("<<(FUNCTION)>>", CommandType::FunctionEntry),
    ("<<(FORK)>>", CommandType::SimpleFork),
    ("<<(EXEC)>>", CommandType::ExecReplace),
];

impl CommandType {
    /// Whether a record of this type opens a child context
    pub fn is_merge_indicator(self) -> bool {
        matches!(
            self,
            CommandType::Subshell
                | CommandType::BackgroundFork
                | CommandType::FunctionEntry
                | CommandType::SimpleFork
        )
    }

    /// Short tag shown in profile metadata; `None` for plain commands
    pub fn tag(self) -> Option<&'static str> {
        match self {
            CommandType::Normal => None,
            CommandType::Subshell => Some("subshell"),
            CommandType::BackgroundFork => Some("background"),
            CommandType::FunctionEntry => Some("function"),
            CommandType::SimpleFork => Some("fork"),
            CommandType::ExecReplace => Some("exec"),
        }
    }

    /// Split a leading sentinel marker off the command text
    fn detect(command: &str) -> (CommandType, &str) {
        for (marker, kind) in COMMAND_TYPE_MARKERS {
            if let Some(rest) = command.strip_prefix(marker) {
                return (*kind, rest.trim_start());
            }
        }
        (CommandType::Normal, command)
    }
}

/// One executed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRecord {
    /// Remaining pipeline stages including this one (1 = not piped / last stage)
    pub pipe_segments: u32,
    pub start: Micros,
    /// `None` until resolved (no exit signal was recorded)
    pub end: Option<Micros>,
    pub cpu_start: Option<Micros>,
    pub ancestry: Vec<AncestryFrame>,
    pub sequence: SequenceId,
    pub source_line: u32,
    pub command_type: CommandType,
    pub command: String,
    /// Trailing fork marker present
    pub forked: bool,
}

impl ExecutionRecord {
    pub fn context(&self) -> ContextId {
        self.sequence.context()
    }

    /// Process id the record ran in
    pub fn pid(&self) -> &str {
        self.ancestry.last().map(|f| f.pid.as_str()).unwrap_or("?")
    }
}

/// Parse one raw trace line
///
/// **Public** - main entry point for parsing
///
/// # Errors
/// * `ParseError::MissingCommandMarker` - no `::` field
/// * `ParseError::FieldCount` - wrong number of metadata fields
/// * `ParseError::InvalidField` - a numeric or id field failed to parse
/// * `ParseError::AncestryMismatch` - function and pid chains disagree
pub fn parse_record(line: &str) -> Result<ExecutionRecord, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();

    let marker_at = fields
        .iter()
        .position(|f| *f == COMMAND_FIELD_MARKER)
        .ok_or(ParseError::MissingCommandMarker)?;
    let (meta, rest) = fields.split_at(marker_at);
    let command_fields = &rest[1..];

    let (pipe, start, cpu, end, functions, pids, sequence, source_line) = match meta.len() {
        FIELDS_WITHOUT_CPU => (
            meta[0], meta[1], None, meta[2], meta[3], meta[4], meta[5], meta[6],
        ),
        FIELDS_WITH_CPU => (
            meta[0],
            meta[1],
            Some(meta[2]),
            meta[3],
            meta[4],
            meta[5],
            meta[6],
            meta[7],
        ),
        n => return Err(ParseError::FieldCount(n)),
    };

    let pipe_segments = parse_number::<u32>("pipe segment count", pipe)?.max(1);
    let start = parse_timestamp(start)?;
    let cpu_start = cpu.map(parse_timestamp).transpose()?;
    let end = if end == UNRESOLVED_END_SENTINEL || end.is_empty() {
        None
    } else {
        Some(parse_timestamp(end)?)
    };
    let ancestry = parse_ancestry(functions, pids)?;
    let sequence = SequenceId::parse(sequence)?;
    let source_line = parse_number::<u32>("source line", source_line)?;

    let (command_fields, forked) = match command_fields.split_last() {
        Some((last, head)) if *last == FORK_MARKER => (head, true),
        _ => (command_fields, false),
    };
    let joined = command_fields.join("\t");
    let (command_type, command) = CommandType::detect(&joined);
    let command = normalize_command(command);

    Ok(ExecutionRecord {
        pipe_segments,
        start,
        end,
        cpu_start,
        ancestry,
        sequence,
        source_line,
        command_type,
        command,
        forked,
    })
}

/// Parse every line of a context log, skipping malformed lines
///
/// Exact adjacent duplicate lines (a double-fired hook) are dropped first.
pub fn parse_context_log(content: &str) -> Vec<ExecutionRecord> {
    let mut records = Vec::new();
    let mut previous: Option<&str> = None;
    let mut duplicates = 0usize;

    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if previous == Some(line) {
            duplicates += 1;
            continue;
        }
        previous = Some(line);

        match parse_record(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping malformed trace line {}: {}", index + 1, e),
        }
    }

    if duplicates > 0 {
        debug!("Dropped {} duplicate trace lines", duplicates);
    }
    records
}

/// Parse a timestamp in `seconds.micros` or integer microsecond form
pub fn parse_timestamp(value: &str) -> Result<Micros, ParseError> {
    let invalid = || ParseError::InvalidField {
        field: "timestamp",
        value: value.to_string(),
    };

    match value.split_once(['.', ',']) {
        Some((secs, frac)) => {
            if secs.is_empty() || frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            let secs: u64 = secs.parse().map_err(|_| invalid())?;
            // Right-pad / truncate the fraction to exactly six digits
            let mut micros_str: String = frac.chars().take(6).collect();
            while micros_str.len() < 6 {
                micros_str.push('0');
            }
            let micros: u64 = micros_str.parse().map_err(|_| invalid())?;
            secs.checked_mul(1_000_000)
                .and_then(|s| s.checked_add(micros))
                .ok_or_else(invalid)
        }
        None => value.parse::<u64>().map_err(|_| invalid()),
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ParseError> {
    value.trim().parse::<T>().map_err(|_| ParseError::InvalidField {
        field,
        value: value.to_string(),
    })
}

/// Undo shell quoting of the command text and escape control characters.
///
/// ANSI-C quoted text (`$'...'`) is decoded first; any literal tab or newline
/// left afterwards is rendered as `\t` / `\n` so it can never split a field
/// or a profile line.
pub fn normalize_command(command: &str) -> String {
    let decoded = match command
        .strip_prefix("$'")
        .and_then(|inner| inner.strip_suffix('\''))
    {
        Some(inner) => decode_ansi_c(inner),
        None => command.to_string(),
    };

    let mut out = String::with_capacity(decoded.len());
    for ch in decoded.chars() {
        match ch {
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.trim().to_string()
}

fn decode_ansi_c(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "1\t1700000000.000100\t1700000000.001100\tmain\t100\t0.1\t12\t::\techo hi";

    #[test]
    fn test_parse_record_basic() {
        let record = parse_record(LINE).unwrap();
        assert_eq!(record.pipe_segments, 1);
        assert_eq!(record.start, 1_700_000_000_000_100);
        assert_eq!(record.end, Some(1_700_000_000_001_100));
        assert_eq!(record.cpu_start, None);
        assert_eq!(record.source_line, 12);
        assert_eq!(record.command, "echo hi");
        assert_eq!(record.command_type, CommandType::Normal);
        assert_eq!(record.context().as_str(), "0");
        assert!(!record.forked);
    }

    #[test]
    fn test_parse_record_with_cpu_and_markers() {
        let line = "2\t500\t40\t-\tmain>f\t100>100\t0.4.2\t7\t::\t<<(FUNCTION)>> f arg\t(&)";
        let record = parse_record(line).unwrap();
        assert_eq!(record.pipe_segments, 2);
        assert_eq!(record.cpu_start, Some(40));
        assert_eq!(record.end, None);
        assert_eq!(record.command_type, CommandType::FunctionEntry);
        assert_eq!(record.command, "f arg");
        assert!(record.forked);
        assert_eq!(record.pid(), "100");
        assert!(record.command_type.is_merge_indicator());
    }

    #[test]
    fn test_raw_tabs_and_ansi_quoting_are_escaped() {
        let line = "1\t1\t2\tmain\t1\t0.1\t3\t::\tprintf a\tb";
        assert_eq!(parse_record(line).unwrap().command, "printf a\\tb");

        let line = "1\t1\t2\tmain\t1\t0.1\t3\t::\t$'echo \\'x\\'\\nnext'";
        assert_eq!(parse_record(line).unwrap().command, "echo 'x'\\nnext");
    }

    #[test]
    fn test_malformed_lines_are_errors() {
        assert_eq!(
            parse_record("1\t2\t3"),
            Err(ParseError::MissingCommandMarker)
        );
        assert_eq!(
            parse_record("1\t2\t3\t::\tx"),
            Err(ParseError::FieldCount(3))
        );
        assert!(parse_record("x\t1\t2\tmain\t1\t0.1\t3\t::\tls").is_err());
    }

    #[test]
    fn test_parse_timestamp_forms() {
        assert_eq!(parse_timestamp("12.5").unwrap(), 12_500_000);
        assert_eq!(parse_timestamp("12,000001").unwrap(), 12_000_001);
        assert_eq!(parse_timestamp("12.1234567").unwrap(), 12_123_456);
        assert_eq!(parse_timestamp("42").unwrap(), 42);
        assert!(parse_timestamp("1.x").is_err());
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn test_parse_context_log_skips_duplicates_and_garbage() {
        let content = format!("{LINE}\n{LINE}\ngarbage\n\n{LINE}\n");
        let records = parse_context_log(&content);
        // adjacent duplicate dropped, garbage skipped, the non-adjacent repeat kept
        assert_eq!(records.len(), 2);
    }
}
