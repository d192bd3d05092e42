//! Disambiguated line ids.
//!
//! Several commands can share one source line (`for i in 1 2; do a; b; done`).
//! Consecutive records on the same line get increasing sub-indexes, and the
//! run restarts at 0 when the command that opened it comes around again, so
//! every loop iteration maps its commands onto the same ids.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source line plus an occurrence index within a run of that line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineId {
    pub line: u32,
    pub sub: u32,
}

impl LineId {
    pub fn new(line: u32, sub: u32) -> Self {
        Self { line, sub }
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sub == 0 {
            write!(f, "{}", self.line)
        } else {
            write!(f, "{}.{}", self.line, self.sub)
        }
    }
}

/// Assign ids to `(source line, command)` pairs given in execution order
pub fn assign_line_ids<'a>(entries: impl IntoIterator<Item = (u32, &'a str)>) -> Vec<LineId> {
    let mut ids = Vec::new();
    let mut current_line: Option<u32> = None;
    let mut opener = "";
    let mut sub = 0u32;

    for (line, command) in entries {
        if current_line == Some(line) {
            if command == opener {
                sub = 0;
            } else {
                sub += 1;
            }
        } else {
            current_line = Some(line);
            opener = command;
            sub = 0;
        }
        ids.push(LineId::new(line, sub));
    }
    ids
}
