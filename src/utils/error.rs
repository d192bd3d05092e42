//! Error types for the entire engine.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in the commands layer.

use thiserror::Error;

/// Errors that can occur while parsing one raw trace line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing '::' command marker")]
    MissingCommandMarker,

    #[error("unexpected number of metadata fields before '::': {0}")]
    FieldCount(usize),

    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("ancestry chains differ in length (functions: {functions}, processes: {processes})")]
    AncestryMismatch { functions: usize, processes: usize },
}

/// Errors that can occur while merging one context log
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize side record {path}: {source}")]
    Serialization {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Logged, never returned: a best-effort value replaces the child's totals
    #[error("Child context {child} of {parent} has no totals record")]
    UnresolvedReference { parent: String, child: String },
}

impl MergeError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn serialization(path: impl AsRef<std::path::Path>, source: serde_json::Error) -> Self {
        Self::Serialization {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Errors that can occur while scheduling context merges
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("No context logs found in {0}")]
    NoContexts(String),

    #[error("Expected a single root context, found: {}", .0.join(", "))]
    MultipleRoots(Vec<String>),

    #[error("No worker is active while {pending} context(s) remain unfinished")]
    WorkerLiveness { pending: usize },

    #[error("Retry budget exhausted; unresolved contexts: {}", .ids.join(", "))]
    RetryBudgetExhausted { ids: Vec<String> },

    #[error("Failed to list trace directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during final assembly
#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("Root context {0} has not been merged")]
    RootNotMerged(String),

    #[error("Root context reports zero total runtime")]
    EmptyRoot,

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}

/// Errors that can occur while loading run configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(#[from] toml::de::Error),
}
