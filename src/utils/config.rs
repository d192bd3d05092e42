//! Configuration and constants for the engine.

use std::time::Duration;

/// Current output schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Identifier of the outermost context
pub const ROOT_CONTEXT_ID: &str = "0";

/// Separator between sequence id components (and context depth levels)
pub const SEQUENCE_SEPARATOR: char = '.';

// Raw trace line layout
pub const FIELD_SEPARATOR: char = '\t';
pub const COMMAND_FIELD_MARKER: &str = "::";
pub const UNRESOLVED_END_SENTINEL: &str = "-";
pub const FORK_MARKER: &str = "(&)";
pub const CHAIN_SEPARATOR: char = '>';
pub const FORKED_PID_SUFFIX: char = '&';

/// Fields before the `::` marker without / with the optional CPU column
pub const FIELDS_WITHOUT_CPU: usize = 7;
pub const FIELDS_WITH_CPU: usize = 8;

// Side files written next to each context log
pub const BACKUP_SUFFIX: &str = "orig";
pub const TOTALS_SUFFIX: &str = "totals.json";
pub const COLLAPSED_SUFFIX: &str = "collapsed";
pub const COLLAPSED_TREE_SUFFIX: &str = "collapsed.json";
pub const TEMP_SUFFIX: &str = "tmp";

// Published artifact names
pub const FULL_PROFILE_FILE: &str = "profile.full";
pub const COLLAPSED_PROFILE_FILE: &str = "profile.collapsed";
pub const RAW_FLAMEGRAPH_FILE: &str = "flamegraph.raw";
pub const FOLDED_FLAMEGRAPH_FILE: &str = "flamegraph.folded";
pub const SUMMARY_FILE: &str = "profile.json";

// Rendering
pub const CHILD_ENTRY_PREFIX: &str = "|-- ";
pub const CHILD_NESTED_PREFIX: &str = "|   ";
pub const PIPELINE_JOINER: &str = " | ";
pub const ASYNC_TAG: &str = " (&)";
pub const FOOTER_PREFIX: &str = "TOTAL RUN TIME: ";

/// Percentages are carried as basis points (2 implied decimals)
pub const PERCENT_SCALE: u64 = 10_000;

// Timing calibration
pub const DEFAULT_CALIBRATION_ITERATIONS: u32 = 100_000;
pub const MIN_EVENT_OVERHEAD_US: u64 = 1;

// Child totals polling
pub const DEFAULT_POLL_ATTEMPTS: u32 = 5;
pub const DEFAULT_POLL_BACKOFF: Duration = Duration::from_millis(2);

// Worker pool
pub const DEFAULT_PROGRESS_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// Default number of hot paths reported in the JSON summary
pub const DEFAULT_TOP_PATHS: usize = 20;

/// Default worker cap: ⌈(CPUs + 1) / 2⌉
pub fn default_worker_limit() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus + 1).div_ceil(2)
}
