//! Arguments of a profiling run and their optional `cmdtrace.toml` source.

use crate::timing::Calibration;
use crate::utils::config::{
    default_worker_limit, DEFAULT_CALIBRATION_ITERATIONS, DEFAULT_POLL_ATTEMPTS,
    DEFAULT_POLL_BACKOFF, DEFAULT_PROGRESS_TIMEOUT, DEFAULT_RETRY_BUDGET, DEFAULT_TOP_PATHS,
};
use crate::utils::error::ConfigError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Arguments for the profile command
///
/// **Public** - built in code, or loaded from TOML and then overridden
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ProfileArgs {
    /// Directory holding the per-context raw logs
    pub trace_dir: PathBuf,

    /// Where artifacts are published (defaults to the trace directory)
    pub output_dir: Option<PathBuf>,

    /// Worker cap per nesting level
    pub max_workers: usize,

    /// No-progress timeout before the pool checks worker liveness
    pub progress_timeout_ms: u64,

    /// Re-runs allowed per context
    pub retry_budget: u32,

    /// Optional wall-clock cap on retries
    pub retry_deadline_ms: Option<u64>,

    /// Use this overhead instead of measuring it
    pub calibration: Option<Calibration>,
    pub calibration_iterations: u32,

    /// Polling of a child's totals that are not there yet
    pub poll_attempts: u32,
    pub poll_backoff_ms: u64,

    /// Keep `<id>.orig` raw-log backups after a successful run
    pub keep_backups: bool,

    /// Number of top hot paths to include in the summary
    pub top_paths: usize,
}

impl Default for ProfileArgs {
    fn default() -> Self {
        Self {
            trace_dir: PathBuf::from("."),
            output_dir: None,
            max_workers: default_worker_limit(),
            progress_timeout_ms: DEFAULT_PROGRESS_TIMEOUT.as_millis() as u64,
            retry_budget: DEFAULT_RETRY_BUDGET,
            retry_deadline_ms: None,
            calibration: None,
            calibration_iterations: DEFAULT_CALIBRATION_ITERATIONS,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            poll_backoff_ms: DEFAULT_POLL_BACKOFF.as_millis() as u64,
            keep_backups: false,
            top_paths: DEFAULT_TOP_PATHS,
        }
    }
}

impl ProfileArgs {
    pub fn new(trace_dir: impl Into<PathBuf>) -> Self {
        Self {
            trace_dir: trace_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    pub fn with_progress_timeout(mut self, timeout: Duration) -> Self {
        self.progress_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    pub fn with_retry_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.retry_deadline_ms = deadline.map(|d| d.as_millis() as u64);
        self
    }

    pub fn with_keep_backups(mut self, keep: bool) -> Self {
        self.keep_backups = keep;
        self
    }

    pub fn output_dir(&self) -> &Path {
        self.output_dir.as_deref().unwrap_or(&self.trace_dir)
    }

    pub fn progress_timeout(&self) -> Duration {
        Duration::from_millis(self.progress_timeout_ms)
    }

    pub fn retry_deadline(&self) -> Option<Duration> {
        self.retry_deadline_ms.map(Duration::from_millis)
    }

    pub fn poll_backoff(&self) -> Duration {
        Duration::from_millis(self.poll_backoff_ms)
    }

    /// Load arguments from a TOML file; missing keys take their defaults
    ///
    /// # Errors
    /// * `ConfigError::Read` - the file cannot be read
    /// * `ConfigError::Invalid` - the file is not valid for these arguments
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Like `from_toml_file`, but a missing or broken file yields defaults
    pub fn load_optional(path: &Path) -> Self {
        match Self::from_toml_file(path) {
            Ok(args) => args,
            Err(ConfigError::Read { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Self::default()
            }
            Err(err) => {
                warn!("Ignoring config {}: {}", path.display(), err);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = ProfileArgs::new("/tmp/trace");
        assert_eq!(args.output_dir(), Path::new("/tmp/trace"));
        assert_eq!(args.progress_timeout(), Duration::from_secs(2));
        assert_eq!(args.retry_budget, 3);
        assert!(args.retry_deadline().is_none());
        assert!(args.max_workers >= 1);
    }

    #[test]
    fn test_toml_partial_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmdtrace.toml");
        std::fs::write(
            &path,
            "trace_dir = \"/var/trace\"\nmax_workers = 2\nretry_deadline_ms = 5000\n\n[calibration]\nwall_overhead_us = 3\n",
        )
        .unwrap();

        let args = ProfileArgs::from_toml_file(&path).unwrap();
        assert_eq!(args.trace_dir, PathBuf::from("/var/trace"));
        assert_eq!(args.max_workers, 2);
        assert_eq!(args.retry_deadline(), Some(Duration::from_secs(5)));
        assert_eq!(args.calibration, Some(Calibration::fixed(3, None)));
        assert_eq!(args.top_paths, DEFAULT_TOP_PATHS);
    }

    #[test]
    fn test_load_optional_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ProfileArgs::load_optional(&dir.path().join("absent.toml"));
        assert_eq!(missing.retry_budget, DEFAULT_RETRY_BUDGET);

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "max_workers = \"many\"").unwrap();
        assert_eq!(ProfileArgs::load_optional(&broken).top_paths, DEFAULT_TOP_PATHS);
    }
}
