//! JSON run summary writer.
//!
//! Writes the machine-readable `profile.json` next to the text profiles.

use crate::aggregator::{HotPath, TimeDistribution};
use crate::timing::Calibration;
use crate::utils::error::OutputError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Machine-readable summary of one profiled run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Schema version of this document
    pub version: String,

    /// Root context id
    pub root: String,

    /// Corrected total runtime of the root context (µs)
    pub total_runtime_us: u64,

    /// Contexts merged, retries included
    pub contexts: usize,

    /// Top-level entries merged over every context
    pub records: usize,

    pub calibration: Calibration,
    pub distribution: TimeDistribution,
    pub hot_paths: Vec<HotPath>,

    /// RFC 3339 timestamp
    pub generated_at: String,
}

/// Write a run summary to a JSON file
///
/// **Public** - main entry point for JSON output
///
/// # Arguments
/// * `summary` - Summary to write
/// * `output_path` - Path to output JSON file
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
pub fn write_summary(summary: &RunSummary, output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    info!("Writing run summary to: {}", output_path.display());

    super::prepare_output_path(output_path)?;

    let file = File::create(output_path).map_err(OutputError::WriteFailed)?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, summary).map_err(OutputError::SerializationFailed)?;

    debug!(
        "Run summary written ({} bytes)",
        super::calculate_file_size(output_path)
    );

    Ok(())
}

/// Read a run summary from a JSON file
///
/// **Public** - useful for validation and testing
///
/// # Errors
/// * `OutputError::WriteFailed` - File read error (reusing WriteFailed for I/O)
/// * `OutputError::SerializationFailed` - JSON parse error
pub fn read_summary(input_path: impl AsRef<Path>) -> Result<RunSummary, OutputError> {
    let input_path = input_path.as_ref();

    debug!("Reading run summary from: {}", input_path.display());

    let file = File::open(input_path).map_err(OutputError::WriteFailed)?;
    let summary: RunSummary = serde_json::from_reader(file).map_err(OutputError::SerializationFailed)?;

    debug!(
        "Run summary loaded: version {}, root {}",
        summary.version, summary.root
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_summary() -> RunSummary {
        RunSummary {
            version: "1.0.0".to_string(),
            root: "0".to_string(),
            total_runtime_us: 3_500,
            contexts: 2,
            records: 5,
            calibration: Calibration::fixed(2, Some(1)),
            distribution: TimeDistribution::default(),
            hot_paths: vec![HotPath {
                stack: "main;sleep 1".to_string(),
                command: "sleep 1".to_string(),
                depth: 1,
                micros: 1_000,
                percentage: 28.57,
            }],
            generated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_write_and_read_summary() {
        let summary = create_test_summary();
        let temp_file = NamedTempFile::new().unwrap();

        write_summary(&summary, temp_file.path()).unwrap();
        let loaded = read_summary(temp_file.path()).unwrap();

        assert_eq!(loaded, summary);
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested_path = temp_dir.path().join("nested/dirs/profile.json");

        write_summary(&create_test_summary(), &nested_path).unwrap();

        assert!(nested_path.exists());
    }
}
