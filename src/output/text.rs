//! Text artifact writer (profiles and flamegraph traces).

use crate::utils::error::OutputError;
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write text lines to a file, one per line, newline terminated
///
/// **Public** - used for every published text artifact
///
/// # Arguments
/// * `lines` - Lines to write
/// * `output_path` - Path to output file
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::InvalidPath` - Path is invalid
pub fn write_artifact<S: AsRef<str>>(
    lines: &[S],
    output_path: impl AsRef<Path>,
) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    super::prepare_output_path(output_path)?;

    let file = File::create(output_path).map_err(OutputError::WriteFailed)?;
    let mut writer = BufWriter::new(file);

    for line in lines {
        writer
            .write_all(line.as_ref().as_bytes())
            .map_err(OutputError::WriteFailed)?;
        writer.write_all(b"\n").map_err(OutputError::WriteFailed)?;
    }
    writer.flush().map_err(OutputError::WriteFailed)?;

    info!(
        "Wrote {} ({} lines, {:.2} KB)",
        output_path.display(),
        lines.len(),
        super::calculate_file_size(output_path) as f64 / 1024.0
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_write_artifact() {
        let temp_file = NamedTempFile::new().unwrap();
        write_artifact(&["a", "b"], temp_file.path()).unwrap();
        assert_eq!(std::fs::read_to_string(temp_file.path()).unwrap(), "a\nb\n");
    }

    #[test]
    fn test_write_empty_artifact() {
        let temp_file = NamedTempFile::new().unwrap();
        write_artifact::<&str>(&[], temp_file.path()).unwrap();
        assert_eq!(std::fs::read_to_string(temp_file.path()).unwrap(), "");
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested_path = temp_dir.path().join("nested/dirs/profile.full");

        write_artifact(&["x"], &nested_path).unwrap();

        assert!(nested_path.exists());
    }
}
