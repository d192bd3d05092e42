//! Run-wide state and the on-disk layout of a trace directory.
//!
//! Every context lives in one file named by its id. Merging backs the raw
//! file up to `<id>.orig`, replaces `<id>` with the merged full log, and
//! writes side files next to it:
//!
//! - `<id>.collapsed` / `<id>.collapsed.json` - loop-collapsed view
//! - `<id>.totals.json` - runtime and end time read by the parent

use crate::aggregator::collapse::CollapsedNode;
use crate::flamegraph::FlamegraphSink;
use crate::parser::{parse_context_log, ContextId, Micros};
use crate::timing::Calibration;
use crate::utils::config::{
    BACKUP_SUFFIX, COLLAPSED_SUFFIX, COLLAPSED_TREE_SUFFIX, DEFAULT_POLL_ATTEMPTS,
    DEFAULT_POLL_BACKOFF, TEMP_SUFFIX, TOTALS_SUFFIX,
};
use crate::utils::error::MergeError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Runtime / end-time side record of a fully merged context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextTotals {
    /// Corrected total runtime of the context's top-level entries
    pub runtime: Micros,

    /// Final end timestamp of the context
    pub end: Micros,

    /// Number of top-level entries (0 = nothing was recorded)
    pub records: usize,
}

/// Paths of a trace directory
#[derive(Debug, Clone)]
pub struct TraceDir {
    root: PathBuf,
}

impl TraceDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Raw log before merging, merged full log afterwards
    pub fn log_path(&self, id: &ContextId) -> PathBuf {
        self.root.join(id.as_str())
    }

    pub fn backup_path(&self, id: &ContextId) -> PathBuf {
        self.side_path(id, BACKUP_SUFFIX)
    }

    pub fn totals_path(&self, id: &ContextId) -> PathBuf {
        self.side_path(id, TOTALS_SUFFIX)
    }

    pub fn collapsed_path(&self, id: &ContextId) -> PathBuf {
        self.side_path(id, COLLAPSED_SUFFIX)
    }

    pub fn collapsed_tree_path(&self, id: &ContextId) -> PathBuf {
        self.side_path(id, COLLAPSED_TREE_SUFFIX)
    }

    fn side_path(&self, id: &ContextId, suffix: &str) -> PathBuf {
        self.root.join(format!("{}.{}", id, suffix))
    }

    /// Every context log in the directory, in id order
    pub fn list_contexts(&self) -> std::io::Result<Vec<ContextId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(ContextId::from_file_name) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Whether the instrumentation ever produced a log for `id`
    pub fn has_log(&self, id: &ContextId) -> bool {
        self.log_path(id).is_file() || self.backup_path(id).is_file()
    }

    /// Raw content of a context: the backup once merging has started
    pub fn read_raw(&self, id: &ContextId) -> Result<Option<String>, MergeError> {
        for path in [self.backup_path(id), self.log_path(id)] {
            match fs::read_to_string(&path) {
                Ok(content) => return Ok(Some(content)),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(MergeError::io(&path, e)),
            }
        }
        Ok(None)
    }

    /// Back the raw log up before it is replaced (kept across retries)
    pub fn backup(&self, id: &ContextId) -> Result<(), MergeError> {
        let backup = self.backup_path(id);
        if backup.exists() {
            return Ok(());
        }
        let log = self.log_path(id);
        let tmp = self.side_path(id, &format!("{}.{}", BACKUP_SUFFIX, TEMP_SUFFIX));
        fs::copy(&log, &tmp).map_err(|e| MergeError::io(&log, e))?;
        fs::rename(&tmp, &backup).map_err(|e| MergeError::io(&backup, e))?;
        Ok(())
    }

    /// Undo a partial merge: put the raw log back and drop side records
    pub fn restore(&self, id: &ContextId) -> Result<(), MergeError> {
        let backup = self.backup_path(id);
        if backup.exists() {
            let log = self.log_path(id);
            fs::copy(&backup, &log).map_err(|e| MergeError::io(&log, e))?;
        }
        for path in [
            self.totals_path(id),
            self.collapsed_path(id),
            self.collapsed_tree_path(id),
        ] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(MergeError::io(&path, e)),
            }
        }
        debug!("Restored context {} from backup", id);
        Ok(())
    }

    /// Delete every raw-log backup (after a successful run)
    pub fn remove_backups(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        for id in self.list_contexts()? {
            match fs::remove_file(self.backup_path(&id)) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }

    /// Write through a temp file and rename, so readers never see a torn file
    pub fn write_atomic(&self, path: &Path, content: &[u8]) -> Result<(), MergeError> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".");
        tmp.push(TEMP_SUFFIX);
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, content).map_err(|e| MergeError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| MergeError::io(path, e))
    }

    pub fn read_totals(&self, id: &ContextId) -> Result<Option<ContextTotals>, MergeError> {
        let path = self.totals_path(id);
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| MergeError::serialization(&path, e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MergeError::io(&path, e)),
        }
    }

    pub fn write_totals(&self, id: &ContextId, totals: &ContextTotals) -> Result<(), MergeError> {
        let path = self.totals_path(id);
        let json = serde_json::to_vec(totals).map_err(|e| MergeError::serialization(&path, e))?;
        self.write_atomic(&path, &json)
    }

    /// Merged full log of a finished context (empty when it had no records)
    pub fn read_merged(&self, id: &ContextId) -> Result<String, MergeError> {
        let path = self.log_path(id);
        fs::read_to_string(&path).map_err(|e| MergeError::io(&path, e))
    }

    pub fn read_collapsed(&self, id: &ContextId) -> Result<String, MergeError> {
        let path = self.collapsed_path(id);
        fs::read_to_string(&path).map_err(|e| MergeError::io(&path, e))
    }

    /// Structured collapsed tree of a finished context; empty when absent
    pub fn read_collapsed_tree(&self, id: &ContextId) -> Result<Vec<CollapsedNode>, MergeError> {
        let path = self.collapsed_tree_path(id);
        match fs::read_to_string(&path) {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| MergeError::serialization(&path, e))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(MergeError::io(&path, e)),
        }
    }

    pub fn write_collapsed_tree(
        &self,
        id: &ContextId,
        nodes: &[CollapsedNode],
    ) -> Result<(), MergeError> {
        let path = self.collapsed_tree_path(id);
        let json = serde_json::to_vec(nodes).map_err(|e| MergeError::serialization(&path, e))?;
        self.write_atomic(&path, &json)
    }
}

/// State shared by every merge in one run
///
/// Read-only apart from the flamegraph sink and the progress counters.
#[derive(Debug)]
pub struct RunContext {
    pub trace_dir: TraceDir,
    pub calibration: Calibration,

    /// Latest timestamp of the whole run; last-resort end for unresolved records
    pub run_end: Option<Micros>,

    /// Attempts / first delay when a child's totals are not there yet
    pub poll_attempts: u32,
    pub poll_backoff: Duration,

    pub flamegraph: FlamegraphSink,

    merged_contexts: AtomicUsize,
    merged_records: AtomicUsize,
}

impl RunContext {
    pub fn new(trace_dir: TraceDir, calibration: Calibration) -> Self {
        Self {
            trace_dir,
            calibration,
            run_end: None,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            poll_backoff: DEFAULT_POLL_BACKOFF,
            flamegraph: FlamegraphSink::new(),
            merged_contexts: AtomicUsize::new(0),
            merged_records: AtomicUsize::new(0),
        }
    }

    pub fn with_run_end(mut self, run_end: Option<Micros>) -> Self {
        self.run_end = run_end;
        self
    }

    pub fn with_polling(mut self, attempts: u32, backoff: Duration) -> Self {
        self.poll_attempts = attempts;
        self.poll_backoff = backoff;
        self
    }

    /// Latest timestamp recorded by the root context
    pub fn detect_run_end(&self) -> Result<Option<Micros>, MergeError> {
        let Some(raw) = self.trace_dir.read_raw(&ContextId::root())? else {
            return Ok(None);
        };
        Ok(parse_context_log(&raw)
            .iter()
            .map(|r| r.end.unwrap_or(r.start).max(r.start))
            .max())
    }

    pub(crate) fn note_merged(&self, records: usize) {
        self.merged_contexts.fetch_add(1, Ordering::Relaxed);
        self.merged_records.fetch_add(records, Ordering::Relaxed);
    }

    /// Contexts merged so far (retries count again)
    pub fn merged_contexts(&self) -> usize {
        self.merged_contexts.load(Ordering::Relaxed)
    }

    /// Top-level entries merged so far
    pub fn merged_records(&self) -> usize {
        self.merged_records.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_restore_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let trace = TraceDir::new(dir.path());
        let id = ContextId::from_file_name("0.2").unwrap();
        fs::write(trace.log_path(&id), "raw").unwrap();

        trace.backup(&id).unwrap();
        fs::write(trace.log_path(&id), "merged").unwrap();
        trace
            .write_totals(&id, &ContextTotals { runtime: 5, end: 9, records: 1 })
            .unwrap();
        assert_eq!(trace.read_raw(&id).unwrap().as_deref(), Some("raw"));

        trace.restore(&id).unwrap();
        assert_eq!(fs::read_to_string(trace.log_path(&id)).unwrap(), "raw");
        assert!(trace.read_totals(&id).unwrap().is_none());
    }

    #[test]
    fn test_list_contexts_ignores_side_files() {
        let dir = tempfile::tempdir().unwrap();
        let trace = TraceDir::new(dir.path());
        for name in ["0", "0.1", "0.10", "0.1.orig", "0.1.totals.json", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let ids: Vec<String> = trace
            .list_contexts()
            .unwrap()
            .iter()
            .map(|i| i.to_string())
            .collect();
        assert_eq!(ids, vec!["0", "0.1", "0.10"]);
    }

    #[test]
    fn test_totals_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let trace = TraceDir::new(dir.path());
        let id = ContextId::root();
        assert!(trace.read_totals(&id).unwrap().is_none());
        let totals = ContextTotals { runtime: 3500, end: 42, records: 4 };
        trace.write_totals(&id, &totals).unwrap();
        assert_eq!(trace.read_totals(&id).unwrap(), Some(totals));
    }
}
