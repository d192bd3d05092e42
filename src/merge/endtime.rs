//! Resolution of end timestamps that were never recorded.
//!
//! Some single-command child contexts never emit an exit signal. Their end
//! is approximated by the nearest timestamp after their start, searched in
//! the same context first and then in each ancestor's raw log.

use super::context::RunContext;
use crate::parser::{parse_context_log, ContextId, ExecutionRecord, Micros};
use crate::utils::error::MergeError;
use log::debug;
use std::cell::OnceCell;

/// Per-merge resolver; ancestor logs are read lazily, at most once each
pub struct EndTimeResolver<'a> {
    run: &'a RunContext,
    own_starts: Vec<Micros>,
    ancestors: Vec<ContextId>,
    ancestor_times: Vec<OnceCell<Vec<Micros>>>,
}

impl<'a> EndTimeResolver<'a> {
    pub fn new(run: &'a RunContext, context: &ContextId, records: &[ExecutionRecord]) -> Self {
        let mut own_starts: Vec<Micros> = records.iter().map(|r| r.start).collect();
        own_starts.sort_unstable();
        let ancestors = context.ancestors();
        let ancestor_times = ancestors.iter().map(|_| OnceCell::new()).collect();
        Self {
            run,
            own_starts,
            ancestors,
            ancestor_times,
        }
    }

    /// End of `record`, resolving the unresolved sentinel
    pub fn end_of(&self, record: &ExecutionRecord) -> Result<Micros, MergeError> {
        match record.end {
            Some(end) => Ok(end.max(record.start)),
            None => self.resolve(record.start),
        }
    }

    /// Nearest timestamp strictly after `start`
    pub fn resolve(&self, start: Micros) -> Result<Micros, MergeError> {
        if let Some(next) = first_after(&self.own_starts, start) {
            return Ok(next);
        }

        for (index, ancestor) in self.ancestors.iter().enumerate() {
            let times = match self.ancestor_times[index].get() {
                Some(times) => times,
                None => {
                    let loaded = self.load_times(ancestor)?;
                    self.ancestor_times[index].get_or_init(|| loaded)
                }
            };
            if let Some(next) = first_after(times, start) {
                debug!("Resolved end of record starting at {} from ancestor {}", start, ancestor);
                return Ok(next);
            }
        }

        match self.run.run_end {
            Some(run_end) if run_end > start => Ok(run_end),
            _ => Ok(start + 1),
        }
    }

    fn load_times(&self, ancestor: &ContextId) -> Result<Vec<Micros>, MergeError> {
        let Some(raw) = self.run.trace_dir.read_raw(ancestor)? else {
            return Ok(Vec::new());
        };
        let mut times: Vec<Micros> = parse_context_log(&raw)
            .iter()
            .flat_map(|r| std::iter::once(r.start).chain(r.end))
            .collect();
        times.sort_unstable();
        Ok(times)
    }
}

/// Smallest value in sorted `times` strictly greater than `start`
fn first_after(times: &[Micros], start: Micros) -> Option<Micros> {
    let index = times.partition_point(|t| *t <= start);
    times.get(index).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::context::TraceDir;
    use crate::parser::parse_record;
    use crate::timing::Calibration;
    use std::fs;

    fn record(line: &str) -> ExecutionRecord {
        parse_record(line).unwrap()
    }

    #[test]
    fn test_first_after() {
        assert_eq!(first_after(&[1, 5, 9], 5), Some(9));
        assert_eq!(first_after(&[1, 5, 9], 0), Some(1));
        assert_eq!(first_after(&[1, 5, 9], 9), None);
    }

    #[test]
    fn test_resolution_order() {
        let dir = tempfile::tempdir().unwrap();
        let trace = TraceDir::new(dir.path());
        fs::write(
            dir.path().join("0"),
            "1\t100\t200\tmain\t1\t0.1\t1\t::\tfirst\n1\t200\t-\tmain\t1\t0.2\t2\t::\t<<(FORK)>> x\n1\t900\t950\tmain\t1\t0.3\t3\t::\tlast\n",
        )
        .unwrap();

        let run = RunContext::new(trace, Calibration::zero()).with_run_end(Some(5_000));
        let child = ContextId::from_file_name("0.2").unwrap();

        let own = vec![
            record("1\t300\t-\tmain\t1\t0.2.1\t1\t::\ta"),
            record("1\t400\t-\tmain\t1\t0.2.2\t1\t::\tb"),
        ];
        let resolver = EndTimeResolver::new(&run, &child, &own);

        // same context first
        assert_eq!(resolver.end_of(&own[0]).unwrap(), 400);
        // then the parent's raw log
        assert_eq!(resolver.end_of(&own[1]).unwrap(), 900);
        // then the run end, then start + 1
        assert_eq!(resolver.resolve(960).unwrap(), 5_000);
        assert_eq!(resolver.resolve(6_000).unwrap(), 6_001);
    }
}
