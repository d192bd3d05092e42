//! Context log merger: one raw context log in, merged outputs out.
//!
//! Steps, for one context:
//! 1. Back up and parse the raw log (adjacent duplicates dropped)
//! 2. Resolve end times and runtimes; indicators take their child's totals
//! 3. Fold pipeline stages into their first stage (reverse walk)
//! 4. Assign line ids and percent-of-context
//! 5. Render the full log with child logs spliced in, the collapsed view,
//!    and the flamegraph lines of every leaf
//! 6. Persist the totals record for the parent (last, it marks completion)

use super::context::{ContextTotals, RunContext};
use super::endtime::EndTimeResolver;
use super::line_id::assign_line_ids;
use super::render::{splice_child, EntryLine};
use crate::aggregator::collapse::{collapse_occurrences, render_forest, Occurrence};
use crate::flamegraph::FlameLine;
use crate::parser::{parse_context_log, CommandType, ContextId, ExecutionRecord, Micros};
use crate::scheduler::pool::ContextJob;
use crate::timing::Calibration;
use crate::utils::config::{PERCENT_SCALE, PIPELINE_JOINER};
use crate::utils::error::MergeError;
use log::{debug, warn};
use std::sync::Arc;
use std::thread;

/// Result of merging one context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub totals: ContextTotals,
    pub flame_lines: usize,
}

/// A record on its way through the merge
#[derive(Debug)]
struct Stage {
    record: ExecutionRecord,
    command: String,
    end: Micros,
    runtime: Micros,
    cpu: Option<Micros>,
    children: Vec<ContextId>,
    absorbed: bool,
}

impl Stage {
    fn metadata(&self) -> String {
        let mut meta = format!("{}|{}", self.record.pid(), self.record.sequence);
        if let Some(tag) = self.record.command_type.tag() {
            meta.push('|');
            meta.push_str(tag);
        }
        if let Some(cpu) = self.cpu {
            meta.push_str(&format!("|cpu:{}s", super::render::format_secs(cpu)));
        }
        meta
    }

    fn asynchronous(&self) -> bool {
        self.record.forked || self.record.command_type == CommandType::BackgroundFork
    }
}

/// Merge one context
///
/// **Public** - run by the worker pool once every child is merged
///
/// # Errors
/// * `MergeError::Io` - reading the raw log or a side record failed
/// * `MergeError::Serialization` - a child's side record is corrupt
pub fn merge_context(run: &RunContext, id: &ContextId) -> Result<MergeOutcome, MergeError> {
    let dir = &run.trace_dir;
    if !dir.has_log(id) {
        debug!("Context {} has no log, nothing to merge", id);
        return Ok(MergeOutcome {
            totals: ContextTotals { runtime: 0, end: 0, records: 0 },
            flame_lines: 0,
        });
    }

    dir.backup(id)?;
    let raw = dir.read_raw(id)?.unwrap_or_default();
    let mut records = parse_context_log(&raw);
    records.retain(|record| {
        let belongs = record.context() == *id;
        if !belongs {
            warn!("Dropping record {} found in log of context {}", record.sequence, id);
        }
        belongs
    });
    records.sort_by(|a, b| a.sequence.cmp(&b.sequence));

    let resolver = EndTimeResolver::new(run, id, &records);
    let mut stages = build_stages(run, id, records, &resolver)?;
    absorb_pipelines(&mut stages, &run.calibration);
    let entries: Vec<Stage> = stages.into_iter().filter(|s| !s.absorbed).collect();

    let total: Micros = entries.iter().map(|s| s.runtime).sum();
    let end = entries.iter().map(|s| s.end).max().unwrap_or(0);
    let runtimes: Vec<Micros> = entries.iter().map(|s| s.runtime).collect();
    let percents = percent_of_context(&runtimes, total);
    let line_ids = assign_line_ids(
        entries
            .iter()
            .map(|s| (s.record.source_line, s.command.as_str())),
    );

    let mut full: Vec<String> = Vec::with_capacity(entries.len());
    let mut occurrences = Vec::with_capacity(entries.len());
    let mut flame = Vec::new();

    for ((stage, line_id), percent) in entries.iter().zip(line_ids).zip(percents) {
        let metadata = stage.metadata();
        full.push(
            EntryLine {
                line_id: line_id.to_string(),
                runtime: stage.runtime,
                percent,
                metadata: &metadata,
                command: &stage.command,
                asynchronous: stage.asynchronous(),
            }
            .render(),
        );

        let mut child_trees = Vec::with_capacity(stage.children.len());
        for child in &stage.children {
            splice_child(&dir.read_merged(child)?, &mut full);
            child_trees.push(dir.read_collapsed_tree(child)?);
        }

        if stage.children.is_empty() {
            flame.push(FlameLine::new(
                &stage.record.ancestry,
                &stage.command,
                stage.runtime,
            ));
        }

        occurrences.push(Occurrence {
            line: line_id,
            command: stage.command.clone(),
            runtime: stage.runtime,
            percent,
            children: child_trees,
        });
    }

    let collapsed = collapse_occurrences(occurrences);
    let collapsed_text = render_forest(&collapsed);

    dir.write_atomic(&dir.log_path(id), join_lines(&full).as_bytes())?;
    dir.write_atomic(&dir.collapsed_path(id), join_lines(&collapsed_text).as_bytes())?;
    dir.write_collapsed_tree(id, &collapsed)?;

    let flame_lines = flame.len();
    run.flamegraph.record(id, flame);

    let totals = ContextTotals {
        runtime: total,
        end,
        records: entries.len(),
    };
    dir.write_totals(id, &totals)?;
    run.note_merged(entries.len());

    debug!(
        "Merged context {}: {} entries, {}us total",
        id,
        entries.len(),
        total
    );

    Ok(MergeOutcome {
        totals,
        flame_lines,
    })
}

/// Resolve end time, runtime and CPU time of every record
fn build_stages(
    run: &RunContext,
    id: &ContextId,
    records: Vec<ExecutionRecord>,
    resolver: &EndTimeResolver<'_>,
) -> Result<Vec<Stage>, MergeError> {
    let next_cpu: Vec<Option<Micros>> = (0..records.len())
        .map(|i| records.get(i + 1).and_then(|r| r.cpu_start))
        .collect();

    let mut stages = Vec::with_capacity(records.len());
    for (record, next_cpu) in records.into_iter().zip(next_cpu) {
        let cpu = match (record.cpu_start, next_cpu) {
            (Some(own), Some(next)) => Some(run.calibration.correct_cpu(next.saturating_sub(own))),
            _ => None,
        };

        let merged_child = if record.command_type.is_merge_indicator() {
            let child = record.sequence.child_context();
            child_totals(run, id, &child)?
                .filter(|totals| totals.records > 0)
                .map(|totals| (child, totals))
        } else {
            None
        };

        let (end, runtime, children) = match merged_child {
            Some((child, totals)) => (totals.end.max(record.start), totals.runtime, vec![child]),
            None => {
                let end = resolver.end_of(&record)?;
                let runtime = run.calibration.correct_wall(end - record.start);
                (end, runtime, Vec::new())
            }
        };

        stages.push(Stage {
            command: record.command.clone(),
            record,
            end,
            runtime,
            cpu,
            children,
            absorbed: false,
        });
    }
    Ok(stages)
}

/// Read a child's totals, polling briefly if they are not there yet
///
/// Returns `Ok(None)` when the child never produced a log or its totals
/// did not appear in time; the caller substitutes a best-effort value.
fn child_totals(
    run: &RunContext,
    parent: &ContextId,
    child: &ContextId,
) -> Result<Option<ContextTotals>, MergeError> {
    if !run.trace_dir.has_log(child) {
        debug!("Child context {} of {} recorded nothing", child, parent);
        return Ok(None);
    }

    let mut delay = run.poll_backoff;
    for attempt in 0..=run.poll_attempts {
        if let Some(totals) = run.trace_dir.read_totals(child)? {
            return Ok(Some(totals));
        }
        if attempt < run.poll_attempts {
            thread::sleep(delay);
            delay = delay.saturating_mul(2);
        }
    }

    warn!(
        "{}; using the indicator's own span",
        MergeError::UnresolvedReference {
            parent: parent.to_string(),
            child: child.to_string(),
        }
    );
    Ok(None)
}

/// Fold pipeline stages into the first stage, walking backwards so each
/// stage absorbs an already-folded remainder
fn absorb_pipelines(stages: &mut [Stage], calibration: &Calibration) {
    for i in (0..stages.len().saturating_sub(1)).rev() {
        let (front, back) = stages.split_at_mut(i + 1);
        let head = &mut front[i];
        let tail = &mut back[0];

        let segments = head.record.pipe_segments;
        if segments <= 1 || segments != tail.record.pipe_segments + 1 {
            continue;
        }

        head.command = format!("{}{}{}", head.command, PIPELINE_JOINER, tail.command);
        head.end = tail.end;
        head.children.append(&mut tail.children);
        head.runtime = calibration.correct_wall(head.end.saturating_sub(head.record.start));
        head.cpu = match (head.cpu, tail.cpu) {
            (Some(a), Some(b)) => Some(a + b),
            (cpu, None) | (None, cpu) => cpu,
        };
        tail.absorbed = true;
    }
}

/// Percent of context in basis points
///
/// Each entry gets the difference of the rounded cumulative shares, so no
/// entry goes negative and the column always sums to exactly 100.00%.
pub fn percent_of_context(runtimes: &[Micros], total: Micros) -> Vec<u64> {
    if runtimes.len() == 1 {
        return vec![PERCENT_SCALE];
    }
    if total == 0 {
        return vec![0; runtimes.len()];
    }

    let total = u128::from(total);
    let scale = u128::from(PERCENT_SCALE);
    let mut cumulative: u128 = 0;
    let mut previous: u64 = 0;
    runtimes
        .iter()
        .map(|rt| {
            cumulative += u128::from(*rt);
            let rounded = ((cumulative * scale + total / 2) / total).min(scale) as u64;
            let percent = rounded.saturating_sub(previous);
            previous = previous.max(rounded);
            percent
        })
        .collect()
}

fn join_lines(lines: &[String]) -> String {
    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Worker-pool job that merges contexts of one run
#[derive(Debug, Clone)]
pub struct MergeJob {
    run: Arc<RunContext>,
}

impl MergeJob {
    pub fn new(run: Arc<RunContext>) -> Self {
        Self { run }
    }
}

impl ContextJob for MergeJob {
    fn run(&self, id: &ContextId) -> Result<(), MergeError> {
        merge_context(&self.run, id).map(|_| ())
    }

    fn restore(&self, id: &ContextId) -> Result<(), MergeError> {
        self.run.trace_dir.restore(id)
    }
}
