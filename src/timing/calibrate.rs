//! Timing corrector: measure the per-event cost of the instrumentation hook.

use crate::parser::Micros;
use crate::utils::config::{DEFAULT_CALIBRATION_ITERATIONS, MIN_EVENT_OVERHEAD_US};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::hint::black_box;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Per-event overhead subtracted from every measured delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calibration {
    /// Wall-clock overhead per event
    pub wall_overhead_us: Micros,

    /// CPU-time overhead per event, when the process CPU clock is readable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_overhead_us: Option<Micros>,
}

impl Default for Calibration {
    fn default() -> Self {
        Self::fixed(MIN_EVENT_OVERHEAD_US, None)
    }
}

impl Calibration {
    /// A calibration supplied up front instead of measured
    pub fn fixed(wall_overhead_us: Micros, cpu_overhead_us: Option<Micros>) -> Self {
        Self {
            wall_overhead_us,
            cpu_overhead_us,
        }
    }

    /// No correction at all (deterministic tests, pre-corrected traces)
    pub fn zero() -> Self {
        Self::fixed(0, None)
    }

    /// Corrected wall-clock runtime, never below one microsecond
    pub fn correct_wall(&self, delta: Micros) -> Micros {
        delta.saturating_sub(self.wall_overhead_us).max(1)
    }

    /// Corrected CPU time; only the wall correction applies when CPU
    /// sampling was unavailable during calibration
    pub fn correct_cpu(&self, delta: Micros) -> Micros {
        delta.saturating_sub(self.cpu_overhead_us.unwrap_or(0))
    }
}

/// The instrumentation action performed once per recorded event
pub trait EventHook {
    fn on_event(&mut self);
}

/// Default hook: sample both clocks and format one raw trace line,
/// which is what the instrumentation does for every command.
#[derive(Debug, Default)]
pub struct RecordingHook {
    buffer: String,
    sequence: u64,
}

impl RecordingHook {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventHook for RecordingHook {
    fn on_event(&mut self) {
        let wall = wall_clock_micros();
        let cpu = process_cpu_micros().unwrap_or(0);
        self.sequence += 1;
        self.buffer.clear();
        let _ = write!(
            self.buffer,
            "1\t{}.{:06}\t{}\t-\tmain\t0\t0.{}\t0\t::\t:",
            wall / 1_000_000,
            wall % 1_000_000,
            cpu,
            self.sequence
        );
        black_box(&self.buffer);
    }
}

/// Wall-clock time since the Unix epoch
pub fn wall_clock_micros() -> Micros {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as Micros)
        .unwrap_or(0)
}

/// CPU time consumed by this process, if the platform exposes it
pub fn process_cpu_micros() -> Option<Micros> {
    process_cpu_nanos().map(|ns| ns / 1_000)
}

#[cfg(unix)]
fn process_cpu_nanos() -> Option<u64> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_PROCESS_CPUTIME_ID, &mut ts) };
    if rc != 0 {
        return None;
    }
    Some(ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64)
}

#[cfg(not(unix))]
fn process_cpu_nanos() -> Option<u64> {
    None
}

/// Elapsed wall and CPU nanoseconds of `iterations` runs of `body`
fn measure(iterations: u32, mut body: impl FnMut()) -> (u64, Option<u64>) {
    let cpu_before = process_cpu_nanos();
    let started = Instant::now();
    for i in 0..iterations {
        body();
        black_box(i);
    }
    let wall = started.elapsed().as_nanos() as u64;
    let cpu = match (cpu_before, process_cpu_nanos()) {
        (Some(before), Some(after)) => Some(after.saturating_sub(before)),
        _ => None,
    };
    (wall, cpu)
}

/// Per-event overhead in microseconds, floored at the minimum
fn per_event_overhead(idle_ns: u64, armed_ns: u64, iterations: u32) -> Micros {
    let per_event_ns = armed_ns.saturating_sub(idle_ns) / u64::from(iterations.max(1));
    // round to the nearest microsecond
    ((per_event_ns + 500) / 1_000).max(MIN_EVENT_OVERHEAD_US)
}

/// Measure the per-event overhead of `hook`
///
/// **Public** - run once per profiling run
///
/// Runs the empty loop disarmed, then with the hook fired before every
/// iteration, and normalizes the difference.
pub fn calibrate(hook: &mut dyn EventHook, iterations: u32) -> Calibration {
    let iterations = if iterations == 0 {
        DEFAULT_CALIBRATION_ITERATIONS
    } else {
        iterations
    };
    debug!("Calibrating instrumentation overhead over {} iterations", iterations);

    let (idle_wall, idle_cpu) = measure(iterations, || {});
    let (armed_wall, armed_cpu) = measure(iterations, || hook.on_event());

    let wall_overhead_us = per_event_overhead(idle_wall, armed_wall, iterations);
    let cpu_overhead_us = match (idle_cpu, armed_cpu) {
        (Some(idle), Some(armed)) => Some(per_event_overhead(idle, armed, iterations)),
        _ => None,
    };

    info!(
        "Instrumentation overhead: {}us wall, {} cpu",
        wall_overhead_us,
        cpu_overhead_us
            .map(|c| format!("{}us", c))
            .unwrap_or_else(|| "unavailable".to_string())
    );

    Calibration {
        wall_overhead_us,
        cpu_overhead_us,
    }
}
