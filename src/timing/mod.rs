//! Instrumentation overhead calibration.
//!
//! Every recorded event costs the instrumented interpreter a roughly fixed
//! amount of time. It is measured once per run and subtracted from every
//! timestamp delta the merger computes.

pub mod calibrate;

pub use calibrate::{
    calibrate, process_cpu_micros, wall_clock_micros, Calibration, EventHook, RecordingHook,
};
