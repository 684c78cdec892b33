//! System-wide constants for the ecat workspace.
//!
//! Single source of truth for cycle timing, drive limits and defaults.

use static_assertions::const_assert;

/// Nanoseconds per second.
pub const NSEC_PER_SEC: i64 = 1_000_000_000;

/// Default cycle time in microseconds (1 kHz).
pub const DEFAULT_CYCLE_TIME_US: u32 = 1000;

/// Shortest accepted cycle time in microseconds.
pub const MIN_CYCLE_TIME_US: u32 = 100;

/// Longest accepted cycle time in microseconds.
pub const MAX_CYCLE_TIME_US: u32 = 1_000_000;

/// Hard velocity limit [rev/s]. Requests beyond it are clamped at config time.
pub const MAX_VELOCITY_REV_PER_S: f64 = 50.0;

/// Default target velocity [rev/s].
pub const DEFAULT_VELOCITY_REV_PER_S: f64 = 1.0;

/// Default encoder resolution (23-bit single-turn encoder).
pub const DEFAULT_ENCODER_COUNTS_PER_REV: u32 = 1 << 23;

/// Default SCHED_FIFO priority for the cyclic thread.
pub const DEFAULT_RT_PRIORITY: i32 = 99;

/// Default bus master backend.
pub const DEFAULT_MASTER: &str = "simulation";

/// Cyclic thread name.
pub const CYCLIC_THREAD_NAME: &str = "ecat-cyclic";

const_assert!(MIN_CYCLE_TIME_US <= DEFAULT_CYCLE_TIME_US);
const_assert!(DEFAULT_CYCLE_TIME_US <= MAX_CYCLE_TIME_US);
const_assert!(DEFAULT_ENCODER_COUNTS_PER_REV > 0);
