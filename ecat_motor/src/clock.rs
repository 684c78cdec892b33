//! Cycle time source.
//!
//! `CycleClock` is the only suspension point of the cyclic thread: the
//! runner asks it for the current time and blocks on it until an absolute
//! deadline. `MonotonicClock` is `CLOCK_MONOTONIC` with
//! `clock_nanosleep(TIMER_ABSTIME)`; `SimulatedClock` advances virtual time
//! instantly and can inject wake-up jitter.

use ecat_common::consts::NSEC_PER_SEC;
use nix::errno::Errno;
use nix::sys::time::TimeSpec;
use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};
use thiserror::Error;

/// Clock access failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{op} failed: {errno}")]
pub struct ClockError {
    /// Failing call.
    pub op: &'static str,
    /// OS error.
    pub errno: Errno,
}

// ─── Monotonic Time ─────────────────────────────────────────────────

/// Point on the monotonic time line, normalized to `0 <= nanos < 1 s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MonoTime {
    secs: i64,
    nanos: i64,
}

impl MonoTime {
    /// Build from seconds and nanoseconds, carrying excess nanoseconds.
    pub const fn new(secs: i64, nanos: i64) -> Self {
        Self {
            secs: secs + nanos.div_euclid(NSEC_PER_SEC),
            nanos: nanos.rem_euclid(NSEC_PER_SEC),
        }
    }

    /// Build from a nanosecond count.
    pub const fn from_nanos(nanos: u64) -> Self {
        Self {
            secs: (nanos / NSEC_PER_SEC as u64) as i64,
            nanos: (nanos % NSEC_PER_SEC as u64) as i64,
        }
    }

    /// Whole seconds.
    pub const fn secs(&self) -> i64 {
        self.secs
    }

    /// Sub-second nanoseconds.
    pub const fn subsec_nanos(&self) -> i64 {
        self.nanos
    }

    /// `self + ns` with exact carry into seconds.
    #[inline]
    pub const fn add_ns(self, ns: i64) -> Self {
        Self::new(
            self.secs + ns.div_euclid(NSEC_PER_SEC),
            self.nanos + ns.rem_euclid(NSEC_PER_SEC),
        )
    }

    /// `self - earlier` in nanoseconds.
    #[inline]
    pub const fn diff_ns(self, earlier: Self) -> i64 {
        (self.secs - earlier.secs) * NSEC_PER_SEC + (self.nanos - earlier.nanos)
    }

    /// Nanoseconds since the clock epoch, for distributed-clock stamps.
    ///
    /// Times before the epoch map to 0.
    #[inline]
    pub const fn as_nanos(self) -> u64 {
        if self.secs < 0 {
            0
        } else {
            self.secs as u64 * NSEC_PER_SEC as u64 + self.nanos as u64
        }
    }
}

impl From<TimeSpec> for MonoTime {
    fn from(ts: TimeSpec) -> Self {
        Self::new(ts.tv_sec() as i64, ts.tv_nsec() as i64)
    }
}

impl From<MonoTime> for TimeSpec {
    fn from(t: MonoTime) -> Self {
        TimeSpec::new(t.secs as _, t.nanos as _)
    }
}

// ─── Clock Trait ────────────────────────────────────────────────────

/// Time source driving the cyclic scheduler.
pub trait CycleClock {
    /// Current monotonic time.
    fn now(&mut self) -> Result<MonoTime, ClockError>;

    /// Block until `deadline` has passed. Returns immediately if it already has.
    fn sleep_until(&mut self, deadline: MonoTime) -> Result<(), ClockError>;
}

/// `CLOCK_MONOTONIC` with absolute-time sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl CycleClock for MonotonicClock {
    #[inline]
    fn now(&mut self) -> Result<MonoTime, ClockError> {
        clock_gettime(ClockId::CLOCK_MONOTONIC)
            .map(MonoTime::from)
            .map_err(|errno| ClockError {
                op: "clock_gettime",
                errno,
            })
    }

    fn sleep_until(&mut self, deadline: MonoTime) -> Result<(), ClockError> {
        let request = TimeSpec::from(deadline);
        loop {
            match clock_nanosleep(
                ClockId::CLOCK_MONOTONIC,
                ClockNanosleepFlags::TIMER_ABSTIME,
                &request,
            ) {
                Ok(_) => return Ok(()),
                // Absolute sleeps resume at the same deadline.
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    return Err(ClockError {
                        op: "clock_nanosleep",
                        errno,
                    });
                }
            }
        }
    }
}

// ─── Simulated Clock ────────────────────────────────────────────────

/// Jitter source: wake-up index → extra delay [ns].
pub type JitterFn = Box<dyn FnMut(u64) -> i64 + Send>;

/// Virtual clock for tests and benchmarks.
///
/// `sleep_until` jumps to the deadline (or stays put if it already passed)
/// plus the jitter for that wake-up. Each `now()` call then advances time by
/// a fixed work cost, modelling the cycle body.
pub struct SimulatedClock {
    now: MonoTime,
    work_ns: i64,
    jitter: JitterFn,
    wakeups: u64,
    deadlines: Vec<MonoTime>,
}

impl SimulatedClock {
    /// Clock starting at `start` with no jitter and zero work cost.
    pub fn new(start: MonoTime) -> Self {
        Self {
            now: start,
            work_ns: 0,
            jitter: Box::new(|_| 0),
            wakeups: 0,
            deadlines: Vec::new(),
        }
    }

    /// Inject wake-up jitter.
    pub fn with_jitter(mut self, jitter: impl FnMut(u64) -> i64 + Send + 'static) -> Self {
        self.jitter = Box::new(jitter);
        self
    }

    /// Time consumed by each `now()` call [ns].
    pub fn with_work_ns(mut self, work_ns: i64) -> Self {
        self.work_ns = work_ns;
        self
    }

    /// Deadlines requested so far, in order.
    pub fn deadlines(&self) -> &[MonoTime] {
        &self.deadlines
    }

    /// Completed sleeps.
    pub const fn wakeups(&self) -> u64 {
        self.wakeups
    }
}

impl CycleClock for SimulatedClock {
    fn now(&mut self) -> Result<MonoTime, ClockError> {
        let t = self.now;
        self.now = self.now.add_ns(self.work_ns);
        Ok(t)
    }

    fn sleep_until(&mut self, deadline: MonoTime) -> Result<(), ClockError> {
        self.deadlines.push(deadline);
        let jitter = (self.jitter)(self.wakeups).max(0);
        self.wakeups += 1;
        self.now = self.now.max(deadline).add_ns(jitter);
        Ok(())
    }
}

impl std::fmt::Debug for SimulatedClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedClock")
            .field("now", &self.now)
            .field("work_ns", &self.work_ns)
            .field("wakeups", &self.wakeups)
            .finish_non_exhaustive()
    }
}
