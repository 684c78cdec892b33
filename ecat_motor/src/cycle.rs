//! Deterministic RT cycle: wait → receive → decide → send.
//!
//! ## RT Setup Sequence
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)`: lock all pages.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity`: pin to the configured CPU core (optional).
//! 4. `pthread_setschedparam(SCHED_FIFO)`: configured priority, or the
//!    highest available.
//!
//! Every step is attempted in every build. With the `rt` feature a failed
//! step is fatal; without it the failure is logged and the cycle runs with
//! whatever was granted.
//!
//! ## Cycle Loop
//! Deadlines advance by exactly one period from the previous deadline, never
//! from the wake-up time, so lateness does not accumulate. The run flag is
//! checked once per cycle boundary; a cycle that has started always
//! completes, including its `send()`.
//!
//! ## Cycle Body
//! 1. Sleep until the absolute deadline, record wake-up latency.
//! 2. `receive()` into the domain.
//! 3. Statusword → state machine → controlword.
//! 4. In `OperationEnabled`, write the motion target.
//! 5. Write controlword and mode of operation.
//! 6. Stamp the distributed clock with the current monotonic time.
//! 7. `send()` the domain.
//! 8. Every report interval, flag the latency report as ready.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use ecat_common::bus::{BusError, BusMaster};
use ecat_common::cia402::{DriveState, ModeOfOperation};
use ecat_common::config::MotorConfig;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::clock::{ClockError, CycleClock, MonoTime};
use crate::domain::MappedDomain;
use crate::motion::MotionGenerator;
use crate::state::DeviceStateMachine;

/// Errors raised by the cyclic thread.
#[derive(Debug, Error)]
pub enum CycleError {
    /// RT setup failed (mlockall, affinity, scheduler).
    #[error("RT setup error: {0}")]
    RtSetup(String),

    /// Clock read or sleep failed.
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),

    /// Bus exchange failed; the loop does not retry.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

// ─── Run Flag ───────────────────────────────────────────────────────

/// Process-wide cancellation token.
///
/// Starts set; cleared once by the signal handler or on a fatal error.
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    /// New flag in the running state.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Whether the cycle should keep going.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear the flag. Returns `true` only for the call that cleared it.
    pub fn stop(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Latency Statistics ─────────────────────────────────────────────

/// Wake-up latency min/max, written by the cyclic thread only.
///
/// Readers get a best-effort snapshot; min and max are independent atomics
/// and may come from different cycles.
#[derive(Debug)]
pub struct LatencyStats {
    min_ns: AtomicI64,
    max_ns: AtomicI64,
    samples: AtomicU64,
    report_ready: AtomicBool,
}

/// Latency values read at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySnapshot {
    /// Smallest latency seen [ns].
    pub min_ns: i64,
    /// Largest latency seen [ns].
    pub max_ns: i64,
    /// Number of recorded cycles.
    pub samples: u64,
}

impl LatencyStats {
    /// Empty statistics.
    pub const fn new() -> Self {
        Self {
            min_ns: AtomicI64::new(i64::MAX),
            max_ns: AtomicI64::new(i64::MIN),
            samples: AtomicU64::new(0),
            report_ready: AtomicBool::new(false),
        }
    }

    /// Record one latency sample. Single writer.
    #[inline]
    pub fn record(&self, latency_ns: i64) {
        if latency_ns < self.min_ns.load(Ordering::Relaxed) {
            self.min_ns.store(latency_ns, Ordering::Relaxed);
        }
        if latency_ns > self.max_ns.load(Ordering::Relaxed) {
            self.max_ns.store(latency_ns, Ordering::Relaxed);
        }
        self.samples.fetch_add(1, Ordering::Release);
    }

    /// Snapshot, or `None` before the first sample.
    pub fn snapshot(&self) -> Option<LatencySnapshot> {
        let samples = self.samples.load(Ordering::Acquire);
        if samples == 0 {
            return None;
        }
        Some(LatencySnapshot {
            min_ns: self.min_ns.load(Ordering::Relaxed),
            max_ns: self.max_ns.load(Ordering::Relaxed),
            samples,
        })
    }

    /// Signal that a report is due.
    #[inline]
    pub fn mark_ready(&self) {
        self.report_ready.store(true, Ordering::Release);
    }

    /// Consume the report-ready flag.
    pub fn take_ready(&self) -> bool {
        self.report_ready.swap(false, Ordering::AcqRel)
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

/// Outcome of [`rt_setup`] on the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RtStatus {
    /// `mlockall` succeeded.
    pub memory_locked: bool,
    /// Core the thread was pinned to.
    pub cpu_core: Option<usize>,
    /// SCHED_FIFO priority in effect, `None` if the thread kept its policy.
    pub fifo_priority: Option<i32>,
}

impl RtStatus {
    /// Whether memory locking and SCHED_FIFO both took effect.
    pub const fn is_realtime(&self) -> bool {
        self.memory_locked && self.fifo_priority.is_some()
    }
}

/// Lock all current and future memory pages.
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{MlockAllFlags, mlockall};
    mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))
}

/// Touch 256 KiB of stack so the loop never faults on it.
fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid exclusive reference into `buf`.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

/// Pin the calling thread to `cpu`.
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

/// Switch the calling thread to SCHED_FIFO. Returns the priority applied.
fn rt_set_scheduler(priority: Option<i32>) -> Result<i32, CycleError> {
    let priority = match priority {
        Some(p) => p,
        None => {
            // SAFETY: plain syscall wrapper without pointer arguments.
            let max = unsafe { libc::sched_get_priority_max(libc::SCHED_FIFO) };
            if max < 0 {
                ecat_common::consts::DEFAULT_RT_PRIORITY
            } else {
                max
            }
        }
    };
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` outlives the call; `pthread_self()` is always valid.
    let ret =
        unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::from_raw_os_error(ret);
        return Err(CycleError::RtSetup(format!(
            "pthread_setschedparam(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(priority)
}

/// A failed RT step is fatal with the `rt` feature and a warning without it.
fn rt_step<T>(result: Result<T, CycleError>) -> Result<Option<T>, CycleError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if cfg!(feature = "rt") => Err(e),
        Err(e) => {
            warn!("{e}; continuing without it");
            Ok(None)
        }
    }
}

/// Perform the RT setup sequence on the calling thread.
///
/// Must run on the cyclic thread before the first cycle. Every step is
/// always attempted; built with the `rt` feature the first failure aborts,
/// otherwise failures (typically missing `CAP_SYS_NICE`/`CAP_IPC_LOCK`) are
/// logged and the cycle runs without them.
pub fn rt_setup(
    cpu_core: Option<usize>,
    rt_priority: Option<i32>,
) -> Result<RtStatus, CycleError> {
    let memory_locked = rt_step(rt_mlockall())?.is_some();
    prefault_stack();
    let cpu_core = match cpu_core {
        Some(cpu) => rt_step(rt_set_affinity(cpu))?.map(|()| cpu),
        None => None,
    };
    let fifo_priority = rt_step(rt_set_scheduler(rt_priority))?;

    let status = RtStatus {
        memory_locked,
        cpu_core,
        fifo_priority,
    };
    if status.is_realtime() {
        info!("RT setup complete (cpu_core={cpu_core:?}, SCHED_FIFO priority={fifo_priority:?})");
    } else {
        warn!("Cyclic thread is not real-time: {status:?}");
    }
    Ok(status)
}

// ─── Cycle Runner ───────────────────────────────────────────────────

/// Summary of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Completed cycles.
    pub cycles: u64,
    /// Cycles that woke more than one period late.
    pub overruns: u64,
    /// Position targets that left the i32 range.
    pub rollovers: u64,
    /// Final latency statistics.
    pub latency: Option<LatencySnapshot>,
    /// Drive state on the last cycle.
    pub drive_state: DriveState,
}

/// The cyclic scheduler.
///
/// Owns the bus master, the mapped domain and all per-cycle state. Nothing
/// in `run_cycle` allocates.
pub struct CycleRunner<B, C> {
    bus: B,
    clock: C,
    domain: MappedDomain,
    state_machine: DeviceStateMachine,
    motion: MotionGenerator,
    mode: ModeOfOperation,
    period_ns: i64,
    report_interval: u64,
    stats: Arc<LatencyStats>,
    run_flag: RunFlag,
    cycles: u64,
    overruns: u64,
}

impl<B: BusMaster, C: CycleClock> CycleRunner<B, C> {
    /// Assemble a runner for an activated master.
    pub fn new(
        bus: B,
        clock: C,
        domain: MappedDomain,
        motion: MotionGenerator,
        config: &MotorConfig,
        stats: Arc<LatencyStats>,
        run_flag: RunFlag,
    ) -> Self {
        Self {
            bus,
            clock,
            domain,
            state_machine: DeviceStateMachine::new(),
            mode: motion.mode().mode_of_operation(),
            motion,
            period_ns: config.period_ns(),
            report_interval: config.report_interval_cycles().max(1),
            stats,
            run_flag,
            cycles: 0,
            overruns: 0,
        }
    }

    /// Bus master, for inspection.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Bus master, for fault injection in tests and tools.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Clock, for inspection.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Mapped domain as left by the last cycle.
    pub fn domain(&self) -> &MappedDomain {
        &self.domain
    }

    /// Shared latency statistics.
    pub fn stats(&self) -> &Arc<LatencyStats> {
        &self.stats
    }

    /// Give the bus master back for release.
    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Current summary.
    pub fn report(&self) -> CycleReport {
        CycleReport {
            cycles: self.cycles,
            overruns: self.overruns,
            rollovers: self.motion.rollovers(),
            latency: self.stats.snapshot(),
            drive_state: self.state_machine.state(),
        }
    }

    /// Run until the run flag is cleared or a cycle fails.
    ///
    /// The first deadline is one period after the current time. On error the
    /// run flag is cleared so the rest of the process shuts down.
    pub fn run(&mut self) -> Result<CycleReport, CycleError> {
        let mut deadline = self.clock.now()?;
        info!(
            "Entering cycle loop: period={}ns, mode={:?}",
            self.period_ns, self.mode
        );

        while self.run_flag.is_running() {
            deadline = deadline.add_ns(self.period_ns);
            if let Err(e) = self.run_cycle(deadline) {
                error!("Cycle {} failed: {e}", self.cycles + 1);
                self.run_flag.stop();
                return Err(e);
            }
        }

        let report = self.report();
        info!(
            "Cycle loop stopped after {} cycles ({} overruns, {} rollovers)",
            report.cycles, report.overruns, report.rollovers
        );
        Ok(report)
    }

    /// Execute one cycle against an absolute deadline.
    #[inline]
    pub fn run_cycle(&mut self, deadline: MonoTime) -> Result<(), CycleError> {
        self.clock.sleep_until(deadline)?;
        let wake = self.clock.now()?;
        let latency_ns = wake.diff_ns(deadline);
        self.stats.record(latency_ns);
        if latency_ns > self.period_ns {
            self.overruns += 1;
        }

        self.bus.receive(self.domain.rx_buffer())?;

        let command = self.state_machine.update(self.domain.status_word());
        if command.state.allows_motion() {
            let target = self.motion.command(self.domain.actual_position());
            target.write_to(&mut self.domain);
        }
        self.domain.set_control_word(command.control);
        self.domain.set_mode_of_operation(self.mode.as_u8());

        let stamp = self.clock.now()?;
        self.bus.sync_dc(stamp.as_nanos())?;
        self.bus.send(self.domain.tx_buffer())?;

        self.cycles += 1;
        if self.cycles % self.report_interval == 0 {
            self.stats.mark_ready();
        }
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
