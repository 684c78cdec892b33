//! Control unit lifecycle.
//!
//! 1. Bring up the master: domain, drive, send interval, distributed clock,
//!    application time, cyclic mode, activation.
//! 2. Resolve and validate the six PDO offsets.
//! 3. Spawn the cyclic thread (RT setup, then the cycle loop).
//! 4. Poll the latency report flag until the run flag clears.
//! 5. Join the cyclic thread, print the final report, release the master.
//!
//! Any failure before the cyclic thread starts releases the master and
//! returns a `SetupError`.

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ecat_common::bus::{BusError, BusMaster};
use ecat_common::config::{ConfigError, MotorConfig};
use ecat_common::consts::CYCLIC_THREAD_NAME;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::clock::{ClockError, CycleClock};
use crate::cycle::{CycleError, CycleReport, CycleRunner, LatencyStats, RunFlag, rt_setup};
use crate::domain::{DomainError, MappedDomain, PdoOffsets, ProcessDataDomain};
use crate::motion::MotionGenerator;
use crate::telemetry::TelemetryReporter;

/// Interval at which the main thread polls the report flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors ending the control unit.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Invalid configuration.
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    /// Master bring-up failed.
    #[error("bus master: {0}")]
    Bus(#[from] BusError),

    /// PDO offsets unresolved or out of bounds.
    #[error("process data: {0}")]
    Domain(#[from] DomainError),

    /// Reading the clock for the application time failed.
    #[error("clock: {0}")]
    Clock(#[from] ClockError),

    /// The cyclic thread could not be created.
    #[error("failed to spawn cyclic thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The cyclic thread stopped with an error.
    #[error("cyclic thread: {0}")]
    Cycle(#[from] CycleError),

    /// SIGINT/SIGTERM handler could not be installed.
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    /// The cyclic thread panicked.
    #[error("cyclic thread panicked")]
    Panicked,
}

/// Run the master setup sequence and map the domain.
///
/// On error the master is left as is; the caller releases it.
pub fn bring_up<B, C>(
    master: &mut B,
    clock: &mut C,
    config: &MotorConfig,
) -> Result<MappedDomain, SetupError>
where
    B: BusMaster + ?Sized,
    C: CycleClock + ?Sized,
{
    let slave = config.drive.slave;
    let mode = config.drive.mode.mode_of_operation();

    master.register_domain()?;
    master.register_drive(slave)?;
    master.set_send_interval(Duration::from_nanos(config.period_ns() as u64))?;
    master.register_dc(slave)?;
    let now = clock.now()?;
    master.set_application_time(now.as_nanos());
    master.set_mode(slave, mode)?;
    master.activate()?;

    let size = master.domain_size()?;
    let offsets = PdoOffsets::resolve(&*master, slave)?;
    let domain = MappedDomain::new(ProcessDataDomain::new(size), offsets)?;
    info!(
        "Master '{}' active: slave {slave}, {mode:?}, domain {size} bytes",
        master.name()
    );
    Ok(domain)
}

/// Clear `run_flag` on SIGINT or SIGTERM.
pub fn install_signal_handler(run_flag: &RunFlag) -> Result<(), SetupError> {
    let flag = run_flag.clone();
    ctrlc::set_handler(move || {
        if flag.stop() {
            info!("Received shutdown signal");
        }
    })?;
    Ok(())
}

fn prepare<B: BusMaster, C: CycleClock>(
    master: &mut B,
    clock: &mut C,
    config: &MotorConfig,
) -> Result<(MappedDomain, MotionGenerator), SetupError> {
    config.validate()?;
    let motion = MotionGenerator::from_config(config)?;
    let domain = bring_up(master, clock, config)?;
    Ok((domain, motion))
}

/// Run the control unit until `run_flag` clears.
///
/// Returns the final cycle report. The master is released on every path.
pub fn run<B, C, W>(
    mut master: B,
    mut clock: C,
    config: &MotorConfig,
    run_flag: RunFlag,
    sink: W,
) -> Result<CycleReport, SetupError>
where
    B: BusMaster,
    C: CycleClock + Send,
    W: Write,
{
    let prepared = prepare(&mut master, &mut clock, config);
    let (domain, motion) = match prepared {
        Ok(parts) => parts,
        Err(e) => {
            error!("Setup failed: {e}");
            master.release();
            return Err(e);
        }
    };

    let stats = Arc::new(LatencyStats::new());
    let mut reporter = TelemetryReporter::new(sink, stats.clone(), config.telemetry.enabled);
    let mut runner = CycleRunner::new(
        master,
        clock,
        domain,
        motion,
        config,
        stats,
        run_flag.clone(),
    );
    let cpu_core = config.cycle.cpu_core;
    let rt_priority = config.cycle.rt_priority;

    let outcome = thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name(CYCLIC_THREAD_NAME.to_string())
            .spawn_scoped(scope, || {
                let result = rt_setup(cpu_core, rt_priority).and_then(|_| runner.run());
                if result.is_err() {
                    run_flag.stop();
                }
                result
            })
            .map_err(SetupError::Spawn)?;
        debug!("Cyclic thread '{CYCLIC_THREAD_NAME}' started");

        while run_flag.is_running() && !handle.is_finished() {
            if let Err(e) = reporter.poll() {
                warn!("Latency report failed: {e}");
            }
            thread::sleep(POLL_INTERVAL);
        }

        match handle.join() {
            Ok(result) => result.map_err(SetupError::from),
            Err(_) => Err(SetupError::Panicked),
        }
    });

    let report = runner.report();
    if let Err(e) = reporter.finish(&report) {
        warn!("Final latency report failed: {e}");
    }
    runner.into_bus().release();

    match outcome {
        Ok(report) => {
            info!("Control unit stopped cleanly");
            Ok(report)
        }
        Err(e) => {
            error!("Control unit stopped: {e}");
            Err(e)
        }
    }
}
