//! # ecat Motor Control Unit
//!
//! Drives one CiA-402 servo through its power states and then moves it at a
//! constant velocity, either by incrementing the target position every
//! cycle (CSP) or by commanding a target velocity (CSV).
//!
//! The bus master is selected by name (`--master`, default `simulation`)
//! and bound to the topology file given with `--eni`. Settings come from an
//! optional TOML file (`--config`) overridden by CLI flags. Wake-up latency
//! is printed to stdout once per second; SIGINT/SIGTERM stop the cycle.
//!
//! Exit status is 0 after a clean shutdown and -1 on any failure.

use std::io;
use std::path::PathBuf;
use std::process;

use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use ecat_common::config::{ConfigError, ConfigLoader, LogLevel, MotionMode, MotorConfig};
use ecat_common::consts::DEFAULT_MASTER;
use ecat_hal::MasterRegistry;
use ecat_motor::clock::MonotonicClock;
use ecat_motor::cycle::RunFlag;
use ecat_motor::lifecycle::{self, SetupError};
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// Motion strategy selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    /// Cyclic synchronous position.
    Position,
    /// Cyclic synchronous velocity.
    Velocity,
}

impl From<ModeArg> for MotionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Position => MotionMode::Position,
            ModeArg::Velocity => MotionMode::Velocity,
        }
    }
}

/// ecat Motor Control Unit: single-axis CiA-402 cyclic motion
#[derive(Parser, Debug)]
#[command(name = "ecat_motor")]
#[command(version)]
#[command(about = "Hard real-time single-axis EtherCAT motion cycle")]
struct Args {
    /// Bus topology (ENI) file.
    #[arg(short = 'n', long, value_name = "FILE")]
    eni: PathBuf,

    /// Target velocity [rev/s], clamped to ±50.
    #[arg(short = 'v', long, value_name = "REV_PER_S", allow_negative_numbers = true)]
    velocity: Option<f64>,

    /// Motion mode (default: position, or the config file's value).
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Optional control unit configuration TOML.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bus master backend.
    #[arg(long, default_value = DEFAULT_MASTER)]
    master: String,

    /// CPU core to pin the cyclic thread to.
    #[arg(long)]
    cpu_core: Option<usize>,

    /// SCHED_FIFO priority (default: highest available).
    #[arg(long)]
    rt_priority: Option<i32>,

    /// Enable verbose logging (DEBUG level).
    #[arg(long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = parse_exit_code(&e);
            let _ = e.print();
            process::exit(code);
        }
    };

    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            setup_tracing(&args, LogLevel::default());
            error!("FATAL: {e}");
            process::exit(-1);
        }
    };
    setup_tracing(&args, config.log_level);

    info!("ecat Motor Control Unit v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args, &mut config) {
        error!("FATAL: {e}");
        process::exit(-1);
    }

    info!("ecat Motor Control Unit shutdown complete");
}

fn run(args: &Args, config: &mut MotorConfig) -> Result<(), SetupError> {
    config.normalize();
    config.validate()?;
    info!(
        "Config OK: cycle_time={}µs, mode={:?}, velocity={} rev/s, slave {}",
        config.cycle.cycle_time_us, config.drive.mode, config.drive.velocity, config.drive.slave
    );

    let run_flag = RunFlag::new();
    lifecycle::install_signal_handler(&run_flag)?;

    let registry = MasterRegistry::with_builtin();
    let master = registry.create(&args.master, &args.eni)?;

    let report = lifecycle::run(master, MonotonicClock, config, run_flag, io::stdout())?;
    info!(
        "Stopped after {} cycles ({} overruns)",
        report.cycles, report.overruns
    );
    Ok(())
}

/// Help and version output exit 0; every other parse error is a failure.
fn parse_exit_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => -1,
    }
}

/// Merge the optional config file with CLI overrides.
fn load_config(args: &Args) -> Result<MotorConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => MotorConfig::load(path)?,
        None => MotorConfig::default(),
    };

    if let Some(velocity) = args.velocity {
        config.drive.velocity = velocity;
    }
    if let Some(mode) = args.mode {
        config.drive.mode = mode.into();
    }
    if args.cpu_core.is_some() {
        config.cycle.cpu_core = args.cpu_core;
    }
    if args.rt_priority.is_some() {
        config.cycle.rt_priority = args.rt_priority;
    }
    Ok(config)
}

fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        configured.into()
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .compact()
            .init();
    }
}
