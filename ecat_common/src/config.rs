//! Configuration loading traits and types.
//!
//! All settings of the motion control unit live in one TOML file; every
//! section and field is optional and falls back to the documented default.
//!
//! ```toml
//! log_level = "info"
//!
//! [cycle]
//! cycle_time_us = 1000
//! rt_priority = 99
//! cpu_core = 1
//!
//! [drive]
//! slave = { alias = 0, position = 0 }
//! encoder_counts_per_rev = 8388608
//! mode = "position"
//! velocity = 1.0
//! rollover = "wrap"
//!
//! [telemetry]
//! enabled = true
//! report_interval_cycles = 1000
//! ```

use crate::bus::SlaveAddress;
use crate::cia402::ModeOfOperation;
use crate::consts::{
    DEFAULT_CYCLE_TIME_US, DEFAULT_ENCODER_COUNTS_PER_REV, DEFAULT_VELOCITY_REV_PER_S,
    MAX_CYCLE_TIME_US, MAX_VELOCITY_REV_PER_S, MIN_CYCLE_TIME_US, NSEC_PER_SEC,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Drive Settings ─────────────────────────────────────────────────

/// Motion command strategy, selected once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MotionMode {
    /// Cyclic synchronous position: target = actual + per-cycle increment.
    #[default]
    Position,
    /// Cyclic synchronous velocity: constant target velocity.
    Velocity,
}

impl MotionMode {
    /// CiA-402 mode of operation written to 0x6060 every cycle.
    pub const fn mode_of_operation(self) -> ModeOfOperation {
        match self {
            Self::Position => ModeOfOperation::CyclicSyncPosition,
            Self::Velocity => ModeOfOperation::CyclicSyncVelocity,
        }
    }
}

/// Resolution of a target position sum that leaves the i32 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RolloverPolicy {
    /// Two's-complement wrap, matching a modulo-2^32 position counter.
    #[default]
    Wrap,
    /// Clamp to `i32::MIN..=i32::MAX`; the axis stops advancing at the limit.
    Saturate,
}

/// Clamp a requested velocity [rev/s] to the hard limit.
///
/// Non-finite values pass through unchanged and are rejected by validation.
pub fn clamp_velocity(requested: f64) -> f64 {
    requested.clamp(-MAX_VELOCITY_REV_PER_S, MAX_VELOCITY_REV_PER_S)
}

/// `[cycle]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CycleConfig {
    /// Cycle period [µs].
    #[serde(default = "default_cycle_time_us")]
    pub cycle_time_us: u32,
    /// SCHED_FIFO priority; `None` selects the highest available.
    #[serde(default)]
    pub rt_priority: Option<i32>,
    /// CPU core to pin the cyclic thread to.
    #[serde(default)]
    pub cpu_core: Option<usize>,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            cycle_time_us: DEFAULT_CYCLE_TIME_US,
            rt_priority: None,
            cpu_core: None,
        }
    }
}

/// `[drive]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriveConfig {
    /// Address of the driven slave.
    #[serde(default)]
    pub slave: SlaveAddress,
    /// Encoder counts per motor revolution.
    #[serde(default = "default_encoder_counts")]
    pub encoder_counts_per_rev: u32,
    /// Motion command strategy.
    #[serde(default)]
    pub mode: MotionMode,
    /// Target velocity [rev/s].
    #[serde(default = "default_velocity")]
    pub velocity: f64,
    /// Handling of target position sums beyond the i32 range.
    #[serde(default)]
    pub rollover: RolloverPolicy,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            slave: SlaveAddress::default(),
            encoder_counts_per_rev: DEFAULT_ENCODER_COUNTS_PER_REV,
            mode: MotionMode::default(),
            velocity: DEFAULT_VELOCITY_REV_PER_S,
            rollover: RolloverPolicy::default(),
        }
    }
}

impl DriveConfig {
    /// Position increment per cycle [counts], before integer conversion.
    pub fn increment_per_cycle(&self, cycles_per_second: f64) -> f64 {
        (self.velocity * self.encoder_counts_per_rev as f64 / cycles_per_second).round()
    }

    /// Target velocity [counts/s], before integer conversion.
    pub fn velocity_counts(&self) -> f64 {
        (self.velocity * self.encoder_counts_per_rev as f64).round()
    }
}

/// `[telemetry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Print the periodic latency line.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cycles between reports; `None` means once per second.
    #[serde(default)]
    pub report_interval_cycles: Option<u64>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            report_interval_cycles: None,
        }
    }
}

/// Complete control unit configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MotorConfig {
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl MotorConfig {
    /// Cycle period [ns].
    #[inline]
    pub fn period_ns(&self) -> i64 {
        self.cycle.cycle_time_us as i64 * 1000
    }

    /// Cycles per second, fractional for periods that do not divide 1 s.
    #[inline]
    pub fn cycles_per_second(&self) -> f64 {
        NSEC_PER_SEC as f64 / self.period_ns() as f64
    }

    /// Cycles between latency reports.
    pub fn report_interval_cycles(&self) -> u64 {
        self.telemetry
            .report_interval_cycles
            .unwrap_or_else(|| (NSEC_PER_SEC / self.period_ns()).max(1) as u64)
    }

    /// Set the target velocity, clamping it to the hard limit.
    pub fn set_velocity(&mut self, requested: f64) {
        let clamped = clamp_velocity(requested);
        if clamped != requested && requested.is_finite() {
            warn!(
                "Requested velocity {requested} rev/s clamped to {clamped} rev/s"
            );
        }
        self.drive.velocity = clamped;
    }

    /// Apply configuration-time clamps to values read from file or CLI.
    pub fn normalize(&mut self) {
        let requested = self.drive.velocity;
        self.set_velocity(requested);
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - the cycle time is outside `MIN_CYCLE_TIME_US..=MAX_CYCLE_TIME_US`
    /// - the RT priority is outside `1..=99`
    /// - the encoder resolution is zero
    /// - the velocity is not finite or exceeds the hard limit
    /// - the set-point of the selected mode does not fit in i32 (the per-cycle
    ///   increment in position mode, the velocity target in velocity mode)
    /// - the telemetry interval is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cycle = self.cycle.cycle_time_us;
        if !(MIN_CYCLE_TIME_US..=MAX_CYCLE_TIME_US).contains(&cycle) {
            return Err(ConfigError::ValidationError(format!(
                "cycle_time_us {cycle} out of range [{MIN_CYCLE_TIME_US}, {MAX_CYCLE_TIME_US}]"
            )));
        }

        if let Some(prio) = self.cycle.rt_priority {
            if !(1..=99).contains(&prio) {
                return Err(ConfigError::ValidationError(format!(
                    "rt_priority {prio} out of range [1, 99]"
                )));
            }
        }

        if self.drive.encoder_counts_per_rev == 0 {
            return Err(ConfigError::ValidationError(
                "encoder_counts_per_rev must be > 0".to_string(),
            ));
        }

        let velocity = self.drive.velocity;
        if !velocity.is_finite() {
            return Err(ConfigError::ValidationError(format!(
                "velocity {velocity} is not a finite number"
            )));
        }
        if velocity.abs() > MAX_VELOCITY_REV_PER_S {
            return Err(ConfigError::ValidationError(format!(
                "velocity {velocity} exceeds limit {MAX_VELOCITY_REV_PER_S} rev/s"
            )));
        }

        match self.drive.mode {
            MotionMode::Position => {
                let increment = self.drive.increment_per_cycle(self.cycles_per_second());
                if !fits_i32(increment) {
                    return Err(ConfigError::ValidationError(format!(
                        "position increment {increment} counts/cycle does not fit in 32 bits"
                    )));
                }
            }
            MotionMode::Velocity => {
                let velocity_counts = self.drive.velocity_counts();
                if !fits_i32(velocity_counts) {
                    return Err(ConfigError::ValidationError(format!(
                        "velocity target {velocity_counts} counts/s does not fit in 32 bits"
                    )));
                }
            }
        }

        if self.telemetry.report_interval_cycles == Some(0) {
            return Err(ConfigError::ValidationError(
                "report_interval_cycles must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn fits_i32(value: f64) -> bool {
    value >= i32::MIN as f64 && value <= i32::MAX as f64
}

fn default_cycle_time_us() -> u32 {
    DEFAULT_CYCLE_TIME_US
}

fn default_encoder_counts() -> u32 {
    DEFAULT_ENCODER_COUNTS_PER_REV
}

fn default_velocity() -> f64 {
    DEFAULT_VELOCITY_REV_PER_S
}

fn default_true() -> bool {
    true
}
