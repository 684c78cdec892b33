//! Motion command generator.
//!
//! One strategy is selected at startup and used for the whole run:
//! - `Position` (CSP): target = actual + fixed per-cycle increment
//! - `Velocity` (CSV): constant target velocity, independent of feedback
//!
//! Increments are derived from the configured velocity in double precision
//! and rounded once at construction. The position sum is evaluated in i64;
//! sums outside i32 are resolved by the configured `RolloverPolicy` and
//! counted.

use ecat_common::config::{ConfigError, MotionMode, MotorConfig, RolloverPolicy};

use crate::domain::MappedDomain;

/// Set-point produced for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionTarget {
    /// Absolute target position [counts].
    Position(i32),
    /// Absolute target velocity [counts/s].
    Velocity(i32),
}

impl MotionTarget {
    /// Write the set-point into its PDO entry.
    #[inline]
    pub fn write_to(self, domain: &mut MappedDomain) {
        match self {
            Self::Position(target) => domain.set_target_position(target),
            Self::Velocity(target) => domain.set_target_velocity(target),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Position {
        increment: i32,
        rollover: RolloverPolicy,
    },
    Velocity {
        target: i32,
    },
}

/// Per-cycle set-point generator.
#[derive(Debug, Clone)]
pub struct MotionGenerator {
    strategy: Strategy,
    rollovers: u64,
}

impl MotionGenerator {
    /// Position strategy with a fixed increment [counts/cycle].
    pub const fn position(increment: i32, rollover: RolloverPolicy) -> Self {
        Self {
            strategy: Strategy::Position {
                increment,
                rollover,
            },
            rollovers: 0,
        }
    }

    /// Velocity strategy with a fixed target [counts/s].
    pub const fn velocity(target: i32) -> Self {
        Self {
            strategy: Strategy::Velocity { target },
            rollovers: 0,
        }
    }

    /// Build the strategy selected in `config`.
    ///
    /// # Errors
    /// `ConfigError::ValidationError` if the increment or velocity target
    /// cannot be represented in 32 bits.
    pub fn from_config(config: &MotorConfig) -> Result<Self, ConfigError> {
        let drive = &config.drive;
        match drive.mode {
            MotionMode::Position => {
                let increment = to_i32(
                    drive.increment_per_cycle(config.cycles_per_second()),
                    "position increment",
                )?;
                Ok(Self::position(increment, drive.rollover))
            }
            MotionMode::Velocity => {
                let target = to_i32(drive.velocity_counts(), "velocity target")?;
                Ok(Self::velocity(target))
            }
        }
    }

    /// Mode selected at startup.
    pub const fn mode(&self) -> MotionMode {
        match self.strategy {
            Strategy::Position { .. } => MotionMode::Position,
            Strategy::Velocity { .. } => MotionMode::Velocity,
        }
    }

    /// Position sums that left the i32 range so far.
    pub const fn rollovers(&self) -> u64 {
        self.rollovers
    }

    /// Compute this cycle's set-point from the measured position.
    #[inline]
    pub fn command(&mut self, actual_position: i32) -> MotionTarget {
        match self.strategy {
            Strategy::Position {
                increment,
                rollover,
            } => {
                let sum = actual_position as i64 + increment as i64;
                let target = match i32::try_from(sum) {
                    Ok(target) => target,
                    Err(_) => {
                        self.rollovers += 1;
                        match rollover {
                            RolloverPolicy::Wrap => sum as i32,
                            RolloverPolicy::Saturate => {
                                sum.clamp(i32::MIN as i64, i32::MAX as i64) as i32
                            }
                        }
                    }
                };
                MotionTarget::Position(target)
            }
            Strategy::Velocity { target } => MotionTarget::Velocity(target),
        }
    }
}

fn to_i32(value: f64, what: &str) -> Result<i32, ConfigError> {
    if value.is_finite() && value >= i32::MIN as f64 && value <= i32::MAX as f64 {
        Ok(value as i32)
    } else {
        Err(ConfigError::ValidationError(format!(
            "{what} {value} does not fit in 32 bits"
        )))
    }
}
