//! Prelude module for common re-exports.
//!
//! ```rust
//! use ecat_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ConfigError, ConfigLoader, LogLevel, MotionMode, MotorConfig, RolloverPolicy,
};

// ─── Bus ────────────────────────────────────────────────────────────
pub use crate::bus::{BusError, BusMaster, MasterFactory, SlaveAddress};

// ─── CiA-402 ────────────────────────────────────────────────────────
pub use crate::cia402::{ControlWord, DriveState, ModeOfOperation, ObjectIndex, StatusWord};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{DEFAULT_CYCLE_TIME_US, MAX_VELOCITY_REV_PER_S, NSEC_PER_SEC};
