//! # ecat Motor Control Unit
//!
//! Hard real-time cycle for one CiA-402 servo axis on an EtherCAT bus.
//!
//! Each period the cyclic thread wakes at an absolute deadline, exchanges
//! the process data domain with the bus master, runs the drive through the
//! CiA-402 power state machine and, once the drive reports
//! `OperationEnabled`, writes a position or velocity set-point.
//!
//! # Module Structure
//!
//! - [`domain`] - Process data buffer and validated PDO offsets
//! - [`state`] - CiA-402 device state machine (statusword → controlword)
//! - [`motion`] - Per-cycle set-point generation
//! - [`clock`] - Monotonic time, absolute sleeps, simulated clock
//! - [`cycle`] - RT setup, latency statistics, cycle runner
//! - [`telemetry`] - Periodic latency report
//! - [`lifecycle`] - Master bring-up, cyclic thread, shutdown
//!
//! # Cycle
//!
//! ```text
//! sleep_until(deadline) ─► receive ─► statusword ─► state machine
//!        ▲                                               │
//!        │                            OperationEnabled? ─┤─► motion target
//!        │                                               ▼
//!   deadline += period ◄── send ◄── sync DC ◄── controlword + mode
//! ```

pub mod clock;
pub mod cycle;
pub mod domain;
pub mod lifecycle;
pub mod motion;
pub mod state;
pub mod telemetry;
