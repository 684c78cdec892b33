//! # ecat HAL Library
//!
//! Bus master backends for the ecat motion control unit. Masters implement
//! the `BusMaster` trait defined in `ecat_common::bus`.
//!
//! # Module Structure
//!
//! - [`registry`] - Master factory registration
//! - [`simulation`] - Simulated EtherCAT master with an emulated CiA-402 drive
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      ecat_hal                                │
//! │  ┌──────────────────┐         ┌────────────────────────────┐ │
//! │  │  MasterRegistry  │──new──► │  BusMaster (trait object)  │ │
//! │  └──────────────────┘         └─────────────┬──────────────┘ │
//! │                                             │                │
//! │                               ┌─────────────▼──────────────┐ │
//! │                               │ SimulationMaster           │ │
//! │                               │  topology → PDO layout     │ │
//! │                               │  SimulatedDrive (CiA-402)  │ │
//! │                               └────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod registry;
pub mod simulation;

pub use crate::registry::MasterRegistry;
pub use crate::simulation::SimulationMaster;
