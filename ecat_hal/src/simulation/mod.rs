//! Simulated EtherCAT master.
//!
//! Stands in for a real master stack during development and testing. The
//! topology file passed with `--eni` is a TOML description of the slaves
//! (see [`topology`]); each registered drive is backed by a
//! [`SimulatedDrive`] that walks the CiA-402 power states and follows
//! position or velocity set-points.

pub mod drive;
pub mod master;
pub mod topology;

pub use drive::{DriveOutputs, SimulatedDrive};
pub use master::{ExchangeCounters, MappedEntry, SimulationMaster};
pub use topology::{PdoDirection, PdoEntryDescription, SimTopology, SlaveDescription};

use ecat_common::bus::{BusError, BusMaster};
use std::path::Path;

/// Factory registered under `"simulation"` in the `MasterRegistry`.
pub fn create_master(topology_path: &Path) -> Result<Box<dyn BusMaster>, BusError> {
    Ok(Box::new(SimulationMaster::open(topology_path)?))
}
