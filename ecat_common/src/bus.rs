//! Bus master trait and error types.
//!
//! This module defines:
//! - `BusMaster` trait - Interface to the lower-level fieldbus master
//! - `BusError` enum - Error types for bus operations
//! - `SlaveAddress` - Slave addressing (alias, ring position)
//! - `MasterFactory` type alias - Factory function type

use crate::cia402::{ModeOfOperation, ObjectIndex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error types for bus master operations.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// Topology (ENI) file missing
    #[error("Topology file not found: {0}")]
    TopologyNotFound(PathBuf),

    /// Topology file present but unusable
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    /// Process data domain could not be created
    #[error("Domain registration failed: {0}")]
    DomainRegistration(String),

    /// Slave at the given address is not part of the topology
    #[error("Slave {0} not present in topology")]
    SlaveNotFound(SlaveAddress),

    /// Master activation failed
    #[error("Master activation failed: {0}")]
    ActivationFailed(String),

    /// Operation requires an activated master
    #[error("Master not activated")]
    NotActivated,

    /// Cyclic frame exchange failed
    #[error("Process data exchange failed: {0}")]
    Exchange(String),

    /// No master registered under this name
    #[error("Bus master not found: {0}")]
    MasterNotFound(String),
}

/// Slave address on the bus: station alias plus ring position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SlaveAddress {
    /// Configured station alias (0 = address by position only).
    #[serde(default)]
    pub alias: u16,
    /// Position in the ring relative to the alias.
    #[serde(default)]
    pub position: u16,
}

impl SlaveAddress {
    pub const fn new(alias: u16, position: u16) -> Self {
        Self { alias, position }
    }
}

impl std::fmt::Display for SlaveAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.alias, self.position)
    }
}

/// Factory function type for creating bus masters bound to a topology file.
pub type MasterFactory = fn(&Path) -> Result<Box<dyn BusMaster>, BusError>;

/// Interface to the fieldbus master that owns the wire.
///
/// # Lifecycle
///
/// 1. Setup (non-RT): `register_domain()`, `register_drive()`,
///    `set_send_interval()`, `register_dc()`, `set_application_time()`,
///    `set_mode()`, `activate()`, then `domain_size()` / `domain_offset()`.
/// 2. Cyclic (RT): `receive()` → host processing → `sync_dc()` → `send()`.
/// 3. Teardown: `release()` after the cyclic thread has been joined.
///
/// # Timing Contracts
///
/// | Operation | RT Constraint |
/// |-----------|---------------|
/// | setup calls | None (pre-RT) |
/// | `receive()` / `sync_dc()` / `send()` | **HARD**, no blocking |
/// | `release()` | None (post-RT) |
///
/// Cyclic calls either succeed or report an error that ends the run;
/// retry policy for bus I/O belongs to the implementation.
pub trait BusMaster: Send {
    /// Returns the master's unique identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Create the process data domain.
    fn register_domain(&mut self) -> Result<(), BusError>;

    /// Register the drive's PDO entries into the domain.
    fn register_drive(&mut self, slave: SlaveAddress) -> Result<(), BusError>;

    /// Configure the frame send interval.
    fn set_send_interval(&mut self, period: Duration) -> Result<(), BusError>;

    /// Enable distributed-clock synchronization for the slave.
    fn register_dc(&mut self, slave: SlaveAddress) -> Result<(), BusError>;

    /// Set the initial application time [ns] before activation.
    fn set_application_time(&mut self, time_ns: u64);

    /// Select the cyclic operating mode on the slave (before activation).
    fn set_mode(&mut self, slave: SlaveAddress, mode: ModeOfOperation) -> Result<(), BusError>;

    /// Activate the master; the domain layout is fixed afterwards.
    fn activate(&mut self) -> Result<(), BusError>;

    /// Size of the activated domain in bytes.
    fn domain_size(&self) -> Result<usize, BusError>;

    /// Byte offset of a mapped PDO entry, `None` if it is not mapped.
    fn domain_offset(&self, slave: SlaveAddress, entry: ObjectIndex) -> Option<usize>;

    /// Receive one cycle of process data into `domain`.
    fn receive(&mut self, domain: &mut [u8]) -> Result<(), BusError>;

    /// Stamp the distributed clock with the given monotonic time [ns].
    fn sync_dc(&mut self, time_ns: u64) -> Result<(), BusError>;

    /// Queue one cycle of process data from `domain` for transmission.
    fn send(&mut self, domain: &[u8]) -> Result<(), BusError>;

    /// Release the master and all bus resources.
    fn release(&mut self);
}

impl<T: BusMaster + ?Sized> BusMaster for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn register_domain(&mut self) -> Result<(), BusError> {
        (**self).register_domain()
    }

    fn register_drive(&mut self, slave: SlaveAddress) -> Result<(), BusError> {
        (**self).register_drive(slave)
    }

    fn set_send_interval(&mut self, period: Duration) -> Result<(), BusError> {
        (**self).set_send_interval(period)
    }

    fn register_dc(&mut self, slave: SlaveAddress) -> Result<(), BusError> {
        (**self).register_dc(slave)
    }

    fn set_application_time(&mut self, time_ns: u64) {
        (**self).set_application_time(time_ns)
    }

    fn set_mode(&mut self, slave: SlaveAddress, mode: ModeOfOperation) -> Result<(), BusError> {
        (**self).set_mode(slave, mode)
    }

    fn activate(&mut self) -> Result<(), BusError> {
        (**self).activate()
    }

    fn domain_size(&self) -> Result<usize, BusError> {
        (**self).domain_size()
    }

    fn domain_offset(&self, slave: SlaveAddress, entry: ObjectIndex) -> Option<usize> {
        (**self).domain_offset(slave, entry)
    }

    fn receive(&mut self, domain: &mut [u8]) -> Result<(), BusError> {
        (**self).receive(domain)
    }

    fn sync_dc(&mut self, time_ns: u64) -> Result<(), BusError> {
        (**self).sync_dc(time_ns)
    }

    fn send(&mut self, domain: &[u8]) -> Result<(), BusError> {
        (**self).send(domain)
    }

    fn release(&mut self) {
        (**self).release()
    }
}
