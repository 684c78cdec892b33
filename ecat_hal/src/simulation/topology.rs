//! Simulated bus topology.
//!
//! The simulation master reads a small TOML description of the slaves on
//! the wire and the PDO entries each one maps. Every field is optional; an
//! empty file describes one CiA-402 servo at position 0 with the standard
//! cyclic-synchronous mapping.
//!
//! ```toml
//! [[slaves]]
//! alias = 0
//! position = 0
//! name = "servo-0"
//! entries = [
//!     { index = 0x6040, bits = 16, direction = "output" },
//!     { index = 0x607A, bits = 32, direction = "output" },
//!     { index = 0x60FF, bits = 32, direction = "output" },
//!     { index = 0x6060, bits = 8,  direction = "output" },
//!     { index = 0x6041, bits = 16, direction = "input" },
//!     { index = 0x6064, bits = 32, direction = "input" },
//! ]
//! ```

use ecat_common::bus::{BusError, SlaveAddress};
use ecat_common::cia402::{
    CONTROLWORD, MODES_OF_OPERATION, ObjectIndex, POSITION_ACTUAL, STATUSWORD, TARGET_POSITION,
    TARGET_VELOCITY,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Process data direction as seen from the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdoDirection {
    /// Master → slave (RxPDO).
    Output,
    /// Slave → master (TxPDO).
    Input,
}

/// One mapped PDO entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PdoEntryDescription {
    /// Object index.
    pub index: u16,
    /// Object sub-index.
    #[serde(default)]
    pub subindex: u8,
    /// Bit length (8, 16 or 32).
    pub bits: u16,
    /// Direction.
    pub direction: PdoDirection,
}

impl PdoEntryDescription {
    const fn new(object: ObjectIndex, bits: u16, direction: PdoDirection) -> Self {
        Self {
            index: object.index,
            subindex: object.subindex,
            bits,
            direction,
        }
    }

    /// Object dictionary address of the entry.
    pub const fn object(&self) -> ObjectIndex {
        ObjectIndex::new(self.index, self.subindex)
    }

    /// Width in bytes.
    pub const fn width(&self) -> usize {
        (self.bits / 8) as usize
    }
}

/// Standard CiA-402 cyclic-synchronous PDO mapping.
pub fn default_cia402_entries() -> Vec<PdoEntryDescription> {
    use PdoDirection::{Input, Output};
    vec![
        PdoEntryDescription::new(CONTROLWORD, 16, Output),
        PdoEntryDescription::new(TARGET_POSITION, 32, Output),
        PdoEntryDescription::new(TARGET_VELOCITY, 32, Output),
        PdoEntryDescription::new(MODES_OF_OPERATION, 8, Output),
        PdoEntryDescription::new(STATUSWORD, 16, Input),
        PdoEntryDescription::new(POSITION_ACTUAL, 32, Input),
    ]
}

/// One slave on the simulated wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlaveDescription {
    /// Station alias.
    #[serde(default)]
    pub alias: u16,
    /// Ring position.
    #[serde(default)]
    pub position: u16,
    /// Human-readable name.
    #[serde(default = "default_slave_name")]
    pub name: String,
    /// Whether the slave supports distributed clocks.
    #[serde(default = "default_true")]
    pub dc_capable: bool,
    /// Mapped PDO entries, in mapping order.
    #[serde(default = "default_cia402_entries")]
    pub entries: Vec<PdoEntryDescription>,
}

impl SlaveDescription {
    /// Address of this slave.
    pub const fn address(&self) -> SlaveAddress {
        SlaveAddress::new(self.alias, self.position)
    }
}

impl Default for SlaveDescription {
    fn default() -> Self {
        Self {
            alias: 0,
            position: 0,
            name: default_slave_name(),
            dc_capable: true,
            entries: default_cia402_entries(),
        }
    }
}

/// Complete simulated topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimTopology {
    /// Slaves on the wire.
    #[serde(default = "default_slaves")]
    pub slaves: Vec<SlaveDescription>,
}

impl Default for SimTopology {
    fn default() -> Self {
        Self {
            slaves: default_slaves(),
        }
    }
}

impl SimTopology {
    /// Load and validate a topology file.
    ///
    /// # Errors
    /// - `BusError::TopologyNotFound` if the file does not exist
    /// - `BusError::InvalidTopology` on read, parse or validation failure
    pub fn load(path: &Path) -> Result<Self, BusError> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BusError::TopologyNotFound(path.to_path_buf())
            } else {
                BusError::InvalidTopology(format!("failed to read {}: {e}", path.display()))
            }
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a topology from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, BusError> {
        let topology: Self = toml::from_str(content)
            .map_err(|e| BusError::InvalidTopology(format!("parse error: {e}")))?;
        topology.validate()?;
        Ok(topology)
    }

    /// Check slave uniqueness and entry widths.
    pub fn validate(&self) -> Result<(), BusError> {
        let mut seen = HashSet::new();
        for slave in &self.slaves {
            if !seen.insert(slave.address()) {
                return Err(BusError::InvalidTopology(format!(
                    "duplicate slave address {}",
                    slave.address()
                )));
            }
            let mut objects = HashSet::new();
            for entry in &slave.entries {
                if !matches!(entry.bits, 8 | 16 | 32) {
                    return Err(BusError::InvalidTopology(format!(
                        "slave {}: entry {} has unsupported width {} bits",
                        slave.address(),
                        entry.object(),
                        entry.bits
                    )));
                }
                if !objects.insert(entry.object()) {
                    return Err(BusError::InvalidTopology(format!(
                        "slave {}: entry {} mapped twice",
                        slave.address(),
                        entry.object()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Find a slave by address.
    pub fn slave(&self, address: SlaveAddress) -> Option<&SlaveDescription> {
        self.slaves.iter().find(|s| s.address() == address)
    }
}

fn default_slaves() -> Vec<SlaveDescription> {
    vec![SlaveDescription::default()]
}

fn default_slave_name() -> String {
    "servo".to_string()
}

fn default_true() -> bool {
    true
}
