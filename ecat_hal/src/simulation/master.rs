//! Simulated EtherCAT master.
//!
//! The `SimulationMaster` implements the `BusMaster` trait on top of a
//! `SimTopology`. Registering a drive lays its PDO entries out
//! back-to-back in the domain (outputs first, then inputs, each in mapping
//! order). Every `send()` hands the outputs to the emulated drive and
//! advances it by one send interval; every `receive()` writes the drive's
//! inputs back into the frame image.

use super::drive::{DriveOutputs, SimulatedDrive};
use super::topology::{PdoDirection, SimTopology};
use ecat_common::bus::{BusError, BusMaster, SlaveAddress};
use ecat_common::cia402::{
    CONTROLWORD, MODES_OF_OPERATION, ModeOfOperation, ObjectIndex, POSITION_ACTUAL, STATUSWORD,
    TARGET_POSITION, TARGET_VELOCITY,
};
use ecat_common::consts::DEFAULT_CYCLE_TIME_US;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A PDO entry placed in the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedEntry {
    /// Owning slave.
    pub slave: SlaveAddress,
    /// Object address.
    pub object: ObjectIndex,
    /// Byte offset in the domain.
    pub offset: usize,
    /// Width in bytes.
    pub width: usize,
    /// Direction.
    pub direction: PdoDirection,
}

/// Exchange counters, for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeCounters {
    /// Completed `receive()` calls.
    pub frames_received: u64,
    /// Completed `send()` calls.
    pub frames_sent: u64,
    /// Completed `sync_dc()` calls.
    pub dc_syncs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Configuring,
    Active,
    Released,
}

/// Simulated bus master with one emulated drive per registered slave.
pub struct SimulationMaster {
    topology: SimTopology,
    phase: Phase,
    domain_registered: bool,
    layout: Vec<MappedEntry>,
    domain_size: usize,
    drives: Vec<(SlaveAddress, SimulatedDrive)>,
    dc_slaves: Vec<SlaveAddress>,
    send_interval: Duration,
    application_time_ns: u64,
    last_dc_ns: Option<u64>,
    /// Frame image travelling between `send()` and `receive()`.
    frame: Vec<u8>,
    counters: ExchangeCounters,
}

impl SimulationMaster {
    /// Create a master for an already parsed topology.
    pub fn new(topology: SimTopology) -> Self {
        Self {
            topology,
            phase: Phase::Configuring,
            domain_registered: false,
            layout: Vec::new(),
            domain_size: 0,
            drives: Vec::new(),
            dc_slaves: Vec::new(),
            send_interval: Duration::from_micros(DEFAULT_CYCLE_TIME_US as u64),
            application_time_ns: 0,
            last_dc_ns: None,
            frame: Vec::new(),
            counters: ExchangeCounters::default(),
        }
    }

    /// Create a master bound to a topology file.
    pub fn open(topology_path: &Path) -> Result<Self, BusError> {
        let topology = SimTopology::load(topology_path)?;
        info!(
            "Simulation master: {} slave(s) from {}",
            topology.slaves.len(),
            topology_path.display()
        );
        Ok(Self::new(topology))
    }

    /// Domain layout after drive registration.
    pub fn layout(&self) -> &[MappedEntry] {
        &self.layout
    }

    /// Exchange counters.
    pub const fn counters(&self) -> ExchangeCounters {
        self.counters
    }

    /// Application time set before activation [ns].
    pub const fn application_time_ns(&self) -> u64 {
        self.application_time_ns
    }

    /// Last distributed-clock stamp [ns].
    pub const fn last_dc_ns(&self) -> Option<u64> {
        self.last_dc_ns
    }

    /// Whether the master has been released.
    pub fn is_released(&self) -> bool {
        self.phase == Phase::Released
    }

    /// Emulated drive at the given address.
    pub fn drive(&self, slave: SlaveAddress) -> Option<&SimulatedDrive> {
        self.drives.iter().find(|(a, _)| *a == slave).map(|(_, d)| d)
    }

    /// Mutable emulated drive at the given address (fault injection, presets).
    pub fn drive_mut(&mut self, slave: SlaveAddress) -> Option<&mut SimulatedDrive> {
        self.drives
            .iter_mut()
            .find(|(a, _)| *a == slave)
            .map(|(_, d)| d)
    }

    fn entry(&self, slave: SlaveAddress, object: ObjectIndex) -> Option<&MappedEntry> {
        self.layout
            .iter()
            .find(|e| e.slave == slave && e.object == object)
    }

    fn read_entry(&self, slave: SlaveAddress, object: ObjectIndex) -> u32 {
        let Some(entry) = self.entry(slave, object) else {
            return 0;
        };
        let bytes = &self.frame[entry.offset..entry.offset + entry.width];
        match entry.width {
            1 => bytes[0] as u32,
            2 => u16::from_le_bytes([bytes[0], bytes[1]]) as u32,
            _ => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    fn write_entry(&mut self, slave: SlaveAddress, object: ObjectIndex, value: u32) {
        let Some(entry) = self.entry(slave, object).copied() else {
            return;
        };
        let bytes = value.to_le_bytes();
        self.frame[entry.offset..entry.offset + entry.width]
            .copy_from_slice(&bytes[..entry.width]);
    }

    fn require_active(&self) -> Result<(), BusError> {
        match self.phase {
            Phase::Active => Ok(()),
            _ => Err(BusError::NotActivated),
        }
    }

    fn require_configuring(&self, what: &str) -> Result<(), BusError> {
        match self.phase {
            Phase::Configuring => Ok(()),
            _ => Err(BusError::ActivationFailed(format!(
                "{what} after activation"
            ))),
        }
    }

    fn check_frame_len(&self, len: usize) -> Result<(), BusError> {
        if len != self.domain_size {
            return Err(BusError::Exchange(format!(
                "domain buffer is {len} bytes, expected {}",
                self.domain_size
            )));
        }
        Ok(())
    }
}

impl BusMaster for SimulationMaster {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn register_domain(&mut self) -> Result<(), BusError> {
        self.require_configuring("domain registration")?;
        if self.domain_registered {
            return Err(BusError::DomainRegistration(
                "domain already registered".to_string(),
            ));
        }
        self.domain_registered = true;
        Ok(())
    }

    fn register_drive(&mut self, slave: SlaveAddress) -> Result<(), BusError> {
        self.require_configuring("drive registration")?;
        if !self.domain_registered {
            return Err(BusError::DomainRegistration(
                "drive registered before domain".to_string(),
            ));
        }
        if self.drives.iter().any(|(a, _)| *a == slave) {
            return Err(BusError::DomainRegistration(format!(
                "slave {slave} already registered"
            )));
        }
        let description = self
            .topology
            .slave(slave)
            .ok_or(BusError::SlaveNotFound(slave))?;

        let mut placed = Vec::with_capacity(description.entries.len());
        let mut offset = self.domain_size;
        for direction in [PdoDirection::Output, PdoDirection::Input] {
            for entry in description.entries.iter().filter(|e| e.direction == direction) {
                placed.push(MappedEntry {
                    slave,
                    object: entry.object(),
                    offset,
                    width: entry.width(),
                    direction,
                });
                offset += entry.width();
            }
        }
        debug!(
            "Simulation master: slave {slave} '{}' mapped {} entries ({} bytes)",
            description.name,
            placed.len(),
            offset - self.domain_size
        );

        self.layout.extend(placed);
        self.domain_size = offset;
        self.drives.push((slave, SimulatedDrive::new()));
        Ok(())
    }

    fn set_send_interval(&mut self, period: Duration) -> Result<(), BusError> {
        if period.is_zero() {
            return Err(BusError::ActivationFailed(
                "send interval must be non-zero".to_string(),
            ));
        }
        self.send_interval = period;
        Ok(())
    }

    fn register_dc(&mut self, slave: SlaveAddress) -> Result<(), BusError> {
        self.require_configuring("DC registration")?;
        let description = self
            .topology
            .slave(slave)
            .ok_or(BusError::SlaveNotFound(slave))?;
        if !description.dc_capable {
            warn!("Simulation master: slave {slave} has no distributed clock");
            return Ok(());
        }
        if !self.dc_slaves.contains(&slave) {
            self.dc_slaves.push(slave);
        }
        Ok(())
    }

    fn set_application_time(&mut self, time_ns: u64) {
        self.application_time_ns = time_ns;
    }

    fn set_mode(&mut self, slave: SlaveAddress, mode: ModeOfOperation) -> Result<(), BusError> {
        self.require_configuring("mode selection")?;
        let drive = self
            .drive_mut(slave)
            .ok_or(BusError::SlaveNotFound(slave))?;
        drive.configure_mode(mode);
        debug!("Simulation master: slave {slave} mode {mode:?}");
        Ok(())
    }

    fn activate(&mut self) -> Result<(), BusError> {
        self.require_configuring("activation")?;
        if !self.domain_registered {
            return Err(BusError::ActivationFailed(
                "no domain registered".to_string(),
            ));
        }
        self.frame = vec![0u8; self.domain_size];
        self.phase = Phase::Active;
        info!(
            "Simulation master activated: domain {} bytes, {} drive(s), send interval {:?}",
            self.domain_size,
            self.drives.len(),
            self.send_interval
        );
        Ok(())
    }

    fn domain_size(&self) -> Result<usize, BusError> {
        self.require_active()?;
        Ok(self.domain_size)
    }

    fn domain_offset(&self, slave: SlaveAddress, entry: ObjectIndex) -> Option<usize> {
        self.entry(slave, entry).map(|e| e.offset)
    }

    fn receive(&mut self, domain: &mut [u8]) -> Result<(), BusError> {
        self.require_active()?;
        self.check_frame_len(domain.len())?;

        for i in 0..self.drives.len() {
            let (addr, drive) = &self.drives[i];
            let (addr, status, position) = (*addr, drive.status_word(), drive.position());
            self.write_entry(addr, STATUSWORD, status as u32);
            self.write_entry(addr, POSITION_ACTUAL, position as u32);
        }

        domain.copy_from_slice(&self.frame);
        self.counters.frames_received += 1;
        Ok(())
    }

    fn sync_dc(&mut self, time_ns: u64) -> Result<(), BusError> {
        self.require_active()?;
        if let Some(last) = self.last_dc_ns {
            if time_ns < last {
                return Err(BusError::Exchange(format!(
                    "distributed clock stamped backwards ({time_ns} < {last})"
                )));
            }
        }
        self.last_dc_ns = Some(time_ns);
        self.counters.dc_syncs += 1;
        Ok(())
    }

    fn send(&mut self, domain: &[u8]) -> Result<(), BusError> {
        self.require_active()?;
        self.check_frame_len(domain.len())?;
        self.frame.copy_from_slice(domain);

        let interval = self.send_interval;
        for i in 0..self.drives.len() {
            let addr = self.drives[i].0;
            let outputs = DriveOutputs {
                control_word: self.read_entry(addr, CONTROLWORD) as u16,
                mode: self.read_entry(addr, MODES_OF_OPERATION) as u8,
                target_position: self.read_entry(addr, TARGET_POSITION) as i32,
                target_velocity: self.read_entry(addr, TARGET_VELOCITY) as i32,
            };
            self.drives[i].1.cycle(&outputs, interval);
        }

        self.counters.frames_sent += 1;
        Ok(())
    }

    fn release(&mut self) {
        if self.phase == Phase::Released {
            return;
        }
        info!(
            "Simulation master released after {} frames sent",
            self.counters.frames_sent
        );
        self.phase = Phase::Released;
        self.frame.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVO: SlaveAddress = SlaveAddress::new(0, 0);

    fn activated() -> SimulationMaster {
        let mut master = SimulationMaster::new(SimTopology::default());
        master.register_domain().unwrap();
        master.register_drive(SERVO).unwrap();
        master.register_dc(SERVO).unwrap();
        master
            .set_mode(SERVO, ModeOfOperation::CyclicSyncPosition)
            .unwrap();
        master.activate().unwrap();
        master
    }

    #[test]
    fn default_layout_outputs_then_inputs() {
        let master = activated();
        assert_eq!(master.domain_size().unwrap(), 17);
        assert_eq!(master.domain_offset(SERVO, CONTROLWORD), Some(0));
        assert_eq!(master.domain_offset(SERVO, TARGET_POSITION), Some(2));
        assert_eq!(master.domain_offset(SERVO, TARGET_VELOCITY), Some(6));
        assert_eq!(master.domain_offset(SERVO, MODES_OF_OPERATION), Some(10));
        assert_eq!(master.domain_offset(SERVO, STATUSWORD), Some(11));
        assert_eq!(master.domain_offset(SERVO, POSITION_ACTUAL), Some(13));
        assert_eq!(
            master.domain_offset(SERVO, ObjectIndex::new(0x6077, 0)),
            None
        );
    }

    #[test]
    fn unknown_slave_rejected() {
        let mut master = SimulationMaster::new(SimTopology::default());
        master.register_domain().unwrap();
        let result = master.register_drive(SlaveAddress::new(0, 7));
        assert!(matches!(result, Err(BusError::SlaveNotFound(_))));
    }

    #[test]
    fn exchange_requires_activation() {
        let mut master = SimulationMaster::new(SimTopology::default());
        let mut buf = [0u8; 17];
        assert!(matches!(master.receive(&mut buf), Err(BusError::NotActivated)));
        assert!(matches!(master.domain_size(), Err(BusError::NotActivated)));
    }

    #[test]
    fn configuration_rejected_after_activation() {
        let mut master = activated();
        assert!(master.register_drive(SERVO).is_err());
        assert!(master
            .set_mode(SERVO, ModeOfOperation::CyclicSyncVelocity)
            .is_err());
    }

    #[test]
    fn wrong_domain_length_rejected() {
        let mut master = activated();
        let mut buf = [0u8; 4];
        assert!(matches!(master.receive(&mut buf), Err(BusError::Exchange(_))));
    }

    #[test]
    fn receive_reports_status_and_position() {
        let mut master = activated();
        master.drive_mut(SERVO).unwrap().set_position(-5);
        let mut buf = vec![0u8; 17];
        master.receive(&mut buf).unwrap();
        let status = u16::from_le_bytes([buf[11], buf[12]]);
        assert_eq!(status & 0x4F, 0x00);
        let actual = i32::from_le_bytes([buf[13], buf[14], buf[15], buf[16]]);
        assert_eq!(actual, -5);
        assert_eq!(master.counters().frames_received, 1);
    }

    #[test]
    fn dc_must_not_go_backwards() {
        let mut master = activated();
        master.sync_dc(1_000).unwrap();
        master.sync_dc(1_000).unwrap();
        assert!(master.sync_dc(999).is_err());
        assert_eq!(master.last_dc_ns(), Some(1_000));
    }

    #[test]
    fn release_is_idempotent() {
        let mut master = activated();
        master.release();
        master.release();
        assert!(master.is_released());
        let buf = [0u8; 17];
        assert!(master.send(&buf).is_err());
    }
}
