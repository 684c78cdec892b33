//! Shared fixtures for the integration tests.

mod jitter;
mod offsets;
mod shutdown;
mod startup;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use ecat_common::bus::{BusError, BusMaster, SlaveAddress};
use ecat_common::cia402::{ModeOfOperation, ObjectIndex};
use ecat_hal::simulation::{SimTopology, SimulationMaster};
use ecat_motor::cycle::RunFlag;

/// Bus I/O counters shared with the test body.
#[derive(Debug, Default)]
pub struct BusCounters {
    pub receives: AtomicU64,
    pub sends: AtomicU64,
    pub dc_syncs: AtomicU64,
    pub released: AtomicBool,
}

impl BusCounters {
    pub fn receives(&self) -> u64 {
        self.receives.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> u64 {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Simulation master that counts bus I/O and can clear the run flag from
/// inside a given cycle's `receive()`.
pub struct CountingBus {
    pub inner: SimulationMaster,
    pub counters: Arc<BusCounters>,
    stop_at: Option<(u64, RunFlag)>,
}

impl CountingBus {
    pub fn new(topology: SimTopology) -> Self {
        Self {
            inner: SimulationMaster::new(topology),
            counters: Arc::new(BusCounters::default()),
            stop_at: None,
        }
    }

    /// Clear `flag` while cycle `cycle` (1-based) is in flight.
    pub fn stop_during(mut self, cycle: u64, flag: RunFlag) -> Self {
        self.stop_at = Some((cycle, flag));
        self
    }
}

impl BusMaster for CountingBus {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn register_domain(&mut self) -> Result<(), BusError> {
        self.inner.register_domain()
    }

    fn register_drive(&mut self, slave: SlaveAddress) -> Result<(), BusError> {
        self.inner.register_drive(slave)
    }

    fn set_send_interval(&mut self, period: Duration) -> Result<(), BusError> {
        self.inner.set_send_interval(period)
    }

    fn register_dc(&mut self, slave: SlaveAddress) -> Result<(), BusError> {
        self.inner.register_dc(slave)
    }

    fn set_application_time(&mut self, time_ns: u64) {
        self.inner.set_application_time(time_ns)
    }

    fn set_mode(&mut self, slave: SlaveAddress, mode: ModeOfOperation) -> Result<(), BusError> {
        self.inner.set_mode(slave, mode)
    }

    fn activate(&mut self) -> Result<(), BusError> {
        self.inner.activate()
    }

    fn domain_size(&self) -> Result<usize, BusError> {
        self.inner.domain_size()
    }

    fn domain_offset(&self, slave: SlaveAddress, entry: ObjectIndex) -> Option<usize> {
        self.inner.domain_offset(slave, entry)
    }

    fn receive(&mut self, domain: &mut [u8]) -> Result<(), BusError> {
        let n = self.counters.receives.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((cycle, flag)) = &self.stop_at {
            if *cycle == n {
                flag.stop();
            }
        }
        self.inner.receive(domain)
    }

    fn sync_dc(&mut self, time_ns: u64) -> Result<(), BusError> {
        self.counters.dc_syncs.fetch_add(1, Ordering::SeqCst);
        self.inner.sync_dc(time_ns)
    }

    fn send(&mut self, domain: &[u8]) -> Result<(), BusError> {
        self.counters.sends.fetch_add(1, Ordering::SeqCst);
        self.inner.send(domain)
    }

    fn release(&mut self) {
        self.counters.released.store(true, Ordering::SeqCst);
        self.inner.release()
    }
}

/// Cloneable in-memory stdout replacement.
#[derive(Debug, Clone, Default)]
pub struct SharedSink(pub Arc<std::sync::Mutex<Vec<u8>>>);

impl SharedSink {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl std::io::Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
