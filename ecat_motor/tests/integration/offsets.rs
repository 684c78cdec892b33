//! Setup failures: nothing cycles, the master is released.

use std::sync::Arc;

use ecat_common::bus::{BusError, SlaveAddress};
use ecat_common::cia402::{
    CONTROLWORD, MODES_OF_OPERATION, ObjectIndex, POSITION_ACTUAL, STATUSWORD, TARGET_POSITION,
    TARGET_VELOCITY,
};
use ecat_common::config::MotorConfig;
use ecat_hal::simulation::topology::default_cia402_entries;
use ecat_hal::simulation::{SimTopology, SlaveDescription};
use ecat_motor::clock::{MonoTime, SimulatedClock};
use ecat_motor::cycle::RunFlag;
use ecat_motor::domain::DomainError;
use ecat_motor::lifecycle::{self, SetupError};

use super::{BusCounters, CountingBus, SharedSink};

fn start(topology: &str, config: &MotorConfig) -> (Result<(), SetupError>, Arc<BusCounters>) {
    start_with(SimTopology::from_toml(topology).expect("topology"), config)
}

fn start_with(
    topology: SimTopology,
    config: &MotorConfig,
) -> (Result<(), SetupError>, Arc<BusCounters>) {
    let bus = CountingBus::new(topology);
    let counters = bus.counters.clone();
    let sink = SharedSink::default();
    let result = lifecycle::run(
        bus,
        SimulatedClock::new(MonoTime::new(1, 0)),
        config,
        RunFlag::new(),
        sink.clone(),
    )
    .map(|_| ());
    assert!(sink.text().is_empty());
    (result, counters)
}

#[test]
fn unmapped_target_velocity_prevents_startup() {
    let (result, counters) = start(
        r#"
[[slaves]]
entries = [
    { index = 0x6040, bits = 16, direction = "output" },
    { index = 0x607A, bits = 32, direction = "output" },
    { index = 0x6060, bits = 8,  direction = "output" },
    { index = 0x6041, bits = 16, direction = "input" },
    { index = 0x6064, bits = 32, direction = "input" },
]
"#,
        &MotorConfig::default(),
    );

    match result {
        Err(SetupError::Domain(DomainError::Unresolved { slave, object })) => {
            assert_eq!(slave, SlaveAddress::new(0, 0));
            assert_eq!(object, TARGET_VELOCITY);
        }
        other => panic!("expected unresolved offset, got {other:?}"),
    }
    assert_eq!(counters.receives(), 0);
    assert_eq!(counters.sends(), 0);
    assert!(counters.released());
}

/// Standard mapping with one object left out.
fn topology_without(missing: ObjectIndex) -> SimTopology {
    SimTopology {
        slaves: vec![SlaveDescription {
            entries: default_cia402_entries()
                .into_iter()
                .filter(|entry| entry.object() != missing)
                .collect(),
            ..Default::default()
        }],
    }
}

#[test]
fn any_unmapped_object_prevents_startup() {
    let objects = [
        STATUSWORD,
        CONTROLWORD,
        POSITION_ACTUAL,
        TARGET_POSITION,
        TARGET_VELOCITY,
        MODES_OF_OPERATION,
    ];
    for missing in objects {
        let (result, counters) = start_with(topology_without(missing), &MotorConfig::default());

        match result {
            Err(SetupError::Domain(DomainError::Unresolved { slave, object })) => {
                assert_eq!(slave, SlaveAddress::new(0, 0), "{missing}");
                assert_eq!(object, missing);
            }
            other => panic!("{missing} unmapped: expected unresolved offset, got {other:?}"),
        }
        assert_eq!(counters.receives(), 0, "{missing}");
        assert_eq!(counters.sends(), 0, "{missing}");
        assert!(counters.released(), "{missing}");
    }
}

#[test]
fn narrow_statusword_at_domain_end_prevents_startup() {
    let (result, counters) = start(
        r#"
[[slaves]]
entries = [
    { index = 0x6040, bits = 16, direction = "output" },
    { index = 0x607A, bits = 32, direction = "output" },
    { index = 0x60FF, bits = 32, direction = "output" },
    { index = 0x6060, bits = 8,  direction = "output" },
    { index = 0x6064, bits = 32, direction = "input" },
    { index = 0x6041, bits = 8,  direction = "input" },
]
"#,
        &MotorConfig::default(),
    );

    assert!(matches!(
        result,
        Err(SetupError::Domain(DomainError::OutOfBounds { object, offset: 15, width: 2, size: 16 }))
            if object == STATUSWORD
    ));
    assert_eq!(counters.sends(), 0);
    assert!(counters.released());
}

#[test]
fn configured_slave_missing_from_topology() {
    let mut config = MotorConfig::default();
    config.drive.slave = SlaveAddress::new(0, 4);
    let (result, counters) = start("", &config);

    assert!(matches!(
        result,
        Err(SetupError::Bus(BusError::SlaveNotFound(addr))) if addr == SlaveAddress::new(0, 4)
    ));
    assert!(counters.released());
}

#[test]
fn invalid_velocity_rejected_before_bus_setup() {
    let mut config = MotorConfig::default();
    config.drive.velocity = f64::NAN;
    let (result, counters) = start("", &config);

    assert!(matches!(result, Err(SetupError::Config(_))));
    assert_eq!(counters.receives(), 0);
    assert!(counters.released());
}
