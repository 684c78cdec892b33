//! Bring-up and power sequence against the simulated drive.

use std::sync::Arc;

use ecat_common::bus::SlaveAddress;
use ecat_common::cia402::DriveState;
use ecat_common::config::{MotionMode, MotorConfig};
use ecat_hal::simulation::{SimTopology, SimulationMaster};
use ecat_motor::clock::{MonoTime, SimulatedClock};
use ecat_motor::cycle::{CycleRunner, LatencyStats, RunFlag};
use ecat_motor::lifecycle::bring_up;
use ecat_motor::motion::MotionGenerator;

const SERVO: SlaveAddress = SlaveAddress::new(0, 0);
const PERIOD_NS: i64 = 1_000_000;

fn runner(config: &MotorConfig) -> CycleRunner<SimulationMaster, SimulatedClock> {
    let mut master = SimulationMaster::new(SimTopology::default());
    let mut clock = SimulatedClock::new(MonoTime::new(10, 0));
    let domain = bring_up(&mut master, &mut clock, config).expect("bring-up");
    let motion = MotionGenerator::from_config(config).expect("motion");
    CycleRunner::new(
        master,
        clock,
        domain,
        motion,
        config,
        Arc::new(LatencyStats::new()),
        RunFlag::new(),
    )
}

/// Absolute deadline of cycle `n` (1-based).
fn deadline(n: i64) -> MonoTime {
    MonoTime::new(10, 0).add_ns(PERIOD_NS * n)
}

fn run_cycles(runner: &mut CycleRunner<SimulationMaster, SimulatedClock>, n: i64) {
    for i in 1..=n {
        runner.run_cycle(deadline(i)).expect("cycle");
    }
}

#[test]
fn position_mode_enables_drive_and_advances_constantly() {
    let config = MotorConfig::default();
    let mut runner = runner(&config);

    // Boot (2), Shutdown, Switch On, Enable Operation: enabled after cycle 5.
    run_cycles(&mut runner, 5);
    let drive = runner.bus().drive(SERVO).unwrap();
    assert_eq!(drive.state(), DriveState::OperationEnabled);
    assert_eq!(drive.position(), 0);

    let mut previous = 0;
    for n in 6..=20 {
        runner.run_cycle(deadline(n)).unwrap();
        let position = runner.bus().drive(SERVO).unwrap().position();
        assert_eq!(position - previous, 8389);
        previous = position;
    }
    assert_eq!(previous, 15 * 8389);

    let report = runner.report();
    assert_eq!(report.cycles, 20);
    assert_eq!(report.drive_state, DriveState::OperationEnabled);
    assert_eq!(report.rollovers, 0);
    assert_eq!(runner.domain().domain().read_u8(10), 8);
}

#[test]
fn velocity_mode_commands_constant_velocity() {
    let mut config = MotorConfig::default();
    config.drive.mode = MotionMode::Velocity;
    config.set_velocity(2.0);
    let mut runner = runner(&config);
    run_cycles(&mut runner, 25);

    let raw = runner.domain().domain();
    let offsets = *runner.domain().offsets();
    assert_eq!(raw.read_u16(offsets.controlword), 0x1F);
    assert_eq!(raw.read_i32(offsets.target_velocity), 16_777_216);
    assert_eq!(raw.read_u8(offsets.mode_of_operation), 9);
    assert_eq!(raw.read_i32(offsets.target_position), 0);

    // Enabled from cycle 6: 20 cycles of 16777.216 counts, integrated exactly.
    let position = runner.bus().drive(SERVO).unwrap().position();
    assert_eq!(position, 16_777_216 * 20 / 1000);
}

#[test]
fn requested_velocity_clamped_to_limit() {
    let mut config = MotorConfig::default();
    config.drive.mode = MotionMode::Velocity;
    config.set_velocity(75.0);
    assert_eq!(config.drive.velocity, 50.0);
    config.validate().unwrap();

    let mut motion = MotionGenerator::from_config(&config).unwrap();
    assert_eq!(
        motion.command(0),
        ecat_motor::motion::MotionTarget::Velocity(50 * (1 << 23))
    );
}

#[test]
fn drive_fault_answered_with_reset_every_cycle() {
    let config = MotorConfig::default();
    let mut runner = runner(&config);
    run_cycles(&mut runner, 8);
    let offsets = *runner.domain().offsets();
    let frozen_target = runner.domain().domain().read_i32(offsets.target_position);

    runner.bus_mut().drive_mut(SERVO).unwrap().inject_fault(50);
    for n in 9..=40 {
        runner.run_cycle(deadline(n)).unwrap();
        let raw = runner.domain().domain();
        assert_eq!(raw.read_u16(offsets.controlword), 0x80, "cycle {n}");
        assert_eq!(raw.read_i32(offsets.target_position), frozen_target);
    }
    assert!(runner.report().drive_state.is_fault());

    // Once the condition clears, the reset takes and the drive re-enables.
    for n in 41..=80 {
        runner.run_cycle(deadline(n)).unwrap();
    }
    assert_eq!(runner.report().drive_state, DriveState::OperationEnabled);
}
