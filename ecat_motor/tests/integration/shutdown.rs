//! Cooperative shutdown: the in-flight cycle completes, nothing follows.

use std::sync::Arc;

use ecat_common::config::MotorConfig;
use ecat_hal::simulation::SimTopology;
use ecat_motor::clock::{MonoTime, MonotonicClock, SimulatedClock};
use ecat_motor::cycle::{CycleRunner, LatencyStats, RunFlag};
use ecat_motor::lifecycle::{self, bring_up};
use ecat_motor::motion::MotionGenerator;

use super::{CountingBus, SharedSink};

fn runner(bus: CountingBus, run_flag: RunFlag) -> CycleRunner<CountingBus, SimulatedClock> {
    let config = MotorConfig::default();
    let mut bus = bus;
    let mut clock = SimulatedClock::new(MonoTime::new(1, 0)).with_work_ns(20_000);
    let domain = bring_up(&mut bus, &mut clock, &config).expect("bring-up");
    CycleRunner::new(
        bus,
        clock,
        domain,
        MotionGenerator::from_config(&config).unwrap(),
        &config,
        Arc::new(LatencyStats::new()),
        run_flag,
    )
}

#[test]
fn flag_cleared_mid_cycle_allows_exactly_one_more_send() {
    let flag = RunFlag::new();
    let bus = CountingBus::new(SimTopology::default()).stop_during(25, flag.clone());
    let counters = bus.counters.clone();
    let mut runner = runner(bus, flag.clone());

    let report = runner.run().expect("clean stop");

    assert!(!flag.is_running());
    assert_eq!(report.cycles, 25);
    assert_eq!(counters.receives(), 25);
    assert_eq!(counters.sends(), 25);
    assert_eq!(counters.dc_syncs.load(std::sync::atomic::Ordering::SeqCst), 25);
    assert_eq!(runner.clock().wakeups(), 25);
    assert!(!counters.released());
}

#[test]
fn flag_cleared_before_start_runs_no_cycle() {
    let flag = RunFlag::new();
    flag.stop();
    let bus = CountingBus::new(SimTopology::default());
    let counters = bus.counters.clone();
    let mut runner = runner(bus, flag);

    let report = runner.run().expect("clean stop");
    assert_eq!(report.cycles, 0);
    assert_eq!(counters.receives(), 0);
    assert_eq!(counters.sends(), 0);
    assert!(report.latency.is_none());
}

#[test]
fn lifecycle_joins_prints_final_line_and_releases() {
    let flag = RunFlag::new();
    let bus = CountingBus::new(SimTopology::default()).stop_during(50, flag.clone());
    let counters = bus.counters.clone();
    let sink = SharedSink::default();

    let report = lifecycle::run(bus, MonotonicClock, &MotorConfig::default(), flag, sink.clone())
        .expect("clean shutdown");

    assert_eq!(report.cycles, 50);
    assert_eq!(counters.sends(), 50);
    assert!(counters.released());

    let text = sink.text();
    let last = text.lines().last().expect("final latency line");
    assert!(last.starts_with("latency:  "), "{last:?}");
    assert!(last.contains(" ... "));
}

#[test]
fn periodic_reports_reach_the_sink() {
    let flag = RunFlag::new();
    let bus = CountingBus::new(SimTopology::default()).stop_during(200, flag.clone());
    let sink = SharedSink::default();
    let mut config = MotorConfig::default();
    config.telemetry.report_interval_cycles = Some(20);

    let report = lifecycle::run(bus, MonotonicClock, &config, flag, sink.clone()).unwrap();
    assert_eq!(report.cycles, 200);

    // Polled every 10 ms against a report every 20 ms, plus the final line.
    let lines = sink.text().lines().count();
    assert!(lines >= 2, "only {lines} latency line(s)");
    assert!(lines <= 11);
}
