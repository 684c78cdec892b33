//! Deadline arithmetic and latency statistics under injected jitter.

use std::sync::Arc;

use ecat_common::config::MotorConfig;
use ecat_hal::simulation::SimTopology;
use ecat_motor::clock::{MonoTime, SimulatedClock};
use ecat_motor::cycle::{CycleRunner, LatencyStats, RunFlag};
use ecat_motor::lifecycle::bring_up;
use ecat_motor::motion::MotionGenerator;

use super::CountingBus;

const PERIOD_NS: i64 = 1_000_000;

/// Deterministic jitter in `[0, 400 µs)`.
fn lcg_jitter(seed: u64) -> impl FnMut(u64) -> i64 + Send {
    let mut state = seed;
    move |_| {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((state >> 33) % 400_000) as i64
    }
}

fn run_with_clock(
    clock: SimulatedClock,
    cycles: u64,
) -> CycleRunner<CountingBus, SimulatedClock> {
    let config = MotorConfig::default();
    let flag = RunFlag::new();
    let mut bus = CountingBus::new(SimTopology::default()).stop_during(cycles, flag.clone());
    let mut clock = clock;
    let domain = bring_up(&mut bus, &mut clock, &config).unwrap();
    let mut runner = CycleRunner::new(
        bus,
        clock,
        domain,
        MotionGenerator::from_config(&config).unwrap(),
        &config,
        Arc::new(LatencyStats::new()),
        flag,
    );
    runner.run().unwrap();
    runner
}

#[test]
fn deadlines_are_arithmetic_over_many_cycles() {
    // Start just before a second boundary so the nanosecond carry is exercised.
    let start = MonoTime::new(41, 999_600_000);
    let clock = SimulatedClock::new(start)
        .with_jitter(lcg_jitter(7))
        .with_work_ns(3_000);
    let runner = run_with_clock(clock, 1_500);

    let deadlines = runner.clock().deadlines();
    assert_eq!(deadlines.len(), 1_500);
    // bring_up read the clock once; the loop's base time is one work step later.
    let base = start.add_ns(3_000);
    for (i, deadline) in deadlines.iter().enumerate() {
        assert_eq!(*deadline, base.add_ns(PERIOD_NS * (i as i64 + 1)), "cycle {}", i + 1);
    }
    assert_eq!(deadlines[1_499].secs(), 43);

    let report = runner.report();
    assert_eq!(report.cycles, 1_500);
    assert_eq!(report.overruns, 0);
}

#[test]
fn latency_matches_injected_jitter_extremes() {
    let mut replay = lcg_jitter(99);
    let injected: Vec<i64> = (0..1_200).map(|i| replay(i)).collect();
    let expected_min = *injected.iter().min().unwrap();
    let expected_max = *injected.iter().max().unwrap();

    let clock = SimulatedClock::new(MonoTime::new(3, 0)).with_jitter(lcg_jitter(99));
    let runner = run_with_clock(clock, 1_200);

    let latency = runner.report().latency.unwrap();
    assert_eq!(latency.samples, 1_200);
    assert_eq!(latency.min_ns, expected_min);
    assert_eq!(latency.max_ns, expected_max);
}

#[test]
fn min_max_only_widen() {
    let config = MotorConfig::default();
    let mut bus = CountingBus::new(SimTopology::default());
    let mut clock = SimulatedClock::new(MonoTime::new(0, 0)).with_jitter(lcg_jitter(3));
    let domain = bring_up(&mut bus, &mut clock, &config).unwrap();
    let mut runner = CycleRunner::new(
        bus,
        clock,
        domain,
        MotionGenerator::from_config(&config).unwrap(),
        &config,
        Arc::new(LatencyStats::new()),
        RunFlag::new(),
    );

    let mut previous: Option<(i64, i64)> = None;
    let mut deadline = MonoTime::new(0, 0);
    for _ in 0..1_000 {
        deadline = deadline.add_ns(PERIOD_NS);
        runner.run_cycle(deadline).unwrap();
        let snap = runner.stats().snapshot().unwrap();
        if let Some((min, max)) = previous {
            assert!(snap.min_ns <= min);
            assert!(snap.max_ns >= max);
        }
        assert!(snap.min_ns <= snap.max_ns);
        previous = Some((snap.min_ns, snap.max_ns));
    }
}

#[test]
fn late_wakeup_does_not_shift_later_deadlines() {
    let start = MonoTime::new(5, 0);
    let clock = SimulatedClock::new(start).with_jitter(|i| if i == 10 { 2_500_000 } else { 0 });
    let runner = run_with_clock(clock, 100);

    for (i, deadline) in runner.clock().deadlines().iter().enumerate() {
        assert_eq!(*deadline, start.add_ns(PERIOD_NS * (i as i64 + 1)));
    }
    let report = runner.report();
    assert!(report.overruns >= 1);
    assert_eq!(report.latency.unwrap().max_ns, 2_500_000);
}
