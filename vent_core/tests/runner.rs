//! Real-time runner threads: requests reach the control thread, snapshots
//! come back, and shutdown joins everything.

use std::sync::Arc;
use std::time::{Duration, Instant};

use vent_config::PositionSourceKind;
use vent_core::sim::build_simulated;
use vent_core::{BreathPhase, Request, RunnerOpts, TargetField, VentCfg, VentRunner, WaveformTarget};
use vent_traits::{Clock, MonotonicClock};

fn quick_cfg() -> VentCfg {
    let mut cfg = VentCfg::default();
    cfg.timing.startup = Duration::from_millis(100);
    cfg
}

fn spawn() -> VentRunner {
    let cfg = quick_cfg();
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let (vent, _handles) = build_simulated(
        &cfg,
        PositionSourceKind::Steps,
        Arc::clone(&clock),
        WaveformTarget::default(),
        0.0,
    )
    .unwrap();
    VentRunner::spawn(
        vent,
        clock,
        RunnerOpts {
            tick: cfg.timing.tick,
            step_period: Duration::from_micros(500),
            ..RunnerOpts::default()
        },
    )
}

fn wait_for(what: &str, timeout: Duration, mut cond: impl FnMut() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(start.elapsed() < timeout, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn runner_breathes_on_request_and_shuts_down() {
    let runner = spawn();
    wait_for("startup", Duration::from_secs(5), || {
        runner.live().phase() == BreathPhase::Off
    });

    runner
        .request(Request::ChangePhase(BreathPhase::Inspiration))
        .unwrap();
    wait_for("first breath", Duration::from_secs(5), || {
        runner.live().cycle_count() >= 1
    });
    assert!(runner.live().phase().is_breathing());
    assert_eq!(runner.live().fault(), None);

    let diag = runner.diagnostics(Duration::from_secs(2)).unwrap();
    assert!(diag.tick_count > 0);
    assert!(!diag.rolls_over);

    assert!(runner.stats().ticks > 0);
    let snap = runner.shutdown().expect("final snapshot");
    assert_eq!(snap.phase, BreathPhase::Off);
    assert_eq!(snap.cycle_count, 0);
    assert!(snap.active_alarms.contains(&"TURNING OFF"));
}

#[test]
fn target_requests_apply_on_control_thread() {
    let runner = spawn();
    runner
        .request(Request::SetTarget(TargetField::BreathsPerMinute, 12.0))
        .unwrap();
    wait_for("snapshot with new target", Duration::from_secs(5), || {
        runner
            .latest()
            .is_some_and(|s| (s.target.breaths_per_minute - 12.0).abs() < 1e-9)
    });
}

#[test]
fn zeroing_replies_through_the_runner() {
    let runner = spawn();
    wait_for("startup", Duration::from_secs(5), || {
        runner.live().phase() == BreathPhase::Off
    });
    assert_eq!(runner.zero_actuator(Duration::from_secs(2)).unwrap(), None);
}

#[test]
fn dropping_the_runner_stops_its_threads() {
    for _ in 0..5 {
        let runner = spawn();
        std::thread::sleep(Duration::from_millis(30));
        assert!(runner.is_running());
        drop(runner);
    }
}
