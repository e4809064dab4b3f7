use std::sync::{Arc, Mutex};
use std::time::Duration;

use rstest::rstest;
use vent_core::error::BuildError;
use vent_core::{
    Actuator, ActuatorCfg, BreathPhase, PressureSensor, SensorElectrics, StepCountPosition,
    VentCfg, VentilatorBuilder, WaveformTarget,
};
use vent_hardware::{SimulatedAdc, SimulatedStepper};
use vent_traits::ManualClock;

fn parts(
    cfg: ActuatorCfg,
) -> (
    Actuator<SimulatedStepper, StepCountPosition>,
    PressureSensor<SimulatedAdc>,
    ManualClock,
) {
    let clock = ManualClock::new();
    let stepper = SimulatedStepper::new(Arc::new(clock.clone()));
    let actuator = Actuator::new(Arc::new(Mutex::new(stepper)), StepCountPosition, cfg);
    let gauge = PressureSensor::init(
        SimulatedAdc::new(411),
        &SensorElectrics::default(),
        1.0,
        0.0,
        0,
    );
    (actuator, gauge, clock)
}

#[test]
fn defaults_build_a_machine_in_startup() {
    let (actuator, gauge, clock) = parts(ActuatorCfg::default());
    let vent = VentilatorBuilder::new()
        .with_clock(Arc::new(clock))
        .with_actuator(actuator)
        .with_gauge(gauge)
        .build()
        .unwrap();
    assert_eq!(vent.phase(), BreathPhase::Startup);
    assert_eq!(vent.cycle_count(), 0);
}

#[rstest]
#[case::inverted_travel(ActuatorCfg { min_pos_deg: 180.0, max_pos_deg: 0.0, ..ActuatorCfg::default() })]
#[case::zero_resolution(ActuatorCfg { steps_per_rev: 0.0, ..ActuatorCfg::default() })]
#[case::home_window_above_band(ActuatorCfg { home_max_deg: 6.0, ..ActuatorCfg::default() })]
#[case::empty_bag(ActuatorCfg { max_bag_volume_l: 0.05, ..ActuatorCfg::default() })]
#[case::homing_slower_than_stall_threshold(ActuatorCfg { homing_steps_per_sec: 50.0, ..ActuatorCfg::default() })]
fn bad_actuator_cfg_is_rejected(#[case] cfg: ActuatorCfg) {
    let (actuator, gauge, _clock) = parts(cfg);
    let err = VentilatorBuilder::new()
        .with_actuator(actuator)
        .with_gauge(gauge)
        .build()
        .expect_err("config should be rejected");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(_)) => {}
        other => panic!("expected InvalidConfig, got: {other:?}"),
    }
}

#[test]
fn step_period_must_be_shorter_than_tick() {
    let (actuator, gauge, _clock) = parts(ActuatorCfg::default());
    let mut cfg = VentCfg::default();
    cfg.timing.step_period = Duration::from_millis(25);
    let err = VentilatorBuilder::new()
        .with_config(cfg)
        .with_actuator(actuator)
        .with_gauge(gauge)
        .build()
        .expect_err("step period longer than tick");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig(_))
    ));
}

#[rstest]
#[case::zero_rate(WaveformTarget { breaths_per_minute: 0.0, ..WaveformTarget::default() })]
#[case::nan_volume(WaveformTarget { tidal_volume_ml: f64::NAN, ..WaveformTarget::default() })]
fn bad_target_is_rejected(#[case] target: WaveformTarget) {
    let (actuator, gauge, _clock) = parts(ActuatorCfg::default());
    let err = VentilatorBuilder::new()
        .with_target(target)
        .with_actuator(actuator)
        .with_gauge(gauge)
        .build()
        .expect_err("target should be rejected");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidTarget(_)) => {}
        other => panic!("expected InvalidTarget, got: {other:?}"),
    }
}
