//! Actuator behaviour against the simulated stepper: trajectories, homing
//! corrections and the bag volume model.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rstest::rstest;
use vent_core::{
    Actuator, ActuatorCfg, Compliance, EncoderPosition, HomeCorrection, SharedBus,
    StepCountPosition,
};
use vent_hardware::{SimulatedEncoder, SimulatedStepper, StepperProbe};
use vent_traits::{ManualClock, StepperDrive};

type EncActuator = Actuator<SimulatedStepper, EncoderPosition<SimulatedEncoder>>;
type StepActuator = Actuator<SimulatedStepper, StepCountPosition>;

fn steps_for(deg: f64) -> i64 {
    (deg / 360.0 * ActuatorCfg::default().steps_per_rev).round() as i64
}

fn with_encoder(start_deg: f64) -> (ManualClock, StepperProbe, EncActuator) {
    let clock = ManualClock::new();
    let stepper = SimulatedStepper::new(Arc::new(clock.clone())).with_position(steps_for(start_deg));
    let probe = stepper.probe();
    let cfg = ActuatorCfg::default();
    let enc = SimulatedEncoder::new(probe.clone(), cfg.steps_per_rev, 0);
    let act = Actuator::new(
        Arc::new(Mutex::new(stepper)),
        EncoderPosition::new(SharedBus::new(enc)),
        cfg,
    );
    (clock, probe, act)
}

fn with_steps(start_deg: f64) -> (ManualClock, StepActuator) {
    let clock = ManualClock::new();
    let stepper = SimulatedStepper::new(Arc::new(clock.clone())).with_position(steps_for(start_deg));
    let act = Actuator::new(
        Arc::new(Mutex::new(stepper)),
        StepCountPosition,
        ActuatorCfg::default(),
    );
    (clock, act)
}

fn service(clock: &ManualClock, act: &StepActuator, span: Duration) {
    let drive = act.drive_handle();
    let tick = Duration::from_millis(20);
    let mut t = Duration::ZERO;
    while t < span {
        clock.advance(tick);
        drive.lock().unwrap().run().unwrap();
        t += tick;
    }
}

#[test]
fn fast_move_is_clamped_to_drive_limit() {
    let (_clock, mut act) = with_steps(0.0);
    let t = act.plan_trajectory(0.01, 180.0).unwrap();
    assert!(t.clamped);
    assert!((t.velocity_deg_per_s - 252.0).abs() < 1e-6, "{t:?}");
    assert!((act.command().target_angle_deg - 180.0).abs() < 1e-12);
}

#[test]
fn normal_breath_is_not_clamped() {
    let (_clock, mut act) = with_steps(0.0);
    let t = act.plan_trajectory(3.65, 179.25).unwrap();
    assert!(!t.clamped);
    assert!((t.velocity_deg_per_s - 179.25 / 3.65).abs() < 1e-9);
}

#[test]
fn zero_duration_uses_max_velocity() {
    let (_clock, mut act) = with_steps(0.0);
    let t = act.plan_trajectory(0.0, 90.0).unwrap();
    assert!(t.clamped);
    assert!((t.velocity_deg_per_s - act.max_velocity_deg_per_s()).abs() < 1e-12);
}

#[test]
fn commanded_move_reaches_target() {
    let (clock, mut act) = with_steps(0.0);
    act.set_position(90.0).unwrap();
    act.set_speed(90.0).unwrap();
    assert!(!act.target_reached().unwrap());
    service(&clock, &act, Duration::from_millis(1_100));
    assert!(act.target_reached().unwrap());
    assert!((act.position_deg().unwrap() - 90.0).abs() < 0.5);
}

#[test]
fn set_position_clamps_to_travel() {
    let (_clock, mut act) = with_steps(0.0);
    act.set_position(250.0).unwrap();
    assert!((act.command().target_angle_deg - 180.0).abs() < 1e-12);
    let drive = act.drive_handle();
    assert_eq!(drive.lock().unwrap().distance_to_go(), steps_for(180.0));
}

#[rstest]
#[case::below_window(0.0, HomeCorrection::Nudged { delta_deg: 0.5 })]
#[case::just_past_home(3.0, HomeCorrection::Nudged { delta_deg: -0.5 })]
#[case::just_behind_home(357.0, HomeCorrection::Nudged { delta_deg: 0.5 })]
#[case::in_window(0.5, HomeCorrection::AlreadyHome)]
#[case::far_away(200.0, HomeCorrection::Uncorrectable)]
fn encoder_home_corrections(#[case] start_deg: f64, #[case] expected: HomeCorrection) {
    let (_clock, _probe, mut act) = with_encoder(start_deg);
    assert_eq!(act.add_correction().unwrap(), expected);
}

#[test]
fn correction_nudge_moves_into_window() {
    let (clock, probe, mut act) = with_encoder(0.0);
    assert!(!act.is_home().unwrap());
    act.add_correction().unwrap();
    let drive = act.drive_handle();
    clock.advance(Duration::from_millis(100));
    drive.lock().unwrap().run().unwrap();
    assert_eq!(probe.position(), 1);
    assert!(act.is_home().unwrap());
}

#[test]
fn step_count_home_includes_zero() {
    let (_clock, mut act) = with_steps(0.0);
    assert!(!act.rolls_over());
    assert!(act.is_home().unwrap());
}

#[test]
fn stalled_sweep_is_not_moving() {
    let (clock, mut act) = with_steps(90.0);
    act.home().unwrap();
    service(&clock, &act, Duration::from_millis(200));
    assert!(act.is_moving().unwrap());

    let drive = act.drive_handle();
    let probe = drive.lock().unwrap().probe();
    probe.set_stalled(true);
    service(&clock, &act, Duration::from_millis(200));
    assert!(!act.is_moving().unwrap());
}

#[test]
fn stop_cancels_motion() {
    let (clock, mut act) = with_steps(0.0);
    act.set_position(120.0).unwrap();
    act.set_speed(100.0).unwrap();
    service(&clock, &act, Duration::from_millis(200));
    act.stop().unwrap();
    assert!(act.target_reached().unwrap());
    assert_eq!(act.command().velocity_deg_per_s, 0.0);
}

#[test]
fn home_reference_resets_counter() {
    let (_clock, mut act) = with_steps(45.0);
    act.set_position_as_home().unwrap();
    assert!(act.position_deg().unwrap().abs() < 1e-9);
    assert_eq!(act.set_current_position_as_zero().unwrap(), None);
}

#[test]
fn encoder_zero_is_reported_for_persistence() {
    let (_clock, probe, mut act) = with_encoder(90.0);
    let zero = act.set_current_position_as_zero().unwrap().unwrap();
    // a quarter turn of a 14-bit encoder
    assert!((4_080..=4_100).contains(&zero), "zero {zero}");
    assert!(act.position_deg().unwrap().abs() < 0.05);
    // the shaft did not move
    assert!((probe.angle_deg(act.cfg().steps_per_rev) - 90.0).abs() < 0.5);
}

// Each pair of fits agrees only over the stroke it was measured on; the
// no-compliance bag is full by about 150 deg.
#[rstest]
#[case::none(Compliance::None, 70..=150, 6.0)]
#[case::twenty(Compliance::Twenty, 70..=180, 5.0)]
#[case::fifty(Compliance::Fifty, 70..=180, 5.0)]
fn compliance_curves_round_trip(
    #[case] compliance: Compliance,
    #[case] stroke: std::ops::RangeInclusive<u32>,
    #[case] tolerance_deg: f64,
) {
    let cfg = ActuatorCfg::default();
    for deg in stroke.step_by(10).map(f64::from) {
        let litres = compliance.volume_l(deg, &cfg);
        let back = compliance.degrees_for(litres, &cfg);
        assert!(
            (back - deg).abs() < tolerance_deg,
            "{compliance:?}: {deg} deg -> {litres} L -> {back} deg"
        );
    }
}

#[rstest]
#[case(Compliance::None)]
#[case(Compliance::Twenty)]
#[case(Compliance::Fifty)]
fn volume_stays_inside_bag(#[case] compliance: Compliance) {
    let cfg = ActuatorCfg::default();
    for deg in [-30.0, 0.0, 45.0, 90.0, 135.0, 180.0, 270.0] {
        let v = compliance.volume_l(deg, &cfg);
        assert!((0.0..=cfg.max_bag_volume_l).contains(&v), "{compliance:?} {deg} -> {v}");
    }
    for litres in [0.0, 0.3, 0.6, 1.06, 5.0] {
        let d = compliance.degrees_for(litres, &cfg);
        assert!((cfg.min_pos_deg..=cfg.max_pos_deg).contains(&d), "{compliance:?} {litres} -> {d}");
    }
}

#[test]
fn angles_behind_zero_count_as_empty() {
    let (_clock, mut act) = with_steps(350.0);
    let empty = Compliance::Fifty.volume_l(0.0, act.cfg());
    assert_eq!(act.degrees_to_volume(Compliance::Fifty).unwrap(), empty);
}
