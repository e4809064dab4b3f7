use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;
use vent_hardware::{SimulatedStepper, StepperProbe};
use vent_traits::{ManualClock, StepperDrive};

fn service_for(clock: &ManualClock, drive: &mut SimulatedStepper, total: Duration, every: Duration) {
    let mut t = Duration::ZERO;
    while t < total {
        clock.advance(every);
        drive.run().unwrap();
        t += every;
    }
}

#[rstest]
#[case(100.0, 1000, 100)]
#[case(600.0, 1000, 600)]
#[case(600.0, 250, 150)]
#[case(50.0, 20, 1)]
fn service_period_does_not_change_travel(
    #[case] sps: f64,
    #[case] ms: u64,
    #[case] expected: i64,
) {
    for every_us in [50u64, 1_000, 20_000] {
        let clock = ManualClock::new();
        let mut drive = SimulatedStepper::new(Arc::new(clock.clone()));
        drive.move_to(10_000).unwrap();
        drive.set_speed(sps).unwrap();
        service_for(
            &clock,
            &mut drive,
            Duration::from_millis(ms),
            Duration::from_micros(every_us),
        );
        let pos = drive.current_position();
        assert!(
            (pos - expected).abs() <= 1,
            "sps={sps} every={every_us}us pos={pos} expected={expected}"
        );
    }
}

#[test]
fn probe_reports_wrapped_angle() {
    let clock = ManualClock::new();
    let drive = SimulatedStepper::new(Arc::new(clock)).with_position(-50);
    let probe: StepperProbe = drive.probe();
    // -50 of 200 steps is -90 degrees
    assert!((probe.angle_deg(200.0) - 270.0).abs() < 1e-9);
}

#[test]
fn set_current_position_clears_pending_motion() {
    let clock = ManualClock::new();
    let mut drive = SimulatedStepper::new(Arc::new(clock.clone()));
    drive.move_to(500).unwrap();
    drive.set_speed(100.0).unwrap();
    clock.advance(Duration::from_millis(100));
    drive.run().unwrap();
    drive.set_current_position(0).unwrap();
    assert_eq!(drive.distance_to_go(), 0);
    assert_eq!(drive.current_position(), 0);
}
