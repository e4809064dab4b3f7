//! Breath timing derivation: the phases always add up to the period, and
//! infeasible targets are reported instead of clamped.

use proptest::prelude::*;
use rstest::rstest;
use vent_core::{WaveformCalcError, WaveformDerived, WaveformTarget};

fn target(bpm: f64, ie_i: f64, ie_e: f64, plateau_ms: f64) -> WaveformTarget {
    WaveformTarget {
        breaths_per_minute: bpm,
        ie_inspiration: ie_i,
        ie_expiration: ie_e,
        plateau_time_ms: plateau_ms,
        ..WaveformTarget::default()
    }
}

proptest! {
    #[test]
    fn phases_sum_to_period(
        bpm in 4.0f64..40.0,
        ie_i in 0.2f64..4.0,
        ie_e in 0.2f64..4.0,
        plateau_ms in 0.0f64..500.0,
    ) {
        match WaveformDerived::compute(&target(bpm, ie_i, ie_e, plateau_ms)) {
            Ok(d) => {
                prop_assert!((d.period_s - 60.0 / bpm).abs() < 1e-9);
                prop_assert!((d.hold_in_s + d.expiration_s - d.period_s).abs() < 1e-9);
                prop_assert!(d.inspiration_s >= 0.0);
                prop_assert!(d.expiration_s >= 0.0);
                prop_assert!(d.inspiration_s <= d.hold_in_s);
            }
            Err(WaveformCalcError::NegativeDuration { inspiration_s, .. }) => {
                // only the plateau can eat the whole inspiration
                prop_assert!(inspiration_s < 0.0);
                let hold_in_s = ie_i * (60.0 / bpm) / (ie_i + ie_e);
                prop_assert!(plateau_ms / 1000.0 > hold_in_s);
            }
            Err(other) => prop_assert!(false, "unexpected error {other:?}"),
        }
    }

    #[test]
    fn ratio_splits_the_hold_in(bpm in 4.0f64..40.0, ie_i in 0.2f64..4.0, ie_e in 0.2f64..4.0) {
        let d = WaveformDerived::compute(&target(bpm, ie_i, ie_e, 0.0)).unwrap();
        let measured = d.hold_in_s / d.expiration_s;
        prop_assert!((measured - ie_i / ie_e).abs() < 1e-6);
    }
}

#[rstest]
#[case::plateau_longer_than_inspiration(30.0, 0.5, 4.0, 300.0)]
#[case::plateau_equal_to_period(10.0, 1.0, 1.0, 6_500.0)]
fn infeasible_timing_is_reported(
    #[case] bpm: f64,
    #[case] ie_i: f64,
    #[case] ie_e: f64,
    #[case] plateau_ms: f64,
) {
    let err = WaveformDerived::compute(&target(bpm, ie_i, ie_e, plateau_ms)).unwrap_err();
    assert!(
        matches!(err, WaveformCalcError::NegativeDuration { inspiration_s, .. } if inspiration_s < 0.0),
        "got {err:?}"
    );
}

#[rstest]
#[case(0.0, 1.0, 1.0)]
#[case(-8.0, 1.0, 1.0)]
#[case(f64::NAN, 1.0, 1.0)]
fn non_positive_rate_is_rejected(#[case] bpm: f64, #[case] ie_i: f64, #[case] ie_e: f64) {
    let err = WaveformDerived::compute(&target(bpm, ie_i, ie_e, 0.0)).unwrap_err();
    assert!(matches!(err, WaveformCalcError::NonPositiveRate(_)));
}

#[rstest]
#[case(0.0, 1.0)]
#[case(1.0, 0.0)]
#[case(1.0, -2.0)]
fn non_positive_ratio_is_rejected(#[case] ie_i: f64, #[case] ie_e: f64) {
    let err = WaveformDerived::compute(&target(12.0, ie_i, ie_e, 0.0)).unwrap_err();
    assert!(matches!(err, WaveformCalcError::NonPositiveRatio(..)));
}
