use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rstest::{fixture, rstest};
use vent_core::{AlarmCfg, AlarmId, AlarmLevel, AlarmManager};
use vent_traits::ManualClock;

#[fixture]
fn clock() -> ManualClock {
    ManualClock::new()
}

fn manager(clock: &ManualClock) -> AlarmManager {
    AlarmManager::new(Arc::new(clock.clone()), &AlarmCfg::default())
}

#[rstest]
fn repeated_sequence_counts_once(clock: ManualClock) {
    let mut m = manager(&clock);
    // two bad breaths needed
    m.set_condition(AlarmId::NoTidalPressure, true, 5);
    m.set_condition(AlarmId::NoTidalPressure, true, 5);
    m.set_condition(AlarmId::NoTidalPressure, true, 5);
    assert!(!m.is_on(AlarmId::NoTidalPressure));
    assert_eq!(m.condition(AlarmId::NoTidalPressure).consecutive_bad(), 1);

    m.set_condition(AlarmId::NoTidalPressure, true, 6);
    assert!(m.is_on(AlarmId::NoTidalPressure));
}

#[rstest]
fn clearing_needs_distinct_good_sequences(clock: ManualClock) {
    let mut m = manager(&clock);
    assert!(m.set_condition(AlarmId::HighPressure, true, 1));
    assert!(m.set_condition(AlarmId::HighPressure, false, 2));
    assert!(m.set_condition(AlarmId::HighPressure, false, 2));
    assert!(!m.set_condition(AlarmId::HighPressure, false, 3));
}

#[rstest]
fn display_rotates_through_active_alarms(clock: ManualClock) {
    let mut m = manager(&clock);
    assert_eq!(m.display_text(0), None);
    m.set_condition(AlarmId::HighPressure, true, 1);
    m.set_condition(AlarmId::LowPressure, true, 1);

    assert_eq!(m.display_text(0), Some("HIGH PRESSURE"));
    assert_eq!(m.display_text(1_999), Some("HIGH PRESSURE"));
    assert_eq!(m.display_text(2_000), Some("LOW PRES DISCONNECT"));
    assert_eq!(m.display_text(4_000), Some("HIGH PRESSURE"));
}

#[rstest]
fn snooze_silences_audio_until_it_runs_out(clock: ManualClock) {
    let mut m = manager(&clock);
    let fired = Arc::new(AtomicUsize::new(0));
    let f = Arc::clone(&fired);
    m.on_snooze_complete(move || {
        f.fetch_add(1, Ordering::SeqCst);
    });

    m.set_condition(AlarmId::UnmetVolume, true, 1);
    assert_eq!(m.audible_level(), Some(AlarmLevel::Emergency));

    m.snooze();
    assert!(m.is_snoozed());
    assert_eq!(m.audible_level(), None);
    // the display keeps showing the alarm while snoozed
    assert_eq!(m.display_text(0), Some("UNMET TIDAL VOLUME"));

    clock.advance(Duration::from_secs(29));
    m.update();
    assert!(m.is_snoozed());
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    clock.advance(Duration::from_secs(1));
    m.update();
    assert!(!m.is_snoozed());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(m.audible_level(), Some(AlarmLevel::Emergency));

    // expired snooze does not fire again
    m.update();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[rstest]
fn toggle_flips_snooze(clock: ManualClock) {
    let mut m = manager(&clock);
    assert!(m.toggle_snooze());
    assert!(!m.toggle_snooze());
    assert!(!m.is_snoozed());
}

#[rstest]
#[case(AlarmId::HighPressure, "HIGH PRESSURE", AlarmLevel::Emergency)]
#[case(AlarmId::BadPlateau, "HIGH RESIST PRESSURE", AlarmLevel::Notify)]
#[case(AlarmId::OverCurrent, "OVER CURRENT FAULT", AlarmLevel::Emergency)]
#[case(AlarmId::TurningOff, "TURNING OFF", AlarmLevel::Off)]
fn alarm_table(
    clock: ManualClock,
    #[case] id: AlarmId,
    #[case] label: &str,
    #[case] level: AlarmLevel,
) {
    let m = manager(&clock);
    let c = m.condition(id);
    assert_eq!(c.label, label);
    assert_eq!(c.level, level);
}
