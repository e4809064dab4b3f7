#![no_main]
use libfuzzer_sys::arbitrary::{self, Arbitrary};
use libfuzzer_sys::fuzz_target;
use vent_core::{WaveformDerived, WaveformTarget};

#[derive(Debug, Arbitrary)]
struct Input {
    bpm: f64,
    vt: f64,
    ie_i: f64,
    ie_e: f64,
    peep: f64,
    pip: f64,
    plateau_ms: f64,
}

fuzz_target!(|i: Input| {
    let target = WaveformTarget {
        breaths_per_minute: i.bpm,
        tidal_volume_ml: i.vt,
        ie_inspiration: i.ie_i,
        ie_expiration: i.ie_e,
        peep_cmh2o: i.peep,
        pip_cmh2o: i.pip,
        plateau_time_ms: i.plateau_ms,
    };
    if let Ok(d) = WaveformDerived::compute(&target) {
        assert!(d.period_s.is_finite() && d.period_s > 0.0);
        assert!(d.inspiration_s >= 0.0 && d.expiration_s >= 0.0);
    }
});
