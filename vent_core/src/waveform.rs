//! Breath timing: derives phase durations from the operator targets, answers
//! "has this phase elapsed", and keeps the measured per-breath values.
use std::sync::Arc;
use std::time::{Duration, Instant};

use vent_traits::Clock;

use crate::error::WaveformCalcError;

/// Operator-set breath targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformTarget {
    pub breaths_per_minute: f64,
    pub tidal_volume_ml: f64,
    /// I:E ratio, inspiration term.
    pub ie_inspiration: f64,
    /// I:E ratio, expiration term.
    pub ie_expiration: f64,
    pub peep_cmh2o: f64,
    /// Peak inspiratory pressure limit.
    pub pip_cmh2o: f64,
    pub plateau_time_ms: f64,
}

impl Default for WaveformTarget {
    fn default() -> Self {
        Self {
            breaths_per_minute: 8.0,
            tidal_volume_ml: 1060.0,
            ie_inspiration: 1.0,
            ie_expiration: 1.0,
            peep_cmh2o: 5.0,
            pip_cmh2o: 40.0,
            plateau_time_ms: 100.0,
        }
    }
}

/// Which target a configuration command changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetField {
    BreathsPerMinute,
    TidalVolumeMl,
    IeInspiration,
    IeExpiration,
    PeepCmh2o,
    PipCmh2o,
    PlateauTimeMs,
}

impl WaveformTarget {
    pub fn set(&mut self, field: TargetField, value: f64) {
        match field {
            TargetField::BreathsPerMinute => self.breaths_per_minute = value,
            TargetField::TidalVolumeMl => self.tidal_volume_ml = value,
            TargetField::IeInspiration => self.ie_inspiration = value,
            TargetField::IeExpiration => self.ie_expiration = value,
            TargetField::PeepCmh2o => self.peep_cmh2o = value,
            TargetField::PipCmh2o => self.pip_cmh2o = value,
            TargetField::PlateauTimeMs => self.plateau_time_ms = value,
        }
    }

    pub fn get(&self, field: TargetField) -> f64 {
        match field {
            TargetField::BreathsPerMinute => self.breaths_per_minute,
            TargetField::TidalVolumeMl => self.tidal_volume_ml,
            TargetField::IeInspiration => self.ie_inspiration,
            TargetField::IeExpiration => self.ie_expiration,
            TargetField::PeepCmh2o => self.peep_cmh2o,
            TargetField::PipCmh2o => self.pip_cmh2o,
            TargetField::PlateauTimeMs => self.plateau_time_ms,
        }
    }
}

/// Phase durations for one breath, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WaveformDerived {
    pub period_s: f64,
    /// Inspiration including the plateau hold.
    pub hold_in_s: f64,
    /// Inspiration excluding the plateau hold.
    pub inspiration_s: f64,
    pub expiration_s: f64,
}

impl WaveformDerived {
    /// Derive the phase durations for `target`.
    ///
    /// Infeasible combinations are reported, never clamped.
    pub fn compute(target: &WaveformTarget) -> Result<Self, WaveformCalcError> {
        let bpm = target.breaths_per_minute;
        if !(bpm.is_finite() && bpm > 0.0) {
            return Err(WaveformCalcError::NonPositiveRate(bpm));
        }
        let (ie_i, ie_e) = (target.ie_inspiration, target.ie_expiration);
        if !(ie_i.is_finite() && ie_e.is_finite() && ie_i > 0.0 && ie_e > 0.0) {
            return Err(WaveformCalcError::NonPositiveRatio(ie_i, ie_e));
        }
        let period_s = 60.0 / bpm;
        let hold_in_s = ie_i * period_s / (ie_i + ie_e);
        let inspiration_s = hold_in_s - target.plateau_time_ms / 1000.0;
        let expiration_s = period_s - hold_in_s;
        if inspiration_s < 0.0 || expiration_s < 0.0 || !inspiration_s.is_finite() {
            return Err(WaveformCalcError::NegativeDuration {
                inspiration_s,
                expiration_s,
            });
        }
        Ok(Self {
            period_s,
            hold_in_s,
            inspiration_s,
            expiration_s,
        })
    }
}

/// Values observed during the last breaths.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WaveformMeasured {
    pub pip: f64,
    pub peep: f64,
    pub plateau_pressure: f64,
    pub respiration_rate: f64,
    pub ie_i: f64,
    pub ie_e: f64,
    pub tidal_volume_ml: f64,
}

/// Deadlines measured from the start of the current breath.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseDeadline {
    InspirationDone,
    HoldDone,
    ExpirationDone,
    PeepPauseDone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseBoundary {
    InspirationEnd,
    ExpirationEnd,
}

pub struct WaveformTimer {
    clock: Arc<dyn Clock + Send + Sync>,
    derived: WaveformDerived,
    measured: WaveformMeasured,
    cycle_start: Instant,
    inspiration_time_s: f64,
    expiration_time_s: f64,
    peak_pressure: f64,
    min_peep_pause: Duration,
}

impl core::fmt::Debug for WaveformTimer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WaveformTimer")
            .field("derived", &self.derived)
            .field("measured", &self.measured)
            .field("peak_pressure", &self.peak_pressure)
            .finish_non_exhaustive()
    }
}

impl WaveformTimer {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>, min_peep_pause: Duration) -> Self {
        let cycle_start = clock.now();
        Self {
            clock,
            derived: WaveformDerived::default(),
            measured: WaveformMeasured::default(),
            cycle_start,
            inspiration_time_s: 0.0,
            expiration_time_s: 0.0,
            peak_pressure: 0.0,
            min_peep_pause,
        }
    }

    /// Start a new breath: derive its timing and restart the cycle clock.
    ///
    /// On failure the previous timing and cycle start are left untouched.
    pub fn recalculate(
        &mut self,
        target: &WaveformTarget,
    ) -> Result<WaveformDerived, WaveformCalcError> {
        let derived = WaveformDerived::compute(target)?;
        self.derived = derived;
        self.cycle_start = self.clock.now();
        tracing::trace!(
            period_s = derived.period_s,
            inspiration_s = derived.inspiration_s,
            expiration_s = derived.expiration_s,
            "breath timing"
        );
        Ok(derived)
    }

    pub fn derived(&self) -> &WaveformDerived {
        &self.derived
    }

    pub fn measured(&self) -> &WaveformMeasured {
        &self.measured
    }

    pub fn measured_mut(&mut self) -> &mut WaveformMeasured {
        &mut self.measured
    }

    /// Seconds since the current breath started.
    pub fn elapsed_s(&self) -> f64 {
        self.clock.secs_since(self.cycle_start)
    }

    fn deadline_s(&self, kind: PhaseDeadline) -> f64 {
        match kind {
            PhaseDeadline::InspirationDone => self.derived.inspiration_s,
            PhaseDeadline::HoldDone => self.derived.hold_in_s,
            PhaseDeadline::ExpirationDone => self.derived.period_s,
            PhaseDeadline::PeepPauseDone => {
                self.derived.expiration_s + self.min_peep_pause.as_secs_f64()
            }
        }
    }

    /// True once strictly more than the deadline has passed since the breath started.
    pub fn phase_elapsed(&self, kind: PhaseDeadline) -> bool {
        self.elapsed_s() > self.deadline_s(kind)
    }

    /// Feed one pressure sample into the running peak.
    pub fn record_peak_pressure(&mut self, sample: f64) {
        if sample > self.peak_pressure {
            self.peak_pressure = sample;
        }
    }

    pub fn current_peak(&self) -> f64 {
        self.peak_pressure
    }

    /// Commit the running peak as this breath's PIP and start a fresh one.
    pub fn latch_and_reset_peak(&mut self) -> f64 {
        self.measured.pip = self.peak_pressure;
        self.peak_pressure = 0.0;
        self.measured.pip
    }

    pub fn mark_phase_boundary(&mut self, kind: PhaseBoundary, now: Instant) {
        let since_start = now.saturating_duration_since(self.cycle_start).as_secs_f64();
        match kind {
            PhaseBoundary::InspirationEnd => self.inspiration_time_s = since_start,
            PhaseBoundary::ExpirationEnd => {
                self.expiration_time_s = (since_start - self.inspiration_time_s).max(0.0);
            }
        }
    }

    pub fn inspiration_time_s(&self) -> f64 {
        self.inspiration_time_s
    }

    pub fn expiration_time_s(&self) -> f64 {
        self.expiration_time_s
    }

    /// Respiration rate from the breath just finished and the measured I:E,
    /// with the longer side normalised to 1.
    pub fn derive_measured_ie_and_rr(&mut self) {
        let cycle_s = self.elapsed_s();
        if cycle_s > 0.0 {
            self.measured.respiration_rate = 60.0 / cycle_s;
        }
        let (i, e) = (self.inspiration_time_s, self.expiration_time_s);
        if i <= 0.0 || e <= 0.0 {
            return;
        }
        if i >= e {
            self.measured.ie_i = 1.0;
            self.measured.ie_e = e / i;
        } else {
            self.measured.ie_i = i / e;
            self.measured.ie_e = 1.0;
        }
    }

    pub fn reset_measured(&mut self) {
        self.measured = WaveformMeasured::default();
        self.peak_pressure = 0.0;
        self.inspiration_time_s = 0.0;
        self.expiration_time_s = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vent_traits::ManualClock;

    fn timer() -> (ManualClock, WaveformTimer) {
        let clock = ManualClock::new();
        let t = WaveformTimer::new(Arc::new(clock.clone()), Duration::from_millis(50));
        (clock, t)
    }

    #[test]
    fn default_target_timing() {
        let d = WaveformDerived::compute(&WaveformTarget::default()).unwrap();
        assert!((d.period_s - 7.5).abs() < 1e-12);
        assert!((d.hold_in_s - 3.75).abs() < 1e-12);
        assert!((d.inspiration_s - 3.65).abs() < 1e-12);
        assert!((d.expiration_s - 3.75).abs() < 1e-12);
    }

    #[test]
    fn deadlines_are_strict() {
        let (clock, mut t) = timer();
        let target = WaveformTarget {
            breaths_per_minute: 30.0,
            plateau_time_ms: 0.0,
            ..WaveformTarget::default()
        };
        t.recalculate(&target).unwrap();
        clock.advance(Duration::from_secs(1));
        // exactly at the 1 s inspiration deadline: not yet
        assert!(!t.phase_elapsed(PhaseDeadline::InspirationDone));
        clock.advance(Duration::from_millis(1));
        assert!(t.phase_elapsed(PhaseDeadline::InspirationDone));
        assert!(t.phase_elapsed(PhaseDeadline::HoldDone));
        assert!(!t.phase_elapsed(PhaseDeadline::PeepPauseDone));
        clock.advance(Duration::from_millis(50));
        assert!(t.phase_elapsed(PhaseDeadline::PeepPauseDone));
        assert!(!t.phase_elapsed(PhaseDeadline::ExpirationDone));
    }

    #[test]
    fn failed_recalculate_keeps_previous_cycle() {
        let (clock, mut t) = timer();
        t.recalculate(&WaveformTarget::default()).unwrap();
        clock.advance(Duration::from_secs(2));
        let bad = WaveformTarget {
            breaths_per_minute: 0.0,
            ..WaveformTarget::default()
        };
        assert!(t.recalculate(&bad).is_err());
        assert!((t.elapsed_s() - 2.0).abs() < 1e-9);
        assert!((t.derived().period_s - 7.5).abs() < 1e-12);
    }

    #[test]
    fn peak_latches_once_per_breath() {
        let (_clock, mut t) = timer();
        for p in [3.0, 18.5, 12.0] {
            t.record_peak_pressure(p);
        }
        assert_eq!(t.latch_and_reset_peak(), 18.5);
        assert_eq!(t.current_peak(), 0.0);
        assert_eq!(t.measured().pip, 18.5);
    }

    #[test]
    fn measured_ie_normalises_longer_side() {
        let (clock, mut t) = timer();
        t.recalculate(&WaveformTarget::default()).unwrap();
        let start = clock.now();
        t.mark_phase_boundary(PhaseBoundary::InspirationEnd, start + Duration::from_secs(2));
        t.mark_phase_boundary(PhaseBoundary::ExpirationEnd, start + Duration::from_secs(6));
        clock.advance(Duration::from_secs(6));
        t.derive_measured_ie_and_rr();
        let m = t.measured();
        assert!((m.respiration_rate - 10.0).abs() < 1e-9);
        assert!((m.ie_i - 0.5).abs() < 1e-9);
        assert!((m.ie_e - 1.0).abs() < 1e-9);
        assert!((t.expiration_time_s() - 4.0).abs() < 1e-9);
    }
}
