//! Host-side stand-ins for the ventilator's hardware.
//!
//! All models run off a shared [`Clock`], so with a `ManualClock` a whole
//! breath can be simulated deterministically in microseconds.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};
use std::time::{Duration, Instant};

use vent_traits::{AngleEncoder, Clock, HwResult, PressureAdc, StepperDrive};

use crate::error::HwError;

/// Observer handle onto a [`SimulatedStepper`]; also lets tests jam the
/// mechanism.
#[derive(Debug, Clone, Default)]
pub struct StepperProbe {
    position: Arc<AtomicI64>,
    /// Physical shaft minus the step counter; moves when the counter is re-referenced.
    shaft_offset: Arc<AtomicI64>,
    stalled: Arc<AtomicBool>,
}

impl StepperProbe {
    /// The drive's step counter.
    pub fn position(&self) -> i64 {
        self.position.load(Ordering::Relaxed)
    }

    /// Physical shaft position in steps. Unlike the counter it is not
    /// affected by `set_current_position`.
    pub fn shaft_steps(&self) -> i64 {
        self.position() + self.shaft_offset.load(Ordering::Relaxed)
    }

    /// Shaft angle in `[0, 360)` for a drive with `steps_per_rev` steps per output turn.
    pub fn angle_deg(&self, steps_per_rev: f64) -> f64 {
        let turns = self.shaft_steps() as f64 / steps_per_rev;
        (turns * 360.0).rem_euclid(360.0)
    }

    /// Jam (true) or free (false) the mechanism.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::Relaxed);
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::Relaxed)
    }
}

/// Constant-speed stepper that emits every step that became due since the
/// last service call, so coarse service periods still track real time.
pub struct SimulatedStepper {
    clock: Arc<dyn Clock + Send + Sync>,
    probe: StepperProbe,
    target: i64,
    speed: f64,
    enabled: bool,
    last_step_at: Instant,
}

impl SimulatedStepper {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let last_step_at = clock.now();
        Self {
            clock,
            probe: StepperProbe::default(),
            target: 0,
            speed: 0.0,
            enabled: true,
            last_step_at,
        }
    }

    /// Start at `steps` instead of 0 (e.g. a paddle left mid-stroke).
    pub fn with_position(self, steps: i64) -> Self {
        self.probe.position.store(steps, Ordering::Relaxed);
        Self {
            target: steps,
            ..self
        }
    }

    pub fn probe(&self) -> StepperProbe {
        self.probe.clone()
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn target(&self) -> i64 {
        self.target
    }

    fn restart_if_idle(&mut self) {
        if self.distance_to_go() == 0 {
            self.last_step_at = self.clock.now();
        }
    }
}

impl StepperDrive for SimulatedStepper {
    fn move_to(&mut self, absolute_steps: i64) -> HwResult<()> {
        self.restart_if_idle();
        self.target = absolute_steps;
        Ok(())
    }

    fn move_by(&mut self, relative_steps: i64) -> HwResult<()> {
        self.restart_if_idle();
        self.target = self.probe.position().saturating_add(relative_steps);
        Ok(())
    }

    fn set_speed(&mut self, steps_per_sec: f64) -> HwResult<()> {
        self.speed = if steps_per_sec.is_finite() {
            steps_per_sec.abs()
        } else {
            0.0
        };
        self.last_step_at = self.clock.now();
        Ok(())
    }

    fn set_current_position(&mut self, steps: i64) -> HwResult<()> {
        let old = self.probe.position.swap(steps, Ordering::Relaxed);
        self.probe
            .shaft_offset
            .fetch_add(old - steps, Ordering::Relaxed);
        self.target = steps;
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> HwResult<()> {
        self.enabled = enabled;
        Ok(())
    }

    fn current_position(&self) -> i64 {
        self.probe.position()
    }

    fn distance_to_go(&self) -> i64 {
        self.target - self.probe.position()
    }

    fn run(&mut self) -> HwResult<bool> {
        let now = self.clock.now();
        let dist = self.distance_to_go();
        if dist == 0 {
            self.last_step_at = now;
            return Ok(false);
        }
        if !self.enabled || self.speed <= 0.0 || self.probe.is_stalled() {
            self.last_step_at = now;
            return Ok(true);
        }
        let elapsed = now.saturating_duration_since(self.last_step_at).as_secs_f64();
        let due = (elapsed * self.speed + 1e-9).floor();
        if due < 1.0 {
            return Ok(true);
        }
        let n = (due as i64).min(dist.abs());
        self.probe
            .position
            .fetch_add(n * dist.signum(), Ordering::Relaxed);
        if n == dist.abs() {
            self.last_step_at = now;
            return Ok(false);
        }
        self.last_step_at += Duration::from_secs_f64(n as f64 / self.speed);
        Ok(true)
    }
}

/// 14-bit absolute encoder riding on a simulated stepper's shaft.
pub struct SimulatedEncoder {
    probe: StepperProbe,
    steps_per_rev: f64,
    mount_offset: u16,
    zero: u16,
}

impl SimulatedEncoder {
    /// `mount_offset` is the raw reading when the drive is at step 0.
    pub fn new(probe: StepperProbe, steps_per_rev: f64, mount_offset: u16) -> Self {
        Self {
            probe,
            steps_per_rev,
            mount_offset,
            zero: 0,
        }
    }

    pub fn zero(&self) -> u16 {
        self.zero
    }
}

impl AngleEncoder for SimulatedEncoder {
    fn read_absolute_raw(&mut self) -> HwResult<u16> {
        let cpr = i64::from(self.counts_per_rev());
        let shaft = (self.probe.shaft_steps() as f64 / self.steps_per_rev * cpr as f64).round() as i64;
        let raw = (i64::from(self.mount_offset) + shaft).rem_euclid(cpr);
        Ok(u16::try_from(raw).map_err(|_| HwError::Disconnected)?)
    }

    fn read_angle_raw(&mut self) -> HwResult<u16> {
        let cpr = i64::from(self.counts_per_rev());
        let abs = i64::from(self.read_absolute_raw()?);
        let rel = (abs - i64::from(self.zero)).rem_euclid(cpr);
        Ok(u16::try_from(rel).map_err(|_| HwError::Disconnected)?)
    }

    fn write_zero(&mut self, zero: u16) -> HwResult<()> {
        self.zero = zero % self.counts_per_rev();
        Ok(())
    }
}

/// Electrical front end between a ratiometric transducer and the ADC:
/// transducer output spans 10%..90% of supply, then a resistor divider.
#[derive(Debug, Clone, Copy)]
pub struct FrontEnd {
    pub adc_bits: u8,
    pub adc_ref_v: f64,
    pub supply_v: f64,
    pub r1_ohm: f64,
    pub r2_ohm: f64,
    pub max_psi: f64,
    pub min_psi: f64,
}

impl FrontEnd {
    /// Gauge transducer rated 0..1 psi on the stock divider.
    pub const fn gauge() -> Self {
        Self {
            adc_bits: 12,
            adc_ref_v: 3.3,
            supply_v: 5.0,
            r1_ohm: 100_000.0,
            r2_ohm: 196_000.0,
            max_psi: 1.0,
            min_psi: 0.0,
        }
    }

    /// Differential transducer rated ±`span_psi`.
    pub const fn differential(span_psi: f64) -> Self {
        Self {
            max_psi: span_psi,
            min_psi: -span_psi,
            ..Self::gauge()
        }
    }

    pub fn full_scale(&self) -> i32 {
        1_i32 << self.adc_bits
    }

    /// Raw counts the ADC would report for `psi`.
    pub fn counts_for_psi(&self, psi: f64) -> i32 {
        let span = self.max_psi - self.min_psi;
        let v_out = (0.8 * (psi - self.min_psi) / span + 0.1) * self.supply_v;
        let v_adc = v_out * self.r2_ohm / (self.r1_ohm + self.r2_ohm);
        let counts = (v_adc / self.adc_ref_v * f64::from(self.full_scale())).round() as i32;
        counts.clamp(0, self.full_scale() - 1)
    }
}

/// Settable ADC. Tests and demos push raw counts through [`AdcHandle`].
#[derive(Debug, Clone, Default)]
pub struct SimulatedAdc {
    raw: Arc<AtomicI32>,
    failing: Arc<AtomicBool>,
}

/// Write side of a [`SimulatedAdc`].
#[derive(Debug, Clone)]
pub struct AdcHandle {
    raw: Arc<AtomicI32>,
    failing: Arc<AtomicBool>,
}

impl SimulatedAdc {
    pub fn new(raw: i32) -> Self {
        Self {
            raw: Arc::new(AtomicI32::new(raw)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn handle(&self) -> AdcHandle {
        AdcHandle {
            raw: self.raw.clone(),
            failing: self.failing.clone(),
        }
    }
}

impl AdcHandle {
    pub fn set_raw(&self, raw: i32) {
        self.raw.store(raw, Ordering::Relaxed);
    }

    /// Make subsequent reads fail (true) or succeed again (false).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

impl PressureAdc for SimulatedAdc {
    fn read_raw(&mut self) -> HwResult<i32> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(Box::new(HwError::Disconnected));
        }
        Ok(self.raw.load(Ordering::Relaxed))
    }
}

/// Airway pressure model: baseline PEEP plus a rise proportional to paddle
/// travel, measured by a gauge transducer.
#[derive(Debug, Clone)]
pub struct SimulatedLung {
    probe: StepperProbe,
    steps_per_rev: f64,
    front_end: FrontEnd,
    /// Pressure with the paddle at rest (cmH2O).
    pub baseline_cmh2o: f64,
    /// Additional pressure at `full_stroke_deg` (cmH2O).
    pub stroke_cmh2o: f64,
    pub full_stroke_deg: f64,
    disconnected: Arc<AtomicBool>,
}

/// cmH2O per psi.
const CMH2O_PER_PSI: f64 = 70.307;

impl SimulatedLung {
    pub fn new(probe: StepperProbe, steps_per_rev: f64) -> Self {
        Self {
            probe,
            steps_per_rev,
            front_end: FrontEnd::gauge(),
            baseline_cmh2o: 5.0,
            stroke_cmh2o: 25.0,
            full_stroke_deg: 180.0,
            disconnected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that toggles a circuit disconnect (airway pressure drops to 0).
    pub fn disconnect_switch(&self) -> Arc<AtomicBool> {
        self.disconnected.clone()
    }

    pub fn pressure_cmh2o(&self) -> f64 {
        if self.disconnected.load(Ordering::Relaxed) {
            return 0.0;
        }
        let mut angle = self.probe.angle_deg(self.steps_per_rev);
        if angle > 270.0 {
            // just behind home
            angle = 0.0;
        }
        let travel = (angle / self.full_stroke_deg).clamp(0.0, 1.0);
        self.baseline_cmh2o + self.stroke_cmh2o * travel
    }
}

impl PressureAdc for SimulatedLung {
    fn read_raw(&mut self) -> HwResult<i32> {
        let psi = self.pressure_cmh2o() / CMH2O_PER_PSI;
        Ok(self.front_end.counts_for_psi(psi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vent_traits::ManualClock;

    fn stepper() -> (ManualClock, SimulatedStepper) {
        let clock = ManualClock::new();
        let s = SimulatedStepper::new(Arc::new(clock.clone()));
        (clock, s)
    }

    #[test]
    fn steps_at_commanded_rate() {
        let (clock, mut s) = stepper();
        s.move_to(100).unwrap();
        s.set_speed(100.0).unwrap();
        clock.advance(Duration::from_millis(500));
        assert!(s.run().unwrap());
        assert_eq!(s.current_position(), 50);
        clock.advance(Duration::from_secs(2));
        assert!(!s.run().unwrap());
        assert_eq!(s.current_position(), 100);
        assert_eq!(s.distance_to_go(), 0);
    }

    #[test]
    fn moves_backwards_toward_target() {
        let (clock, s) = stepper();
        let mut s = s.with_position(40);
        s.move_by(-40).unwrap();
        s.set_speed(-200.0).unwrap();
        clock.advance(Duration::from_millis(100));
        s.run().unwrap();
        assert_eq!(s.current_position(), 20);
    }

    #[test]
    fn stalled_or_disabled_drive_does_not_move() {
        let (clock, mut s) = stepper();
        s.move_to(10).unwrap();
        s.set_speed(100.0).unwrap();
        s.probe().set_stalled(true);
        clock.advance(Duration::from_secs(1));
        assert!(s.run().unwrap());
        assert_eq!(s.current_position(), 0);

        s.probe().set_stalled(false);
        s.set_enabled(false).unwrap();
        clock.advance(Duration::from_secs(1));
        s.run().unwrap();
        assert_eq!(s.current_position(), 0);
    }

    #[test]
    fn encoder_follows_shaft_and_zero_register() {
        let (_clock, s) = stepper();
        let mut s = s.with_position(50);
        let mut enc = SimulatedEncoder::new(s.probe(), 200.0, 100);
        let abs = enc.read_absolute_raw().unwrap();
        assert_eq!(abs, 100 + 4096);
        enc.write_zero(abs).unwrap();
        assert_eq!(enc.read_angle_raw().unwrap(), 0);
        // re-referencing the counter leaves the shaft where it is
        s.set_current_position(0).unwrap();
        assert_eq!(enc.read_absolute_raw().unwrap(), abs);
    }

    #[test]
    fn front_end_round_numbers() {
        let fe = FrontEnd::gauge();
        // 0 psi sits at 10% of supply, divided down
        let zero = fe.counts_for_psi(0.0);
        assert!((405..=415).contains(&zero), "zero counts {zero}");
        assert!(fe.counts_for_psi(1.0) > fe.counts_for_psi(0.5));
        let diff = FrontEnd::differential(0.07);
        let mid = diff.counts_for_psi(0.0);
        assert!((2040..=2070).contains(&mid), "mid counts {mid}");
    }

    #[test]
    fn lung_pressure_tracks_paddle() {
        let (_clock, s) = stepper();
        let s = s.with_position(100);
        let lung = SimulatedLung::new(s.probe(), 200.0);
        // 100 of 200 steps = 180 degrees = full stroke
        assert!((lung.pressure_cmh2o() - 30.0).abs() < 1e-9);
        lung.disconnect_switch().store(true, Ordering::Relaxed);
        assert_eq!(lung.pressure_cmh2o(), 0.0);
    }

    #[test]
    fn adc_handle_sets_and_fails_reads() {
        let mut adc = SimulatedAdc::new(7);
        let h = adc.handle();
        assert_eq!(adc.read_raw().unwrap(), 7);
        h.set_raw(9);
        assert_eq!(adc.read_raw().unwrap(), 9);
        h.set_failing(true);
        assert!(adc.read_raw().is_err());
    }
}
