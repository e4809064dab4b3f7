//! Type-state builder for `Ventilator`.
//!
//! `build()` only exists once both the actuator and the gauge sensor have
//! been supplied; configuration, clock and targets fall back to defaults.
use std::sync::Arc;

use vent_traits::{Clock, MonotonicClock, PositionSource, PressureAdc, StepperDrive};

use crate::actuator::Actuator;
use crate::config::{ActuatorCfg, VentCfg};
use crate::error::{BuildError, Result};
use crate::machine::Ventilator;
use crate::pressure::PressureSensor;
use crate::waveform::WaveformTarget;

/// Marker for a part not yet supplied.
#[derive(Debug, Default)]
pub struct Missing;

pub struct VentilatorBuilder<A, G> {
    actuator: A,
    gauge: G,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    cfg: VentCfg,
    target: WaveformTarget,
}

impl Default for VentilatorBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            actuator: Missing,
            gauge: Missing,
            clock: None,
            cfg: VentCfg::default(),
            target: WaveformTarget::default(),
        }
    }
}

impl VentilatorBuilder<Missing, Missing> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<A, G> VentilatorBuilder<A, G> {
    pub fn with_config(mut self, cfg: VentCfg) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn with_target(mut self, target: WaveformTarget) -> Self {
        self.target = target;
        self
    }

    /// Clock shared by the breath timer and the alarm snooze; defaults to
    /// `MonotonicClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

impl<G> VentilatorBuilder<Missing, G> {
    pub fn with_actuator<D: StepperDrive, P: PositionSource>(
        self,
        actuator: Actuator<D, P>,
    ) -> VentilatorBuilder<Actuator<D, P>, G> {
        VentilatorBuilder {
            actuator,
            gauge: self.gauge,
            clock: self.clock,
            cfg: self.cfg,
            target: self.target,
        }
    }
}

impl<A> VentilatorBuilder<A, Missing> {
    pub fn with_gauge<S: PressureAdc>(
        self,
        gauge: PressureSensor<S>,
    ) -> VentilatorBuilder<A, PressureSensor<S>> {
        VentilatorBuilder {
            actuator: self.actuator,
            gauge,
            clock: self.clock,
            cfg: self.cfg,
            target: self.target,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate(cfg: &VentCfg, a: &ActuatorCfg, target: &WaveformTarget) -> Result<()> {
    let t = &cfg.timing;
    if t.tick.is_zero() {
        return Err(invalid("tick must be > 0"));
    }
    if t.step_period.is_zero() || t.step_period >= t.tick {
        return Err(invalid("step period must be > 0 and shorter than the tick"));
    }
    if !(a.steps_per_rev.is_finite() && a.steps_per_rev > 0.0) {
        return Err(invalid("steps_per_rev must be > 0"));
    }
    if !(a.max_steps_per_sec > 0.0 && a.homing_steps_per_sec > 0.0) {
        return Err(invalid("step rates must be > 0"));
    }
    let homing_steps_per_tick = (a.homing_steps_per_sec * t.tick.as_secs_f64()).floor();
    if homing_steps_per_tick * 360.0 / a.steps_per_rev <= a.stall_min_move_deg {
        return Err(invalid(
            "homing speed must move the paddle past the stall threshold every tick",
        ));
    }
    if !(a.min_pos_deg < a.max_pos_deg) {
        return Err(invalid("actuator travel must have min < max"));
    }
    if !(a.home_min_deg < a.home_max_deg && a.home_max_deg < a.home_correction_max_deg) {
        return Err(invalid("home window must lie below the correction band"));
    }
    if !(a.min_bag_volume_l > 0.0 && a.min_bag_volume_l < a.max_bag_volume_l) {
        return Err(invalid("bag volume range must satisfy 0 < min < max"));
    }
    if cfg.alarms.display_time.is_zero() {
        return Err(invalid("alarm display time must be > 0"));
    }
    let fields = [
        target.breaths_per_minute,
        target.tidal_volume_ml,
        target.ie_inspiration,
        target.ie_expiration,
        target.peep_cmh2o,
        target.pip_cmh2o,
        target.plateau_time_ms,
    ];
    if fields.iter().any(|v| !v.is_finite()) {
        return Err(eyre::Report::new(BuildError::InvalidTarget(
            "targets must be finite",
        )));
    }
    if target.breaths_per_minute <= 0.0 {
        return Err(eyre::Report::new(BuildError::InvalidTarget(
            "breaths per minute must be > 0",
        )));
    }
    Ok(())
}

impl<D, P, S> VentilatorBuilder<Actuator<D, P>, PressureSensor<S>>
where
    D: StepperDrive,
    P: PositionSource,
    S: PressureAdc,
{
    pub fn build(self) -> Result<Ventilator<D, P, S>> {
        validate(&self.cfg, self.actuator.cfg(), &self.target)?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        Ok(Ventilator::from_parts(
            self.actuator,
            self.gauge,
            clock,
            &self.cfg,
            self.target,
        ))
    }
}
