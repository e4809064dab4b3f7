//! Breath-cycle state machine.
//!
//! `Ventilator::tick` is the whole control step: it is called on a fixed
//! period and never blocks. Each tick evaluates alarms from what the previous
//! tick observed, samples the gauge, runs the handler of the current phase and
//! applies the `PhaseTransition` it returns. Phase changes happen nowhere else
//! except through the explicit external operations on this type.
use std::sync::Arc;
use std::time::Instant;

use vent_traits::{Clock, PositionSource, PressureAdc, StepperDrive};

use crate::actuator::{Actuator, Compliance, HomeCorrection};
use crate::alarm::{AlarmId, AlarmManager};
use crate::config::{AlarmCfg, VentCfg};
use crate::error::{FaultCode, VentError};
use crate::phase::{BreathPhase, PhaseTransition};
use crate::pressure::{PressureSensor, PressureUnit};
use crate::status::{AlarmDiag, Diagnostics, LiveStatus, Snapshot, TickReport};
use crate::util::ticks_for;
use crate::waveform::{
    PhaseBoundary, PhaseDeadline, TargetField, WaveformTarget, WaveformTimer,
};

/// Nudges tried at inspiration entry before falling back to a full homing.
const MAX_ENTRY_CORRECTIONS: u32 = 20;
/// Nudges tried while homing before the homing counts as failed.
const MAX_HOME_CORRECTIONS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingStage {
    /// Full-revolution sweep toward the home window.
    Seeking,
    /// Close to home; stepping toward it with small nudges.
    Correcting { attempts: u32 },
}

/// Per-breath observations waiting for the next tick's alarm evaluation.
#[derive(Debug, Clone, Copy)]
enum PendingCheck {
    InspirationEnd { peak: f64, delivered_ml: f64, seq: u64 },
    HoldEnd { peak: f64, plateau: f64, seq: u64 },
    PeepEnd { pip: f64, peep: f64, seq: u64 },
}

pub struct Ventilator<D: StepperDrive, P: PositionSource, G: PressureAdc> {
    phase: BreathPhase,
    entry_pending: bool,
    phase_ticks: u32,
    tick_count: u64,
    cycle_count: u64,
    fault: Option<FaultCode>,
    force_actuator_fault: bool,
    resume_inspiration: bool,
    entry_corrections: u32,
    homing: HomingStage,

    target: WaveformTarget,
    compliance: Compliance,
    actuator: Actuator<D, P>,
    waveform: WaveformTimer,
    gauge: PressureSensor<G>,
    alarms: AlarmManager,
    alarm_cfg: AlarmCfg,

    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    startup_ticks: u32,
    stall_check_ticks: u32,
    homing_timeout_ticks: u32,

    last_pressure: Option<f64>,
    sensor_ok: bool,
    pending: Vec<PendingCheck>,
    live: Arc<LiveStatus>,
}

impl<D: StepperDrive, P: PositionSource, G: PressureAdc> core::fmt::Debug
    for Ventilator<D, P, G>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Ventilator")
            .field("phase", &self.phase)
            .field("cycle_count", &self.cycle_count)
            .field("fault", &self.fault)
            .field("target", &self.target)
            .field("last_pressure", &self.last_pressure)
            .finish_non_exhaustive()
    }
}

impl<D: StepperDrive, P: PositionSource, G: PressureAdc> Ventilator<D, P, G> {
    pub(crate) fn from_parts(
        actuator: Actuator<D, P>,
        gauge: PressureSensor<G>,
        clock: Arc<dyn Clock + Send + Sync>,
        cfg: &VentCfg,
        target: WaveformTarget,
    ) -> Self {
        let t = &cfg.timing;
        let epoch = clock.now();
        let live = Arc::new(LiveStatus::default());
        live.publish(BreathPhase::Startup, 0, None);
        Self {
            phase: BreathPhase::Startup,
            entry_pending: true,
            phase_ticks: 0,
            tick_count: 0,
            cycle_count: 0,
            fault: None,
            force_actuator_fault: false,
            resume_inspiration: false,
            entry_corrections: 0,
            homing: HomingStage::Seeking,
            target,
            compliance: cfg.compliance,
            actuator,
            waveform: WaveformTimer::new(Arc::clone(&clock), t.min_peep_pause),
            gauge,
            alarms: AlarmManager::new(Arc::clone(&clock), &cfg.alarms),
            alarm_cfg: cfg.alarms.clone(),
            clock,
            epoch,
            startup_ticks: ticks_for(t.startup, t.tick),
            stall_check_ticks: ticks_for(t.stall_check, t.tick),
            homing_timeout_ticks: ticks_for(t.homing_timeout, t.tick),
            last_pressure: None,
            sensor_ok: true,
            pending: Vec::with_capacity(4),
            live,
        }
    }

    // ── accessors ────────────────────────────────────────────────────────────

    pub fn phase(&self) -> BreathPhase {
        self.phase
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn fault(&self) -> Option<FaultCode> {
        self.fault
    }

    pub fn target(&self) -> &WaveformTarget {
        &self.target
    }

    pub fn waveform(&self) -> &WaveformTimer {
        &self.waveform
    }

    pub fn alarms(&self) -> &AlarmManager {
        &self.alarms
    }

    pub fn alarms_mut(&mut self) -> &mut AlarmManager {
        &mut self.alarms
    }

    pub fn actuator(&self) -> &Actuator<D, P> {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut Actuator<D, P> {
        &mut self.actuator
    }

    pub fn gauge_mut(&mut self) -> &mut PressureSensor<G> {
        &mut self.gauge
    }

    pub fn homing_stage(&self) -> HomingStage {
        self.homing
    }

    pub fn last_pressure(&self) -> Option<f64> {
        self.last_pressure
    }

    /// Lock-free phase / cycle / fault view for other threads.
    pub fn live(&self) -> Arc<LiveStatus> {
        Arc::clone(&self.live)
    }

    // ── control tick ─────────────────────────────────────────────────────────

    /// One control period.
    pub fn tick(&mut self) -> TickReport {
        self.tick_count += 1;
        self.phase_ticks = self.phase_ticks.saturating_add(1);

        self.evaluate_alarms();
        let pressure = self.sample_pressure();

        let entering = std::mem::take(&mut self.entry_pending);
        let current = self.phase;
        let transition = match self.dispatch(entering) {
            Ok(t) => t,
            Err(e) => self.fault_from_error(&e),
        };
        self.apply_transition(transition);
        self.alarms.update();
        self.live.publish(self.phase, self.cycle_count, self.fault);

        TickReport {
            tick: self.tick_count,
            phase: self.phase,
            entered: entering.then_some(current),
            pressure_cmh2o: pressure,
            sensor_ok: self.sensor_ok,
            audible_alarm: self.alarms.audible_level(),
            fault: self.fault,
        }
    }

    fn dispatch(&mut self, entering: bool) -> Result<PhaseTransition, VentError> {
        match self.phase {
            BreathPhase::Startup => Ok(self.run_startup()),
            BreathPhase::Inspiration => self.run_inspiration(entering),
            BreathPhase::InspirationHold => Ok(self.run_inspiration_hold()),
            BreathPhase::Expiration => self.run_expiration(entering),
            BreathPhase::PeepPause => Ok(self.run_peep_pause()),
            BreathPhase::ExpirationHold => Ok(self.run_expiration_hold()),
            BreathPhase::ActuatorHome => self.run_actuator_home(entering),
            BreathPhase::Fault => self.run_fault(entering),
            BreathPhase::Off => self.run_off(entering),
            BreathPhase::ActuatorJog | BreathPhase::Debug => Ok(PhaseTransition::stay(self.phase)),
        }
    }

    fn apply_transition(&mut self, t: PhaseTransition) {
        if t.next != self.phase {
            tracing::debug!(
                from = self.phase.name(),
                to = t.next.name(),
                cycle = self.cycle_count,
                "phase transition"
            );
        }
        self.phase = t.next;
        if t.on_enter {
            self.entry_pending = true;
            self.phase_ticks = 0;
        }
    }

    fn fault_transition(&mut self, code: FaultCode) -> PhaseTransition {
        self.fault = Some(code);
        PhaseTransition::to(BreathPhase::Fault)
    }

    fn fault_from_error(&mut self, e: &VentError) -> PhaseTransition {
        let code = match e {
            VentError::Waveform(_) => FaultCode::WaveformCalcError,
            _ => FaultCode::HardwareFault,
        };
        if self.phase == BreathPhase::Fault {
            tracing::warn!(error = %e, "hardware error while in fault");
            return PhaseTransition::stay(BreathPhase::Fault);
        }
        tracing::warn!(error = %e, phase = self.phase.name(), "control step failed");
        self.fault_transition(code)
    }

    fn sample_pressure(&mut self) -> Option<f64> {
        match self.gauge.pressure(PressureUnit::CmH2O, true) {
            Ok(p) => {
                if !self.sensor_ok {
                    tracing::info!("gauge pressure readings restored");
                }
                self.sensor_ok = true;
                self.last_pressure = Some(p);
                if self.phase.is_breathing() {
                    self.waveform.record_peak_pressure(p);
                }
                Some(p)
            }
            Err(e) => {
                if self.sensor_ok {
                    tracing::warn!(error = %e, "gauge pressure read failed");
                }
                self.sensor_ok = false;
                None
            }
        }
    }

    /// Alarm conditions from the previous tick's observations. Runs before the
    /// phase handler so a condition seen at a phase boundary is never lost.
    fn evaluate_alarms(&mut self) {
        let cfg = &self.alarm_cfg;
        let seq = self.cycle_count;
        if self.phase.is_breathing()
            && let Some(p) = self.last_pressure
        {
            let limit = self.target.pip_cmh2o.min(cfg.pressure_max_cmh2o);
            self.alarms.set_condition(AlarmId::HighPressure, p > limit, seq);
        }
        for check in std::mem::take(&mut self.pending) {
            match check {
                PendingCheck::InspirationEnd {
                    peak,
                    delivered_ml,
                    seq,
                } => {
                    let wanted = cfg.unmet_volume_ratio * self.target.tidal_volume_ml;
                    self.alarms
                        .set_condition(AlarmId::LowPressure, peak < self.target.peep_cmh2o, seq);
                    self.alarms
                        .set_condition(AlarmId::UnmetVolume, delivered_ml < wanted, seq);
                }
                PendingCheck::HoldEnd { peak, plateau, seq } => {
                    let bad = peak - plateau > cfg.max_pip_plateau_delta_cmh2o;
                    self.alarms.set_condition(AlarmId::BadPlateau, bad, seq);
                }
                PendingCheck::PeepEnd { pip, peep, seq } => {
                    let bad = pip - peep < cfg.min_tidal_pressure_cmh2o;
                    self.alarms.set_condition(AlarmId::NoTidalPressure, bad, seq);
                }
            }
        }
    }

    // ── phase handlers ───────────────────────────────────────────────────────

    fn run_startup(&mut self) -> PhaseTransition {
        if self.phase_ticks >= self.startup_ticks {
            tracing::info!("startup complete");
            PhaseTransition::to(BreathPhase::Off)
        } else {
            PhaseTransition::stay(BreathPhase::Startup)
        }
    }

    fn run_off(&mut self, entering: bool) -> Result<PhaseTransition, VentError> {
        if entering {
            self.cycle_count = 0;
            self.resume_inspiration = false;
            self.alarms.all_off();
            self.actuator.stop()?;
        }
        Ok(PhaseTransition::stay(BreathPhase::Off))
    }

    fn run_inspiration(&mut self, entering: bool) -> Result<PhaseTransition, VentError> {
        if entering && let Some(t) = self.begin_breath()? {
            return Ok(t);
        }
        if self.waveform.phase_elapsed(PhaseDeadline::InspirationDone) {
            let delivered_ml = self.actuator.degrees_to_volume(self.compliance)? * 1000.0;
            self.waveform.measured_mut().tidal_volume_ml = delivered_ml;
            self.pending.push(PendingCheck::InspirationEnd {
                peak: self.waveform.current_peak(),
                delivered_ml,
                seq: self.cycle_count,
            });
            return Ok(PhaseTransition::to(BreathPhase::InspirationHold));
        }
        Ok(PhaseTransition::stay(BreathPhase::Inspiration))
    }

    /// Inspiration entry. Returns a transition when the breath cannot start yet.
    fn begin_breath(&mut self) -> Result<Option<PhaseTransition>, VentError> {
        self.fault = None;
        if !self.actuator.is_home()? {
            if self.actuator.rolls_over()
                && self.entry_corrections < MAX_ENTRY_CORRECTIONS
                && let HomeCorrection::Nudged { .. } = self.actuator.add_correction()?
            {
                self.entry_corrections += 1;
                return Ok(Some(PhaseTransition::to(BreathPhase::Inspiration)));
            }
            tracing::info!("paddle not home at breath start; homing first");
            self.entry_corrections = 0;
            self.resume_inspiration = true;
            return Ok(Some(PhaseTransition::to(BreathPhase::ActuatorHome)));
        }
        if self.entry_corrections > 0 {
            self.entry_corrections = 0;
            self.actuator.set_position_as_home()?;
        }

        self.cycle_count += 1;
        let derived = match self.waveform.recalculate(&self.target) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, target = ?self.target, "breath timing rejected");
                return Ok(Some(self.fault_transition(FaultCode::WaveformCalcError)));
            }
        };
        let goal = self
            .actuator
            .volume_to_degrees(self.target.tidal_volume_ml / 1000.0, self.compliance);
        let trajectory = self.actuator.plan_trajectory(derived.inspiration_s, goal)?;
        self.actuator.set_position(goal)?;
        self.actuator.set_speed(trajectory.velocity_deg_per_s)?;
        tracing::debug!(
            cycle = self.cycle_count,
            goal_deg = goal,
            velocity_deg_s = trajectory.velocity_deg_per_s,
            clamped = trajectory.clamped,
            "breath started"
        );
        Ok(None)
    }

    fn run_inspiration_hold(&mut self) -> PhaseTransition {
        if self.waveform.phase_elapsed(PhaseDeadline::HoldDone) {
            let plateau = self.last_pressure.unwrap_or_default();
            self.waveform.measured_mut().plateau_pressure = plateau;
            self.waveform
                .mark_phase_boundary(PhaseBoundary::InspirationEnd, self.clock.now());
            self.pending.push(PendingCheck::HoldEnd {
                peak: self.waveform.current_peak(),
                plateau,
                seq: self.cycle_count,
            });
            return PhaseTransition::to(BreathPhase::Expiration);
        }
        PhaseTransition::stay(BreathPhase::InspirationHold)
    }

    fn run_expiration(&mut self, entering: bool) -> Result<PhaseTransition, VentError> {
        if entering {
            let duration = self.waveform.derived().expiration_s;
            let trajectory = self.actuator.plan_trajectory(duration, 0.0)?;
            self.actuator.set_position(0.0)?;
            self.actuator.set_speed(trajectory.velocity_deg_per_s)?;
        }
        if self.actuator.target_reached()? {
            return Ok(PhaseTransition::to(BreathPhase::PeepPause));
        }
        Ok(PhaseTransition::stay(BreathPhase::Expiration))
    }

    fn run_peep_pause(&mut self) -> PhaseTransition {
        if self.waveform.phase_elapsed(PhaseDeadline::PeepPauseDone) {
            let peep = self.last_pressure.unwrap_or_default();
            self.waveform.measured_mut().peep = peep;
            let pip = self.waveform.latch_and_reset_peak();
            self.pending.push(PendingCheck::PeepEnd {
                pip,
                peep,
                seq: self.cycle_count,
            });
            return PhaseTransition::to(BreathPhase::ExpirationHold);
        }
        PhaseTransition::stay(BreathPhase::PeepPause)
    }

    fn run_expiration_hold(&mut self) -> PhaseTransition {
        if self.waveform.phase_elapsed(PhaseDeadline::ExpirationDone) {
            self.waveform
                .mark_phase_boundary(PhaseBoundary::ExpirationEnd, self.clock.now());
            self.waveform.derive_measured_ie_and_rr();
            let m = self.waveform.measured();
            tracing::info!(
                cycle = self.cycle_count,
                pip = m.pip,
                peep = m.peep,
                plateau = m.plateau_pressure,
                rr = m.respiration_rate,
                vt_ml = m.tidal_volume_ml,
                "breath complete"
            );
            return PhaseTransition::to(BreathPhase::Inspiration);
        }
        PhaseTransition::stay(BreathPhase::ExpirationHold)
    }

    fn run_actuator_home(&mut self, entering: bool) -> Result<PhaseTransition, VentError> {
        let stay = PhaseTransition::stay(BreathPhase::ActuatorHome);
        let home = self.actuator.is_home()?;
        if entering {
            if home {
                return self.finish_homing();
            }
            if self.actuator.past_home_band()? {
                self.actuator.stop()?;
                self.homing = HomingStage::Correcting { attempts: 0 };
            } else {
                self.actuator.home()?;
                self.homing = HomingStage::Seeking;
            }
            tracing::info!(stage = ?self.homing, "homing started");
            return Ok(stay);
        }
        if home {
            return self.finish_homing();
        }
        if self.phase_ticks > self.homing_timeout_ticks {
            tracing::warn!(ticks = self.phase_ticks, "homing timed out");
            return Ok(self.fault_transition(FaultCode::ActuatorFault));
        }
        match self.homing {
            HomingStage::Seeking => {
                if self.actuator.past_home_band()? {
                    self.actuator.stop()?;
                    self.homing = HomingStage::Correcting { attempts: 0 };
                    return Ok(stay);
                }
                if self.phase_ticks > self.stall_check_ticks {
                    if self.force_actuator_fault || !self.actuator.is_moving()? {
                        tracing::warn!(forced = self.force_actuator_fault, "paddle not moving");
                        self.force_actuator_fault = false;
                        return Ok(self.fault_transition(FaultCode::ActuatorFault));
                    }
                } else {
                    // keep the stall reference current until the settle delay ends
                    self.actuator.is_moving()?;
                }
            }
            HomingStage::Correcting { attempts } => {
                if self.force_actuator_fault {
                    self.force_actuator_fault = false;
                    return Ok(self.fault_transition(FaultCode::ActuatorFault));
                }
                if !self.actuator.target_reached()? {
                    return Ok(stay);
                }
                if attempts >= MAX_HOME_CORRECTIONS {
                    tracing::warn!(attempts, "home corrections exhausted");
                    return Ok(self.fault_transition(FaultCode::ActuatorFault));
                }
                match self.actuator.add_correction()? {
                    HomeCorrection::AlreadyHome => return self.finish_homing(),
                    HomeCorrection::Nudged { .. } => {
                        self.homing = HomingStage::Correcting {
                            attempts: attempts + 1,
                        };
                    }
                    HomeCorrection::Uncorrectable => {
                        self.actuator.home()?;
                        self.homing = HomingStage::Seeking;
                    }
                }
            }
        }
        Ok(stay)
    }

    fn finish_homing(&mut self) -> Result<PhaseTransition, VentError> {
        self.actuator.stop()?;
        self.actuator.set_position_as_home()?;
        self.waveform.reset_measured();
        self.alarms
            .set_condition(AlarmId::MechanicalFailure, false, self.tick_count);
        self.homing = HomingStage::Seeking;
        let next = if std::mem::take(&mut self.resume_inspiration) {
            BreathPhase::Inspiration
        } else {
            BreathPhase::Off
        };
        tracing::info!(next = next.name(), "paddle home");
        Ok(PhaseTransition::to(next))
    }

    fn run_fault(&mut self, entering: bool) -> Result<PhaseTransition, VentError> {
        if entering {
            let code = *self.fault.get_or_insert(FaultCode::HardwareFault);
            tracing::error!(code = code.code(), reason = code.as_str(), "entering fault");
            if code == FaultCode::ActuatorFault {
                self.alarms
                    .set_condition(AlarmId::MechanicalFailure, true, self.tick_count);
            }
            self.resume_inspiration = false;
            self.actuator.stop()?;
        }
        Ok(PhaseTransition::stay(BreathPhase::Fault))
    }

    // ── external operations ──────────────────────────────────────────────────

    /// Switch phase on operator request. Entry actions run on the next tick.
    pub fn change_phase(&mut self, next: BreathPhase) {
        tracing::info!(from = self.phase.name(), to = next.name(), "phase change requested");
        if next == BreathPhase::ActuatorHome {
            self.resume_inspiration = false;
        }
        self.entry_corrections = 0;
        self.apply_transition(PhaseTransition::to(next));
        self.live.publish(self.phase, self.cycle_count, self.fault);
    }

    /// Change one breath target; applies from the next breath.
    pub fn set_target(&mut self, field: TargetField, value: f64) -> Result<(), VentError> {
        if !value.is_finite() {
            return Err(VentError::Config(format!("{field:?} must be finite")));
        }
        self.target.set(field, value);
        tracing::info!(?field, value, "target changed");
        Ok(())
    }

    pub fn set_targets(&mut self, target: WaveformTarget) {
        self.target = target;
    }

    /// Raise a fault for diagnostics. An actuator fault requested while
    /// homing goes through the stall check path.
    pub fn force_fault(&mut self, code: FaultCode) {
        tracing::warn!(code = code.code(), "fault forced");
        if code == FaultCode::ActuatorFault && self.phase == BreathPhase::ActuatorHome {
            self.force_actuator_fault = true;
            return;
        }
        let t = self.fault_transition(code);
        self.apply_transition(t);
        self.live.publish(self.phase, self.cycle_count, self.fault);
    }

    /// Manual relative move; only outside the breath cycle.
    pub fn jog(&mut self, delta_deg: f64, deg_per_s: f64) -> Result<(), VentError> {
        if !matches!(
            self.phase,
            BreathPhase::ActuatorJog | BreathPhase::Debug | BreathPhase::Off
        ) {
            return Err(VentError::State(format!(
                "jog not allowed in {}",
                self.phase.name()
            )));
        }
        self.actuator.jog(delta_deg, deg_per_s)
    }

    /// Re-reference the paddle zero here. Returns the value to persist.
    pub fn zero_actuator(&mut self) -> Result<Option<u16>, VentError> {
        if self.phase.is_breathing() {
            return Err(VentError::State(format!(
                "cannot zero actuator in {}",
                self.phase.name()
            )));
        }
        self.actuator.set_current_position_as_zero()
    }

    pub fn load_actuator_zero(&mut self, zero: u16) -> Result<(), VentError> {
        self.actuator.load_zero(zero)
    }

    pub fn snooze_alarms(&mut self) {
        self.alarms.snooze();
    }

    pub fn toggle_snooze(&mut self) -> bool {
        self.alarms.toggle_snooze()
    }

    /// Stop motion, announce shutdown and park in Off.
    pub fn shutdown(&mut self) -> Result<(), VentError> {
        tracing::info!(cycle = self.cycle_count, "shutting down");
        self.alarms.all_off();
        self.cycle_count = 0;
        self.resume_inspiration = false;
        self.phase = BreathPhase::Off;
        self.entry_pending = false;
        self.phase_ticks = 0;
        self.alarms
            .set_condition(AlarmId::TurningOff, true, self.tick_count);
        self.live.publish(self.phase, self.cycle_count, self.fault);
        self.actuator.stop()
    }

    pub fn uptime_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    pub fn snapshot(&mut self) -> Snapshot {
        let uptime_ms = self.uptime_ms();
        Snapshot {
            phase: self.phase,
            cycle_count: self.cycle_count,
            fault: self.fault,
            target: self.target,
            derived: *self.waveform.derived(),
            measured: *self.waveform.measured(),
            pressure_cmh2o: self.last_pressure,
            sensor_ok: self.sensor_ok,
            actuator_angle_deg: self.actuator.position_deg().ok(),
            command: self.actuator.command(),
            alarm_level: self.alarms.highest_active_level(),
            alarm_text: self.alarms.display_text(uptime_ms),
            active_alarms: self.alarms.active_labels(),
            snoozed: self.alarms.is_snoozed(),
            uptime_ms,
        }
    }

    pub fn diagnostics(&mut self) -> Diagnostics {
        let alarms = AlarmId::ALL
            .iter()
            .map(|id| {
                let c = self.alarms.condition(*id);
                AlarmDiag {
                    label: c.label,
                    level: c.level,
                    on: c.is_on(),
                    consecutive_bad: c.consecutive_bad(),
                    consecutive_good: c.consecutive_good(),
                }
            })
            .collect();
        Diagnostics {
            phase: self.phase,
            phase_ticks: self.phase_ticks,
            tick_count: self.tick_count,
            homing: format!("{:?}", self.homing),
            rolls_over: self.actuator.rolls_over(),
            actuator_angle_deg: self.actuator.position_deg().ok(),
            calibration: *self.gauge.calibration(),
            last_pressure_cmh2o: self.last_pressure,
            sensor_ok: self.sensor_ok,
            alarms,
        }
    }
}
