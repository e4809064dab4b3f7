//! What the control loop reports after each tick, and the state snapshot
//! published to the operator side.
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use crate::actuator::ActuatorCommand;
use crate::alarm::AlarmLevel;
use crate::error::FaultCode;
use crate::phase::BreathPhase;
use crate::pressure::PressureCalibration;
use crate::waveform::{WaveformDerived, WaveformMeasured, WaveformTarget};

/// Outcome of one control tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// Phase after the tick.
    pub phase: BreathPhase,
    /// Set when this tick ran the entry actions of a phase.
    pub entered: Option<BreathPhase>,
    /// Airway pressure sampled this tick, cmH2O.
    pub pressure_cmh2o: Option<f64>,
    pub sensor_ok: bool,
    pub audible_alarm: Option<AlarmLevel>,
    pub fault: Option<FaultCode>,
}

/// Full operator-facing state.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub phase: BreathPhase,
    pub cycle_count: u64,
    pub fault: Option<FaultCode>,
    pub target: WaveformTarget,
    pub derived: WaveformDerived,
    pub measured: WaveformMeasured,
    pub pressure_cmh2o: Option<f64>,
    pub sensor_ok: bool,
    pub actuator_angle_deg: Option<f64>,
    pub command: ActuatorCommand,
    pub alarm_level: Option<AlarmLevel>,
    pub alarm_text: Option<&'static str>,
    pub active_alarms: Vec<&'static str>,
    pub snoozed: bool,
    pub uptime_ms: u64,
}

/// One alarm's hysteresis state, for diagnostics dumps.
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmDiag {
    pub label: &'static str,
    pub level: AlarmLevel,
    pub on: bool,
    pub consecutive_bad: u32,
    pub consecutive_good: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostics {
    pub phase: BreathPhase,
    pub phase_ticks: u32,
    pub tick_count: u64,
    pub homing: String,
    pub rolls_over: bool,
    pub actuator_angle_deg: Option<f64>,
    pub calibration: PressureCalibration,
    pub last_pressure_cmh2o: Option<f64>,
    pub sensor_ok: bool,
    pub alarms: Vec<AlarmDiag>,
}

const NO_FAULT: u8 = 0;

/// Lock-free view of the few values other threads poll at high rate.
#[derive(Debug, Default)]
pub struct LiveStatus {
    phase: AtomicU8,
    cycle: AtomicU64,
    fault: AtomicU8,
}

impl LiveStatus {
    pub(crate) fn publish(&self, phase: BreathPhase, cycle: u64, fault: Option<FaultCode>) {
        self.phase.store(phase.as_u8(), Ordering::Release);
        self.cycle.store(cycle, Ordering::Release);
        self.fault
            .store(fault.map_or(NO_FAULT, FaultCode::code), Ordering::Release);
    }

    pub fn phase(&self) -> BreathPhase {
        BreathPhase::from_u8(self.phase.load(Ordering::Acquire)).unwrap_or(BreathPhase::Startup)
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle.load(Ordering::Acquire)
    }

    pub fn fault(&self) -> Option<FaultCode> {
        FaultCode::from_code(self.fault.load(Ordering::Acquire))
    }
}
