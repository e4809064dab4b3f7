#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Breath-cycle control core (hardware-agnostic).
//!
//! All hardware goes through the `vent_traits` seams: `StepperDrive` for the
//! paddle motor, `PositionSource` for the paddle angle and `PressureAdc` for
//! the airway gauge.
//!
//! ## Architecture
//!
//! - **Breath timing**: phase durations and measured values (`waveform`)
//! - **Actuator**: degrees/steps, trajectories, homing, bag compliance (`actuator`)
//! - **Pressure**: counts to pressure and flow, zeroing (`pressure`)
//! - **Alarms**: per-alarm hysteresis, display rotation, snooze (`alarm`)
//! - **State machine**: the per-tick orchestrator (`machine`), built with
//!   `VentilatorBuilder` and driven in real time by `runner::VentRunner`
//!
//! With the `sim` feature, `sim::SimRig` runs the whole machine against
//! simulated hardware on a manual clock.

pub mod actuator;
pub mod alarm;
pub mod builder;
pub mod bus;
pub mod config;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod machine;
pub mod phase;
pub mod position;
pub mod pressure;
pub mod runner;
#[cfg(feature = "sim")]
pub mod sim;
pub mod status;
pub mod util;
pub mod waveform;

pub use actuator::{Actuator, ActuatorCommand, Compliance, HomeCorrection, SharedDrive, Trajectory};
pub use alarm::{AlarmCondition, AlarmId, AlarmLevel, AlarmManager};
pub use builder::{Missing, VentilatorBuilder};
pub use bus::SharedBus;
pub use config::{ActuatorCfg, AlarmCfg, SensorCfg, SensorElectrics, TimingCfg, VentCfg};
pub use error::{BuildError, FaultCode, VentError, WaveformCalcError};
pub use machine::{HomingStage, Ventilator};
pub use phase::{BreathPhase, PhaseTransition, phase_names};
pub use position::{EncoderPosition, StepCountPosition};
pub use pressure::{FlowOrder, FlowUnit, PressureCalibration, PressureSensor, PressureUnit, ZeroKind};
pub use runner::{Request, RunnerOpts, StatsSnapshot, VentRunner};
pub use status::{Diagnostics, LiveStatus, Snapshot, TickReport};
pub use waveform::{
    TargetField, WaveformDerived, WaveformMeasured, WaveformTarget, WaveformTimer,
};
