//! A ventilator wired to simulated hardware.
//!
//! `build_simulated` assembles the machine on any clock (the CLI uses it with
//! the real clock under `VentRunner`). `SimRig` adds a `ManualClock` and steps
//! time itself, so minutes of breathing run in milliseconds and every run is
//! reproducible.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vent_config::PositionSourceKind;
use vent_hardware::sim::{SimulatedEncoder, SimulatedLung, SimulatedStepper, StepperProbe};
use vent_traits::{Clock, ManualClock, PositionSource, StepperDrive};

use crate::actuator::{Actuator, SharedDrive};
use crate::builder::VentilatorBuilder;
use crate::bus::SharedBus;
use crate::config::VentCfg;
use crate::error::Result;
use crate::machine::Ventilator;
use crate::position::{EncoderPosition, StepCountPosition};
use crate::pressure::PressureSensor;
use crate::status::TickReport;
use crate::waveform::WaveformTarget;

pub type SimVentilator =
    Ventilator<SimulatedStepper, Box<dyn PositionSource + Send>, SimulatedLung>;

/// Handles into the simulated plant.
#[derive(Clone)]
pub struct SimHandles {
    pub probe: StepperProbe,
    pub drive: SharedDrive<SimulatedStepper>,
    disconnect: Arc<AtomicBool>,
}

impl core::fmt::Debug for SimHandles {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimHandles")
            .field("position", &self.probe.position())
            .field("stalled", &self.probe.is_stalled())
            .finish_non_exhaustive()
    }
}

impl SimHandles {
    /// Open (true) or close (false) the breathing circuit.
    pub fn set_disconnected(&self, disconnected: bool) {
        self.disconnect.store(disconnected, Ordering::Relaxed);
    }
}

/// Build a ventilator on simulated hardware with the paddle at `start_deg`.
pub fn build_simulated(
    cfg: &VentCfg,
    source: PositionSourceKind,
    clock: Arc<dyn Clock + Send + Sync>,
    target: WaveformTarget,
    start_deg: f64,
) -> Result<(SimVentilator, SimHandles)> {
    let spr = cfg.actuator.steps_per_rev;
    let start_steps = (start_deg / 360.0 * spr).round() as i64;
    let stepper = SimulatedStepper::new(Arc::clone(&clock)).with_position(start_steps);
    let probe = stepper.probe();
    let position: Box<dyn PositionSource + Send> = match source {
        PositionSourceKind::Steps => Box::new(StepCountPosition),
        PositionSourceKind::Encoder => {
            let encoder = SimulatedEncoder::new(probe.clone(), spr, 0);
            Box::new(EncoderPosition::new(SharedBus::new(encoder)))
        }
    };
    let drive: SharedDrive<SimulatedStepper> = Arc::new(Mutex::new(stepper));
    let actuator = Actuator::new(Arc::clone(&drive), position, cfg.actuator.clone());

    let lung = SimulatedLung::new(probe.clone(), spr);
    let disconnect = lung.disconnect_switch();
    let (max_psi, min_psi) = cfg.sensors.gauge_psi;
    let gauge = PressureSensor::init(lung, &cfg.sensors.electrics, max_psi, min_psi, 0);

    let vent = VentilatorBuilder::new()
        .with_config(cfg.clone())
        .with_target(target)
        .with_clock(clock)
        .with_actuator(actuator)
        .with_gauge(gauge)
        .build()?;
    Ok((
        vent,
        SimHandles {
            probe,
            drive,
            disconnect,
        },
    ))
}

/// Deterministic, self-clocked simulation.
pub struct SimRig {
    clock: ManualClock,
    tick: Duration,
    handles: SimHandles,
    vent: SimVentilator,
}

impl core::fmt::Debug for SimRig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimRig")
            .field("offset", &self.clock.offset())
            .field("vent", &self.vent)
            .finish_non_exhaustive()
    }
}

impl SimRig {
    pub fn new(cfg: &VentCfg, source: PositionSourceKind) -> Result<Self> {
        Self::with_start(cfg, source, WaveformTarget::default(), 0.0)
    }

    pub fn with_start(
        cfg: &VentCfg,
        source: PositionSourceKind,
        target: WaveformTarget,
        start_deg: f64,
    ) -> Result<Self> {
        let clock = ManualClock::new();
        let (vent, handles) =
            build_simulated(cfg, source, Arc::new(clock.clone()), target, start_deg)?;
        Ok(Self {
            clock,
            tick: cfg.timing.tick,
            handles,
            vent,
        })
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn handles(&self) -> &SimHandles {
        &self.handles
    }

    pub fn vent(&self) -> &SimVentilator {
        &self.vent
    }

    pub fn vent_mut(&mut self) -> &mut SimVentilator {
        &mut self.vent
    }

    /// Advance one tick: move time, service the drive, run the control step.
    pub fn step(&mut self) -> TickReport {
        self.clock.advance(self.tick);
        if let Ok(mut d) = self.handles.drive.lock() {
            // a simulated drive never fails
            let _ = d.run();
        }
        self.vent.tick()
    }

    /// Run for `span` of simulated time; returns the last report.
    pub fn run_for(&mut self, span: Duration) -> Option<TickReport> {
        let n = span.as_nanos() / self.tick.as_nanos().max(1);
        let mut last = None;
        for _ in 0..n {
            last = Some(self.step());
        }
        last
    }

    /// Step until `pred` holds or `limit` of simulated time passes.
    pub fn run_until(
        &mut self,
        mut pred: impl FnMut(&TickReport) -> bool,
        limit: Duration,
    ) -> Option<TickReport> {
        let n = limit.as_nanos() / self.tick.as_nanos().max(1);
        for _ in 0..n {
            let r = self.step();
            if pred(&r) {
                return Some(r);
            }
        }
        None
    }

    /// Current paddle angle as seen by the plant, not the controller.
    pub fn paddle_deg(&self) -> f64 {
        let spr = self.vent.actuator().cfg().steps_per_rev;
        self.handles.probe.angle_deg(spr)
    }

    pub fn drive_position(&self) -> Option<i64> {
        self.handles
            .drive
            .lock()
            .ok()
            .map(|d| d.current_position())
    }
}
