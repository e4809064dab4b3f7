//! Machine assembly for one CLI invocation: config mapping, backend choice
//! (simulated plant or Raspberry Pi hardware) and the real-time runner.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use vent_config::{Config, FileSettingsStore, PositionSourceKind, Settings};
use vent_core::{BreathPhase, FaultCode, RunnerOpts, VentCfg, VentRunner, Ventilator, WaveformTarget};
use vent_traits::{Clock, MonotonicClock, PositionSource, PressureAdc, StepperDrive};

use crate::cli::MachineArgs;

/// Everything a command needs besides its own arguments.
pub struct Ctx {
    pub cfg: Config,
    pub store: FileSettingsStore,
    pub json: bool,
    /// Set by the Ctrl-C handler.
    pub shutdown: Arc<AtomicBool>,
}

impl Ctx {
    pub fn interrupted(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    pub fn source(&self, machine: &MachineArgs) -> PositionSourceKind {
        machine
            .source
            .map_or(self.cfg.actuator.position_source, PositionSourceKind::from)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.cfg.runner.snapshot_poll_ms.max(1))
    }

    pub fn runner_opts(&self) -> RunnerOpts {
        RunnerOpts {
            tick: Duration::from_micros(self.cfg.timing.control_period_us),
            step_period: Duration::from_micros(self.cfg.timing.step_period_us),
            snapshot_period: self.poll(),
            on_control_start: None,
        }
    }

    /// Longest a healthy machine may take to leave startup and homing.
    pub fn ready_timeout(&self) -> Duration {
        let t = &self.cfg.timing;
        Duration::from_millis(t.startup_ms + t.homing_timeout_ms) + Duration::from_secs(2)
    }
}

/// The machine ended in `Fault`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ventilator faulted: {0}")]
pub struct Faulted(pub FaultCode);

/// Restore the persisted paddle zero, if one was ever captured.
fn restore_zero<D, P, G>(vent: &mut Ventilator<D, P, G>, settings: &Settings) -> eyre::Result<()>
where
    D: StepperDrive,
    P: PositionSource,
    G: PressureAdc,
{
    if settings.actuator_home_offset != 0 {
        vent.load_actuator_zero(settings.actuator_home_offset)
            .wrap_err("restore actuator zero")?;
        tracing::info!(zero = settings.actuator_home_offset, "actuator zero restored");
    }
    Ok(())
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn spawn_backend(
    ctx: &Ctx,
    vcfg: &VentCfg,
    source: PositionSourceKind,
    target: WaveformTarget,
    settings: &Settings,
    clock: Arc<dyn Clock + Send + Sync>,
    opts: RunnerOpts,
) -> eyre::Result<VentRunner> {
    let _ = ctx;
    let (mut vent, _plant) =
        vent_core::sim::build_simulated(vcfg, source, Arc::clone(&clock), target, 0.0)?;
    restore_zero(&mut vent, settings)?;
    tracing::info!(?source, "simulated ventilator ready");
    Ok(VentRunner::spawn(vent, clock, opts))
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn spawn_backend(
    ctx: &Ctx,
    vcfg: &VentCfg,
    source: PositionSourceKind,
    target: WaveformTarget,
    settings: &Settings,
    clock: Arc<dyn Clock + Send + Sync>,
    opts: RunnerOpts,
) -> eyre::Result<VentRunner> {
    use std::sync::Mutex;
    use vent_core::{Actuator, PressureSensor, StepCountPosition, VentilatorBuilder};
    use vent_hardware::{GpioStepper, SpiAdc};

    if source == PositionSourceKind::Encoder {
        eyre::bail!("the encoder position source is only available on the simulated plant");
    }
    let p = &ctx.cfg.pins;
    let stepper = GpioStepper::new(p.motor_step, p.motor_dir, p.motor_en)
        .wrap_err("open motor pins")?;
    let adc = SpiAdc::new(p.spi_bus, p.spi_cs, p.gauge_channel).wrap_err("open pressure ADC")?;
    let actuator = Actuator::new(
        Arc::new(Mutex::new(stepper)),
        StepCountPosition,
        vcfg.actuator.clone(),
    );
    let (max_psi, min_psi) = vcfg.sensors.gauge_psi;
    let gauge = PressureSensor::init(adc, &vcfg.sensors.electrics, max_psi, min_psi, 0);
    let mut vent = VentilatorBuilder::new()
        .with_config(vcfg.clone())
        .with_target(target)
        .with_clock(Arc::clone(&clock))
        .with_actuator(actuator)
        .with_gauge(gauge)
        .build()?;
    restore_zero(&mut vent, settings)?;
    tracing::info!(
        step = p.motor_step,
        dir = p.motor_dir,
        spi_bus = p.spi_bus,
        "hardware ventilator ready"
    );
    Ok(VentRunner::spawn(vent, clock, opts))
}

/// Build the machine from config + stored settings and start its threads.
pub fn open(ctx: &Ctx, machine: &MachineArgs, opts: RunnerOpts) -> eyre::Result<VentRunner> {
    let vcfg = VentCfg::from(&ctx.cfg);
    let settings = vent_config::SettingsStore::load(&ctx.store);
    let target = WaveformTarget::from(&settings);
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    spawn_backend(ctx, &vcfg, ctx.source(machine), target, &settings, clock, opts)
}

/// Poll `cond` every `poll` until it holds; false on timeout or Ctrl-C.
pub fn wait_for(
    ctx: &Ctx,
    timeout: Duration,
    poll: Duration,
    mut cond: impl FnMut() -> bool,
) -> bool {
    let start = Instant::now();
    loop {
        if cond() {
            return true;
        }
        if ctx.interrupted() || start.elapsed() >= timeout {
            return false;
        }
        std::thread::sleep(poll);
    }
}

/// Wait for the machine to settle in `Off` (startup or homing finished).
pub fn wait_settled(ctx: &Ctx, runner: &VentRunner) -> eyre::Result<()> {
    let settled = wait_for(ctx, ctx.ready_timeout(), Duration::from_millis(5), || {
        matches!(runner.live().phase(), BreathPhase::Off | BreathPhase::Fault)
    });
    if let Some(code) = runner.live().fault() {
        return Err(Faulted(code).into());
    }
    if !settled {
        if ctx.interrupted() {
            eyre::bail!("interrupted");
        }
        eyre::bail!(
            "machine did not settle within {:?} (still in {})",
            ctx.ready_timeout(),
            runner.live().phase()
        );
    }
    Ok(())
}

/// Block until every request queued so far has been applied.
pub fn sync(runner: &VentRunner) -> eyre::Result<()> {
    runner.diagnostics(Duration::from_secs(2))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::SourceArg;

    fn ctx() -> Ctx {
        Ctx {
            cfg: Config::default(),
            store: FileSettingsStore::new("unused.toml"),
            json: false,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn source_flag_overrides_config() {
        let c = ctx();
        assert_eq!(
            c.source(&MachineArgs { source: None }),
            c.cfg.actuator.position_source
        );
        assert_eq!(
            c.source(&MachineArgs {
                source: Some(SourceArg::Encoder)
            }),
            PositionSourceKind::Encoder
        );
    }

    #[test]
    fn runner_opts_follow_timing_config() {
        let opts = ctx().runner_opts();
        assert_eq!(opts.tick, Duration::from_millis(20));
        assert_eq!(opts.step_period, Duration::from_micros(50));
        assert_eq!(opts.snapshot_period, Duration::from_millis(200));
    }

    #[test]
    fn wait_stops_on_ctrl_c() {
        let c = ctx();
        c.shutdown.store(true, Ordering::Relaxed);
        assert!(!wait_for(&c, Duration::from_secs(60), Duration::from_millis(1), || false));
    }

    #[test]
    fn faulted_names_the_code() {
        let e = Faulted(FaultCode::ActuatorFault);
        assert_eq!(e.to_string(), "ventilator faulted: actuator fault (1)");
    }

    #[test]
    fn faulted_survives_the_eyre_report() {
        let report: eyre::Report = Faulted(FaultCode::HardwareFault).into();
        assert_eq!(
            report.downcast_ref::<Faulted>(),
            Some(&Faulted(FaultCode::HardwareFault))
        );
        assert!(report.to_string().starts_with("ventilator faulted: "));
    }
}
