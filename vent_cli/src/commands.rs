//! One-shot service commands: home, zero, set, show, phase, fault, phases,
//! diag and self-check.

use std::time::Duration;

use serde_json::{Value, json};
use vent_config::{PositionSourceKind, SettingsStore};
use vent_core::conversions::store_target;
use vent_core::sim::SimRig;
use vent_core::{
    BreathPhase, FaultCode, Request, VentCfg, WaveformDerived, WaveformTarget, phase_names,
};

use crate::cli::{MachineArgs, TargetArg};
use crate::report;
use crate::session::{self, Ctx, Faulted};

/// Print `value` in `--json` mode, `text` otherwise.
pub fn emit(ctx: &Ctx, value: Value, text: &str) {
    if ctx.json {
        println!("{value}");
    } else {
        println!("{text}");
    }
}

/// Store a captured encoder zero so the next start restores it.
pub fn persist_zero(ctx: &Ctx, zero: u16) -> eyre::Result<()> {
    let mut settings = ctx.store.load();
    settings.actuator_home_offset = zero;
    ctx.store.save(&settings)
}

pub fn cmd_home(ctx: &Ctx, machine: &MachineArgs) -> eyre::Result<()> {
    let runner = session::open(ctx, machine, ctx.runner_opts())?;
    session::wait_settled(ctx, &runner)?;
    runner.request(Request::ChangePhase(BreathPhase::ActuatorHome))?;
    session::sync(&runner)?;
    session::wait_settled(ctx, &runner)?;
    let diag = runner.diagnostics(Duration::from_secs(2))?;
    drop(runner.shutdown());
    let text = diag.actuator_angle_deg.map_or_else(
        || "homed".to_string(),
        |a| format!("homed: paddle at {a:.2} deg"),
    );
    emit(
        ctx,
        json!({ "homed": true, "angle_deg": diag.actuator_angle_deg }),
        &text,
    );
    Ok(())
}

pub fn cmd_zero(ctx: &Ctx, machine: &MachineArgs) -> eyre::Result<()> {
    let runner = session::open(ctx, machine, ctx.runner_opts())?;
    session::wait_settled(ctx, &runner)?;
    let zero = runner.zero_actuator(Duration::from_secs(2))?;
    drop(runner.shutdown());
    match zero {
        Some(z) => {
            persist_zero(ctx, z)?;
            emit(
                ctx,
                json!({ "zero": z, "saved": ctx.store.path().display().to_string() }),
                &format!("actuator zero {z} saved to {}", ctx.store.path().display()),
            );
        }
        None => emit(
            ctx,
            json!({ "zero": null }),
            "actuator re-referenced (step-count position; nothing to save)",
        ),
    }
    Ok(())
}

pub fn cmd_set(ctx: &Ctx, field: TargetArg, value: f64) -> eyre::Result<()> {
    field.check(value, &ctx.cfg.limits)?;
    let mut settings = ctx.store.load();
    let mut target = WaveformTarget::from(&settings);
    target.set(field.field(), value);
    let derived = WaveformDerived::compute(&target)?;
    store_target(&mut settings, &target);
    ctx.store.save(&settings)?;
    tracing::info!(?field, value, "target stored");
    emit(
        ctx,
        json!({
            "settings": report::settings_json(&settings),
            "period_s": derived.period_s,
            "inspiration_s": derived.inspiration_s,
            "expiration_s": derived.expiration_s,
        }),
        &format!(
            "{}\nbreath: {:.2} s (inspiration {:.2} s, expiration {:.2} s)",
            report::settings_text(&settings),
            derived.period_s,
            derived.inspiration_s,
            derived.expiration_s
        ),
    );
    Ok(())
}

pub fn cmd_show(ctx: &Ctx) -> eyre::Result<()> {
    let settings = match ctx.store.try_load() {
        Ok(s) => s,
        Err(e) => {
            if !ctx.json {
                eprintln!("note: {e:#}; showing defaults");
            }
            vent_config::Settings::default()
        }
    };
    emit(
        ctx,
        report::settings_json(&settings),
        &report::settings_text(&settings),
    );
    Ok(())
}

pub fn cmd_phase(
    ctx: &Ctx,
    phase: BreathPhase,
    seconds: f64,
    machine: &MachineArgs,
) -> eyre::Result<()> {
    let hold = Duration::try_from_secs_f64(seconds)
        .map_err(|_| eyre::eyre!("--seconds must be a finite number >= 0 (got {seconds})"))?;
    let runner = session::open(ctx, machine, ctx.runner_opts())?;
    session::wait_settled(ctx, &runner)?;
    runner.request(Request::ChangePhase(phase))?;
    session::sync(&runner)?;
    session::wait_for(ctx, hold, ctx.poll(), || false);
    session::sync(&runner)?;
    let snap = runner.latest();
    drop(runner.shutdown());
    if let Some(s) = snap {
        emit(ctx, report::snapshot_json(&s), &report::snapshot_text(&s));
    }
    Ok(())
}

pub fn cmd_fault(ctx: &Ctx, code: u8, machine: &MachineArgs) -> eyre::Result<()> {
    let fault = FaultCode::from_code(code)
        .ok_or_else(|| eyre::eyre!("unknown fault code {code} (1 actuator, 2 waveform, 3 hardware)"))?;
    let runner = session::open(ctx, machine, ctx.runner_opts())?;
    session::wait_settled(ctx, &runner)?;
    runner.request(Request::ForceFault(fault))?;
    session::sync(&runner)?;
    // entry actions run on the next tick
    session::wait_for(ctx, Duration::from_secs(2), Duration::from_millis(5), || {
        runner
            .latest()
            .is_some_and(|s| s.phase == BreathPhase::Fault)
    });
    let snap = runner.latest();
    drop(runner.shutdown());
    if let Some(s) = snap {
        emit(ctx, report::snapshot_json(&s), &report::snapshot_text(&s));
    }
    Ok(())
}

pub fn cmd_phases(ctx: &Ctx) {
    let names: Vec<&str> = phase_names().collect();
    emit(ctx, json!(names), &names.join("\n"));
}

pub fn cmd_diag(ctx: &Ctx, machine: &MachineArgs) -> eyre::Result<()> {
    let runner = session::open(ctx, machine, ctx.runner_opts())?;
    session::wait_settled(ctx, &runner)?;
    let diag = runner.diagnostics(Duration::from_secs(2))?;
    drop(runner.shutdown());
    emit(
        ctx,
        report::diagnostics_json(&diag),
        report::diagnostics_text(&diag).trim_end(),
    );
    Ok(())
}

/// Config and settings readable, and one simulated breath per position
/// source completes without a fault.
pub fn cmd_self_check(ctx: &Ctx) -> eyre::Result<()> {
    let vcfg = VentCfg::from(&ctx.cfg);
    let settings_ok = ctx.store.try_load().is_ok();
    let target = WaveformTarget::from(&ctx.store.load());
    let derived = WaveformDerived::compute(&target)?;
    let limit = ctx.ready_timeout() + Duration::from_secs_f64(derived.period_s * 2.0);

    let mut results = Vec::new();
    for source in [PositionSourceKind::Steps, PositionSourceKind::Encoder] {
        let mut rig = SimRig::with_start(&vcfg, source, target, 0.0)?;
        rig.run_until(|r| r.phase == BreathPhase::Off, ctx.ready_timeout());
        rig.vent_mut().change_phase(BreathPhase::Inspiration);
        rig.run_until(|r| r.fault.is_some() || r.entered == Some(BreathPhase::ExpirationHold), limit);
        if let Some(code) = rig.vent().fault() {
            tracing::error!(?source, code = code.code(), "self-check breath faulted");
            return Err(Faulted(code).into());
        }
        if rig.vent().cycle_count() == 0 {
            eyre::bail!("self-check: no breath started with {source:?} position source");
        }
        results.push(json!({
            "source": format!("{source:?}").to_lowercase(),
            "tidal_volume_ml": rig.vent().waveform().measured().tidal_volume_ml,
        }));
    }

    let backend = if cfg!(feature = "hardware") {
        "hardware"
    } else {
        "simulated"
    };
    emit(
        ctx,
        json!({
            "ok": true,
            "backend": backend,
            "settings_stored": settings_ok,
            "breaths": results,
        }),
        &format!(
            "ok: config valid, {} settings, simulated breath completed (backend: {backend})",
            if settings_ok { "stored" } else { "default" }
        ),
    );
    Ok(())
}
