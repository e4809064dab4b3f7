//! Continuous ventilation: the real-time `run` loop with its operator console,
//! and the accelerated `simulate` run on a virtual clock.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError};
use serde_json::json;
use vent_config::SettingsStore;
use vent_core::sim::SimRig;
use vent_core::util::{rate_hz, ticks_for};
use vent_core::{BreathPhase, Request, Snapshot, VentCfg, VentRunner, WaveformTarget};

use crate::cli::{MachineArgs, RtArgs};
use crate::commands::{emit, persist_zero};
use crate::console::{ConsoleCmd, HELP, parse_line};
use crate::report;
use crate::rt::{self, RtPlan};
use crate::session::{self, Ctx, Faulted};
use crate::trace::TraceWriter;

#[derive(Debug)]
pub struct RunOptions {
    pub seconds: Option<f64>,
    pub idle: bool,
    pub console: bool,
    pub trace: Option<PathBuf>,
    pub stats: bool,
    pub machine: MachineArgs,
    pub rt: RtArgs,
}

#[derive(Debug)]
pub struct SimulateOptions {
    pub seconds: f64,
    pub trace: Option<PathBuf>,
    pub disconnect_at: Option<f64>,
    pub machine: MachineArgs,
}

fn duration_arg(name: &str, secs: f64) -> eyre::Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| eyre::eyre!("--{name} must be a finite number of seconds >= 0 (got {secs})"))
}

/// Read stdin lines on a helper thread; the receiver disconnects at EOF.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

enum Flow {
    Continue,
    Quit,
}

fn console_reply(ctx: &Ctx, value: serde_json::Value, text: &str) {
    if ctx.json {
        println!("{value}");
    } else {
        println!("{text}");
    }
}

fn apply_console(ctx: &Ctx, runner: &VentRunner, cmd: ConsoleCmd) -> eyre::Result<Flow> {
    match cmd {
        ConsoleCmd::Quit => return Ok(Flow::Quit),
        ConsoleCmd::Help => println!("{HELP}"),
        ConsoleCmd::Requests(reqs) => {
            for r in reqs {
                runner.request(r)?;
            }
        }
        ConsoleCmd::Status => {
            if let Some(s) = runner.latest() {
                console_reply(ctx, report::snapshot_json(&s), &report::snapshot_text(&s));
            }
        }
        ConsoleCmd::Diag => {
            let d = runner.diagnostics(Duration::from_secs(2))?;
            console_reply(
                ctx,
                report::diagnostics_json(&d),
                report::diagnostics_text(&d).trim_end(),
            );
        }
        ConsoleCmd::Zero => match runner.zero_actuator(Duration::from_secs(2))? {
            Some(zero) => {
                persist_zero(ctx, zero)?;
                console_reply(ctx, json!({ "zero": zero }), &format!("actuator zero {zero} saved"));
            }
            None => console_reply(ctx, json!({ "zero": null }), "actuator re-referenced"),
        },
    }
    Ok(Flow::Continue)
}

/// Drain pending console lines. Bad lines are reported and skipped.
fn service_console(
    ctx: &Ctx,
    runner: &VentRunner,
    lines: &mut Option<Receiver<String>>,
) -> eyre::Result<Flow> {
    let Some(rx) = lines.clone() else {
        return Ok(Flow::Continue);
    };
    loop {
        let line = match rx.try_recv() {
            Ok(line) => line,
            Err(TryRecvError::Empty) => return Ok(Flow::Continue),
            Err(TryRecvError::Disconnected) => {
                tracing::debug!("console input closed");
                *lines = None;
                return Ok(Flow::Continue);
            }
        };
        let parsed = parse_line(&line, &ctx.cfg.limits);
        let outcome = parsed.and_then(|cmd| match cmd {
            Some(cmd) => apply_console(ctx, runner, cmd),
            None => Ok(Flow::Continue),
        });
        match outcome {
            Ok(Flow::Quit) => return Ok(Flow::Quit),
            Ok(Flow::Continue) => {}
            Err(e) => eprintln!("error: {e:#}"),
        }
    }
}

fn log_breath(s: &Snapshot) {
    let m = &s.measured;
    tracing::info!(
        cycle = s.cycle_count,
        pip = m.pip,
        peep = m.peep,
        plateau = m.plateau_pressure,
        rr = m.respiration_rate,
        vt_ml = m.tidal_volume_ml,
        "breath"
    );
}

fn emit_summary(ctx: &Ctx, s: &Snapshot, trace_rows: Option<u64>) {
    let mut text = report::snapshot_text(s);
    if let Some(n) = trace_rows {
        text.push_str(&format!("\ntrace: {n} rows"));
    }
    emit(
        ctx,
        json!({
            "breaths": s.cycle_count,
            "snapshot": report::snapshot_json(s),
            "trace_rows": trace_rows,
        }),
        &text,
    );
}

pub fn cmd_run(ctx: &Ctx, o: RunOptions) -> eyre::Result<()> {
    let deadline = match o.seconds {
        Some(s) => Some(Instant::now() + duration_arg("seconds", s)?),
        None => None,
    };
    let mut opts = ctx.runner_opts();
    if let Some(plan) = RtPlan::resolve(&o.rt, &ctx.cfg.runner) {
        tracing::info!(?plan, "real-time mode requested");
        opts.on_control_start = Some(Box::new(move || rt::apply_to_current_thread(plan)));
    }
    let tick_hz = rate_hz(opts.tick);
    let mut trace = o.trace.as_deref().map(TraceWriter::create).transpose()?;

    let runner = session::open(ctx, &o.machine, opts)?;
    session::wait_settled(ctx, &runner)?;
    if o.idle {
        tracing::info!("idle in Off; waiting for commands");
    } else {
        runner.request(Request::ChangePhase(BreathPhase::Inspiration))?;
    }
    let mut lines = o.console.then(spawn_stdin_reader);
    if lines.is_some() && !ctx.json {
        println!("console ready; type `help`");
    }

    let mut last_cycle = 0;
    loop {
        if ctx.interrupted() {
            tracing::info!("interrupted");
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        if let Flow::Quit = service_console(ctx, &runner, &mut lines)? {
            break;
        }
        if let Some(s) = runner.latest() {
            if let Some(t) = trace.as_mut() {
                t.record(&s)?;
            }
            if s.cycle_count > last_cycle {
                log_breath(&s);
            }
            last_cycle = s.cycle_count;
        }
        std::thread::sleep(ctx.poll());
    }

    let fault = runner.live().fault();
    let stats = runner.stats();
    let last = runner.latest();
    let parked = runner.shutdown();
    tracing::info!(
        phase = ?parked.as_ref().map(|s| s.phase),
        "ventilator parked"
    );
    let rows = match trace {
        Some(t) => {
            let n = t.rows();
            t.finish()?;
            Some(n)
        }
        None => None,
    };
    if let Some(s) = last.as_ref() {
        emit_summary(ctx, s, rows);
    }
    if o.stats {
        if ctx.json {
            println!("{}", report::stats_json(&stats, tick_hz));
        } else {
            report::print_stats(&stats, tick_hz);
        }
    }
    match fault {
        Some(code) => Err(Faulted(code).into()),
        None => Ok(()),
    }
}

pub fn cmd_simulate(ctx: &Ctx, o: SimulateOptions) -> eyre::Result<()> {
    let span = duration_arg("seconds", o.seconds)?;
    let disconnect_at = o
        .disconnect_at
        .map(|s| duration_arg("disconnect-at", s))
        .transpose()?;
    let vcfg = VentCfg::from(&ctx.cfg);
    let settings = ctx.store.load();
    let mut rig = SimRig::with_start(
        &vcfg,
        ctx.source(&o.machine),
        WaveformTarget::from(&settings),
        0.0,
    )?;
    if settings.actuator_home_offset != 0 {
        rig.vent_mut().load_actuator_zero(settings.actuator_home_offset)?;
    }
    let mut trace = o.trace.as_deref().map(TraceWriter::create).transpose()?;

    let settled = rig.run_until(
        |r| matches!(r.phase, BreathPhase::Off | BreathPhase::Fault),
        ctx.ready_timeout(),
    );
    if let Some(code) = rig.vent().fault() {
        return Err(Faulted(code).into());
    }
    if settled.is_none() {
        eyre::bail!("simulated machine did not settle in {:?}", ctx.ready_timeout());
    }
    rig.vent_mut().change_phase(BreathPhase::Inspiration);

    let tick = vcfg.timing.tick;
    let total = ticks_for(span, tick);
    let every = ticks_for(ctx.poll(), tick).max(1);
    let disconnect_tick = disconnect_at.map(|d| ticks_for(d, tick));
    let mut last_cycle = 0;
    for i in 0..total {
        if ctx.interrupted() {
            break;
        }
        if disconnect_tick == Some(i) {
            tracing::info!("breathing circuit opened");
            rig.handles().set_disconnected(true);
        }
        let r = rig.step();
        if let Some(t) = trace.as_mut()
            && i % every == 0
        {
            t.record(&rig.vent_mut().snapshot())?;
        }
        if rig.vent().cycle_count() > last_cycle {
            log_breath(&rig.vent_mut().snapshot());
        }
        last_cycle = rig.vent().cycle_count();
        if r.entered == Some(BreathPhase::Fault) {
            tracing::warn!(tick = r.tick, fault = ?r.fault, "simulated machine faulted");
        }
    }

    let last = rig.vent_mut().snapshot();
    let fault = rig.vent().fault();
    rig.vent_mut().shutdown()?;
    let rows = match trace {
        Some(t) => {
            let n = t.rows();
            t.finish()?;
            Some(n)
        }
        None => None,
    };
    emit_summary(ctx, &last, rows);
    match fault {
        Some(code) => Err(Faulted(code).into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_must_be_finite_and_positive() {
        assert_eq!(duration_arg("seconds", 1.5).unwrap(), Duration::from_millis(1_500));
        assert!(duration_arg("seconds", -1.0).is_err());
        assert!(duration_arg("seconds", f64::NAN).is_err());
        assert!(duration_arg("seconds", f64::INFINITY).is_err());
    }
}
