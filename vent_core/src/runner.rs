//! Threads that drive a `Ventilator` in real time.
//!
//! Two threads are spawned:
//! - the control thread owns the ventilator, drains operator requests, runs
//!   one `tick()` per period and publishes snapshots;
//! - the step thread services the stepper drive at a much shorter period so
//!   motion stays smooth whatever the control thread is doing.
//!
//! Requests are only ever applied on the control thread, between ticks, so
//! phase changes never race with the tick. Both threads stop when the
//! `VentRunner` is shut down or dropped.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel as xch;
use vent_traits::{Clock, PositionSource, PressureAdc, StepperDrive};

use crate::error::{FaultCode, VentError};
use crate::machine::Ventilator;
use crate::phase::BreathPhase;
use crate::status::{Diagnostics, LiveStatus, Snapshot};
use crate::util::ticks_for;
use crate::waveform::TargetField;

/// Operator write requests, applied on the control thread.
#[derive(Debug)]
pub enum Request {
    ChangePhase(BreathPhase),
    SetTarget(TargetField, f64),
    ForceFault(FaultCode),
    Jog { delta_deg: f64, deg_per_s: f64 },
    Snooze,
    ToggleSnooze,
    ZeroActuator(xch::Sender<Result<Option<u16>, VentError>>),
    Diagnostics(xch::Sender<Diagnostics>),
    Shutdown,
}

/// Apply one request. Returns false when the control loop should stop.
pub fn apply_request<D, P, G>(vent: &mut Ventilator<D, P, G>, req: Request) -> bool
where
    D: StepperDrive,
    P: PositionSource,
    G: PressureAdc,
{
    match req {
        Request::ChangePhase(p) => vent.change_phase(p),
        Request::SetTarget(field, value) => {
            if let Err(e) = vent.set_target(field, value) {
                tracing::warn!(error = %e, "target change rejected");
            }
        }
        Request::ForceFault(code) => vent.force_fault(code),
        Request::Jog {
            delta_deg,
            deg_per_s,
        } => {
            if let Err(e) = vent.jog(delta_deg, deg_per_s) {
                tracing::warn!(error = %e, "jog rejected");
            }
        }
        Request::Snooze => vent.snooze_alarms(),
        Request::ToggleSnooze => {
            vent.toggle_snooze();
        }
        Request::ZeroActuator(reply) => {
            // requester may have given up waiting
            let _ = reply.send(vent.zero_actuator());
        }
        Request::Diagnostics(reply) => {
            let _ = reply.send(vent.diagnostics());
        }
        Request::Shutdown => return false,
    }
    true
}

pub struct RunnerOpts {
    pub tick: Duration,
    pub step_period: Duration,
    /// How often a full snapshot is published. Phase entries always publish.
    pub snapshot_period: Duration,
    /// Runs first thing on the control thread (real-time priority, affinity).
    pub on_control_start: Option<Box<dyn FnOnce() + Send>>,
}

impl core::fmt::Debug for RunnerOpts {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RunnerOpts")
            .field("tick", &self.tick)
            .field("step_period", &self.step_period)
            .field("snapshot_period", &self.snapshot_period)
            .finish_non_exhaustive()
    }
}

impl Default for RunnerOpts {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(20),
            step_period: Duration::from_micros(50),
            snapshot_period: Duration::from_millis(200),
            on_control_start: None,
        }
    }
}

/// Control-loop timing counters.
#[derive(Debug, Default)]
pub struct RunnerStats {
    ticks: AtomicU64,
    overruns: AtomicU64,
    max_tick_us: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub ticks: u64,
    /// Ticks that finished after their deadline.
    pub overruns: u64,
    pub max_tick_us: u64,
}

impl RunnerStats {
    fn record(&self, took: Duration, overrun: bool) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        if overrun {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
        let us = u64::try_from(took.as_micros()).unwrap_or(u64::MAX);
        self.max_tick_us.fetch_max(us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            max_tick_us: self.max_tick_us.load(Ordering::Relaxed),
        }
    }
}

type SharedSnapshot = Arc<Mutex<Option<Snapshot>>>;

pub struct VentRunner {
    tx: xch::Sender<Request>,
    snapshot: SharedSnapshot,
    live: Arc<LiveStatus>,
    stats: Arc<RunnerStats>,
    stop: Arc<AtomicBool>,
    control: Option<JoinHandle<()>>,
    stepper: Option<JoinHandle<()>>,
}

impl core::fmt::Debug for VentRunner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VentRunner")
            .field("phase", &self.live.phase())
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

impl VentRunner {
    pub fn spawn<D, P, G>(
        mut vent: Ventilator<D, P, G>,
        clock: Arc<dyn Clock + Send + Sync>,
        mut opts: RunnerOpts,
    ) -> Self
    where
        D: StepperDrive + Send + 'static,
        P: PositionSource + Send + 'static,
        G: PressureAdc + Send + 'static,
    {
        let (tx, rx) = xch::unbounded::<Request>();
        let snapshot: SharedSnapshot = Arc::new(Mutex::new(None));
        let stats = Arc::new(RunnerStats::default());
        let stop = Arc::new(AtomicBool::new(false));
        let live = vent.live();
        let drive = vent.actuator().drive_handle();

        let step_stop = Arc::clone(&stop);
        let step_clock = Arc::clone(&clock);
        let step_period = opts.step_period;
        let stepper = std::thread::spawn(move || {
            let mut failing = false;
            while !step_stop.load(Ordering::Relaxed) {
                let res = match drive.lock() {
                    Ok(mut d) => d.run().map(|_| ()),
                    Err(_) => {
                        tracing::error!("drive lock poisoned; step service stopping");
                        break;
                    }
                };
                match res {
                    Err(e) if !failing => {
                        tracing::warn!(error = %e, "step service error");
                        failing = true;
                    }
                    Ok(()) => failing = false,
                    Err(_) => {}
                }
                step_clock.sleep(step_period);
            }
            tracing::trace!("step thread exiting");
        });

        let ctl_stop = Arc::clone(&stop);
        let ctl_snapshot = Arc::clone(&snapshot);
        let ctl_stats = Arc::clone(&stats);
        let tick = opts.tick;
        let publish_every = u64::from(ticks_for(opts.snapshot_period, tick));
        let on_start = opts.on_control_start.take();
        let control = std::thread::spawn(move || {
            if let Some(f) = on_start {
                f();
            }
            let publish = |vent: &mut Ventilator<D, P, G>| {
                let snap = vent.snapshot();
                if let Ok(mut slot) = ctl_snapshot.lock() {
                    *slot = Some(snap);
                }
            };
            publish(&mut vent);
            let mut deadline = clock.now() + tick;
            'control: loop {
                if ctl_stop.load(Ordering::Relaxed) {
                    break;
                }
                for req in rx.try_iter() {
                    if !apply_request(&mut vent, req) {
                        break 'control;
                    }
                }
                let started = clock.now();
                let report = vent.tick();
                if report.entered.is_some() || report.tick % publish_every == 0 {
                    publish(&mut vent);
                }
                let now = clock.now();
                let overrun = now > deadline;
                ctl_stats.record(now.saturating_duration_since(started), overrun);
                if overrun {
                    tracing::trace!(late_us = ?now.saturating_duration_since(deadline), "tick overrun");
                    deadline = now + tick;
                } else {
                    clock.sleep(deadline.saturating_duration_since(now));
                    deadline += tick;
                }
            }
            if let Err(e) = vent.shutdown() {
                tracing::warn!(error = %e, "actuator stop failed during shutdown");
            }
            publish(&mut vent);
            ctl_stop.store(true, Ordering::Relaxed);
            tracing::debug!("control thread exiting");
        });

        Self {
            tx,
            snapshot,
            live,
            stats,
            stop,
            control: Some(control),
            stepper: Some(stepper),
        }
    }

    /// Queue a request for the control thread.
    pub fn request(&self, req: Request) -> Result<(), VentError> {
        self.tx
            .send(req)
            .map_err(|_| VentError::State("control thread has stopped".into()))
    }

    /// Zero the actuator on the control thread and wait for the result.
    pub fn zero_actuator(&self, timeout: Duration) -> Result<Option<u16>, VentError> {
        let (tx, rx) = xch::bounded(1);
        self.request(Request::ZeroActuator(tx))?;
        rx.recv_timeout(timeout)
            .map_err(|_| VentError::State("no reply from control thread".into()))?
    }

    pub fn diagnostics(&self, timeout: Duration) -> Result<Diagnostics, VentError> {
        let (tx, rx) = xch::bounded(1);
        self.request(Request::Diagnostics(tx))?;
        rx.recv_timeout(timeout)
            .map_err(|_| VentError::State("no reply from control thread".into()))
    }

    /// Most recently published snapshot.
    pub fn latest(&self) -> Option<Snapshot> {
        self.snapshot.lock().ok().and_then(|s| s.clone())
    }

    pub fn live(&self) -> &LiveStatus {
        &self.live
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::Relaxed)
    }

    /// Stop both threads, parking the ventilator in Off. Returns the final
    /// snapshot.
    pub fn shutdown(mut self) -> Option<Snapshot> {
        self.join_all();
        self.latest()
    }

    fn join_all(&mut self) {
        let _ = self.tx.send(Request::Shutdown);
        if let Some(h) = self.control.take()
            && h.join().is_err()
        {
            tracing::warn!("control thread panicked");
        }
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.stepper.take()
            && h.join().is_err()
        {
            tracing::warn!("step thread panicked");
        }
    }
}

impl Drop for VentRunner {
    fn drop(&mut self) {
        self.join_all();
    }
}
