//! CSV breath trace: one row per published snapshot.

use std::io::Write;
use std::path::Path;

use eyre::WrapErr;
use vent_core::Snapshot;

const HEADER: [&str; 12] = [
    "uptime_ms",
    "phase",
    "cycle",
    "pressure_cmh2o",
    "angle_deg",
    "command_deg",
    "pip",
    "peep",
    "plateau",
    "rr",
    "vt_ml",
    "alarm",
];

fn opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.3}")).unwrap_or_default()
}

pub struct TraceWriter<W: Write> {
    out: csv::Writer<W>,
    last_uptime: Option<u64>,
    rows: u64,
}

impl TraceWriter<std::fs::File> {
    pub fn create(path: &Path) -> eyre::Result<Self> {
        let out = csv::Writer::from_path(path)
            .wrap_err_with(|| format!("create trace {}", path.display()))?;
        Self::new(out)
    }
}

impl<W: Write> TraceWriter<W> {
    pub fn from_writer(w: W) -> eyre::Result<Self> {
        Self::new(csv::Writer::from_writer(w))
    }

    fn new(mut out: csv::Writer<W>) -> eyre::Result<Self> {
        out.write_record(HEADER).wrap_err("write trace header")?;
        Ok(Self {
            out,
            last_uptime: None,
            rows: 0,
        })
    }

    /// Append `s` unless it is the same snapshot as the previous row.
    pub fn record(&mut self, s: &Snapshot) -> eyre::Result<()> {
        if self.last_uptime == Some(s.uptime_ms) {
            return Ok(());
        }
        self.last_uptime = Some(s.uptime_ms);
        let m = &s.measured;
        self.out
            .write_record([
                s.uptime_ms.to_string(),
                s.phase.name().to_string(),
                s.cycle_count.to_string(),
                opt(s.pressure_cmh2o),
                opt(s.actuator_angle_deg),
                format!("{:.3}", s.command.target_angle_deg),
                format!("{:.3}", m.pip),
                format!("{:.3}", m.peep),
                format!("{:.3}", m.plateau_pressure),
                format!("{:.3}", m.respiration_rate),
                format!("{:.1}", m.tidal_volume_ml),
                s.alarm_text.unwrap_or_default().to_string(),
            ])
            .wrap_err("write trace row")?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn finish(mut self) -> eyre::Result<W> {
        self.out.flush().wrap_err("flush trace")?;
        self.out
            .into_inner()
            .map_err(|e| eyre::eyre!("finish trace: {}", e.error()))
    }
}
