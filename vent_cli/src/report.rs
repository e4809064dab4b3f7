//! Operator-facing output: JSON objects in `--json` mode, short text otherwise.

use serde_json::{Value, json};
use vent_config::Settings;
use vent_core::{Diagnostics, Snapshot, StatsSnapshot};

fn round(v: f64, places: i32) -> f64 {
    let k = 10f64.powi(places);
    (v * k).round() / k
}

pub fn snapshot_json(s: &Snapshot) -> Value {
    json!({
        "phase": s.phase.name(),
        "cycle": s.cycle_count,
        "fault": s.fault.map(|f| f.code()),
        "uptime_ms": s.uptime_ms,
        "pressure_cmh2o": s.pressure_cmh2o.map(|p| round(p, 2)),
        "sensor_ok": s.sensor_ok,
        "angle_deg": s.actuator_angle_deg.map(|a| round(a, 2)),
        "target": {
            "bpm": s.target.breaths_per_minute,
            "vt_ml": s.target.tidal_volume_ml,
            "ie": [s.target.ie_inspiration, s.target.ie_expiration],
            "peep": s.target.peep_cmh2o,
            "pip": s.target.pip_cmh2o,
            "plateau_ms": s.target.plateau_time_ms,
        },
        "measured": {
            "pip": round(s.measured.pip, 2),
            "peep": round(s.measured.peep, 2),
            "plateau": round(s.measured.plateau_pressure, 2),
            "rr": round(s.measured.respiration_rate, 2),
            "ie": [round(s.measured.ie_i, 2), round(s.measured.ie_e, 2)],
            "vt_ml": round(s.measured.tidal_volume_ml, 1),
        },
        "alarm": {
            "level": s.alarm_level.map(|l| l.as_str()),
            "text": s.alarm_text,
            "active": s.active_alarms,
            "snoozed": s.snoozed,
        },
    })
}

pub fn snapshot_text(s: &Snapshot) -> String {
    let mut out = format!("phase {} cycle {}", s.phase, s.cycle_count);
    if let Some(f) = s.fault {
        out.push_str(&format!(" FAULT {f}"));
    }
    if let Some(a) = s.actuator_angle_deg {
        out.push_str(&format!(" | paddle {a:.1} deg"));
    }
    if let Some(p) = s.pressure_cmh2o {
        out.push_str(&format!(" | {p:.1} cmH2O"));
    }
    let m = &s.measured;
    out.push_str(&format!(
        "\nPIP {:.1} PEEP {:.1} Pplat {:.1} RR {:.1} I:E {:.1}:{:.1} Vt {:.0} ml",
        m.pip, m.peep, m.plateau_pressure, m.respiration_rate, m.ie_i, m.ie_e, m.tidal_volume_ml
    ));
    if !s.active_alarms.is_empty() {
        out.push_str(&format!(
            "\nalarms: {}{}",
            s.active_alarms.join(", "),
            if s.snoozed { " (snoozed)" } else { "" }
        ));
    }
    out
}

pub fn diagnostics_json(d: &Diagnostics) -> Value {
    let alarms: Vec<Value> = d
        .alarms
        .iter()
        .map(|a| {
            json!({
                "label": a.label,
                "level": a.level.as_str(),
                "on": a.on,
                "bad": a.consecutive_bad,
                "good": a.consecutive_good,
            })
        })
        .collect();
    json!({
        "phase": d.phase.name(),
        "phase_ticks": d.phase_ticks,
        "tick_count": d.tick_count,
        "homing": d.homing,
        "rolls_over": d.rolls_over,
        "angle_deg": d.actuator_angle_deg,
        "pressure_cmh2o": d.last_pressure_cmh2o,
        "sensor_ok": d.sensor_ok,
        "gauge": {
            "gain_psi_per_count": d.calibration.linear_gain,
            "offset_psi": d.calibration.linear_offset,
            "zero_counts": d.calibration.adc_zero_offset,
            "zero_kind": format!("{:?}", d.calibration.zero_kind),
        },
        "alarms": alarms,
    })
}

pub fn diagnostics_text(d: &Diagnostics) -> String {
    let mut out = format!(
        "phase {} ({} ticks) tick {} homing {}\nposition source rolls over: {}\n",
        d.phase, d.phase_ticks, d.tick_count, d.homing, d.rolls_over
    );
    match d.actuator_angle_deg {
        Some(a) => out.push_str(&format!("paddle {a:.2} deg\n")),
        None => out.push_str("paddle position unavailable\n"),
    }
    out.push_str(&format!(
        "gauge: {:.6} psi/count, offset {:.4} psi, zero {} ({:?}), sensor ok {}\n",
        d.calibration.linear_gain,
        d.calibration.linear_offset,
        d.calibration.adc_zero_offset,
        d.calibration.zero_kind,
        d.sensor_ok
    ));
    for a in &d.alarms {
        out.push_str(&format!(
            "  {:<18} {:<9} {:<3} bad {} good {}\n",
            a.label,
            a.level.as_str(),
            if a.on { "ON" } else { "-" },
            a.consecutive_bad,
            a.consecutive_good
        ));
    }
    out
}

pub fn settings_json(s: &Settings) -> Value {
    serde_json::to_value(s).unwrap_or(Value::Null)
}

pub fn settings_text(s: &Settings) -> String {
    format!(
        "serial {}\nbpm {} | vt {} ml | I:E {}:{} | peep {} | pip {} | plateau {} ms\nactuator zero {}",
        s.serial_id,
        s.respiration_rate,
        s.tidal_volume,
        s.ie_ratio_left,
        s.ie_ratio_right,
        s.peep_limit,
        s.pip_limit,
        s.plateau_time,
        s.actuator_home_offset
    )
}

pub fn stats_json(s: &StatsSnapshot, tick_hz: u64) -> Value {
    json!({
        "ticks": s.ticks,
        "overruns": s.overruns,
        "max_tick_us": s.max_tick_us,
        "tick_hz": tick_hz,
    })
}

/// Control loop stats, to stderr like the other diagnostics.
pub fn print_stats(s: &StatsSnapshot, tick_hz: u64) {
    eprintln!("\n--- Control Loop Stats ---");
    eprintln!("Ticks: {} at {tick_hz} Hz", s.ticks);
    eprintln!("Worst tick (us): {}", s.max_tick_us);
    eprintln!("Missed deadlines: {}", s.overruns);
    eprintln!("--------------------------\n");
}
