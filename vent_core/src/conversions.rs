//! `From` implementations bridging `vent_config` types to `vent_core` types.

use std::time::Duration;

use vent_config::settings::Settings;

use crate::actuator::Compliance;
use crate::config::{ActuatorCfg, AlarmCfg, SensorCfg, SensorElectrics, TimingCfg, VentCfg};
use crate::pressure::FlowOrder;
use crate::waveform::WaveformTarget;

// ── TimingCfg ────────────────────────────────────────────────────────────────

impl From<&vent_config::TimingCfg> for TimingCfg {
    fn from(c: &vent_config::TimingCfg) -> Self {
        Self {
            tick: Duration::from_micros(c.control_period_us),
            step_period: Duration::from_micros(c.step_period_us),
            startup: Duration::from_millis(c.startup_ms),
            stall_check: Duration::from_millis(c.stall_check_ms),
            homing_timeout: Duration::from_millis(c.homing_timeout_ms),
            min_peep_pause: Duration::from_millis(c.min_peep_pause_ms),
        }
    }
}

// ── ActuatorCfg ──────────────────────────────────────────────────────────────

impl From<&vent_config::ActuatorCfg> for ActuatorCfg {
    fn from(c: &vent_config::ActuatorCfg) -> Self {
        Self {
            steps_per_rev: Self::steps_per_rev_for(
                c.motor_deg_per_step,
                c.microstep,
                c.pinion_teeth,
                c.pulley_teeth,
            ),
            max_steps_per_sec: c.max_steps_per_sec,
            homing_steps_per_sec: c.homing_steps_per_sec,
            min_pos_deg: c.min_pos_deg,
            max_pos_deg: c.max_pos_deg,
            home_min_deg: c.home_min_deg,
            home_max_deg: c.home_max_deg,
            home_corr_move_deg: c.home_corr_move_deg,
            home_correction_max_deg: c.home_correction_max_deg,
            home_correction_min_deg: c.home_correction_min_deg,
            home_correction_steps_per_sec: c.home_correction_steps_per_sec,
            stall_min_move_deg: c.stall_min_move_deg,
            min_bag_volume_l: c.min_bag_volume_l,
            max_bag_volume_l: c.max_bag_volume_l,
        }
    }
}

impl From<vent_config::ComplianceKind> for Compliance {
    fn from(k: vent_config::ComplianceKind) -> Self {
        match k {
            vent_config::ComplianceKind::None => Self::None,
            vent_config::ComplianceKind::Twenty => Self::Twenty,
            vent_config::ComplianceKind::Fifty => Self::Fifty,
        }
    }
}

// ── Sensors ──────────────────────────────────────────────────────────────────

impl From<&vent_config::SensorsCfg> for SensorElectrics {
    fn from(c: &vent_config::SensorsCfg) -> Self {
        Self {
            adc_bits: c.adc_bits,
            adc_ref_v: c.adc_ref_v,
            supply_v: c.supply_v,
            r1_ohm: c.divider_r1_ohm,
            r2_ohm: c.divider_r2_ohm,
        }
    }
}

impl From<&vent_config::SensorsCfg> for SensorCfg {
    fn from(c: &vent_config::SensorsCfg) -> Self {
        Self {
            electrics: SensorElectrics::from(c),
            gauge_psi: (c.gauge_max_psi, c.gauge_min_psi),
            // validated config never hits the fallback
            differential_psi: c.differential_range_psi().unwrap_or((0.07, -0.07)),
            zero_samples: c.zero_samples,
        }
    }
}

impl From<vent_config::FlowOrderKind> for FlowOrder {
    fn from(k: vent_config::FlowOrderKind) -> Self {
        match k {
            vent_config::FlowOrderKind::First => Self::First,
            vent_config::FlowOrderKind::Second => Self::Second,
            vent_config::FlowOrderKind::Third => Self::Third,
        }
    }
}

// ── AlarmCfg ─────────────────────────────────────────────────────────────────

impl From<&vent_config::AlarmsCfg> for AlarmCfg {
    fn from(c: &vent_config::AlarmsCfg) -> Self {
        Self {
            display_time: Duration::from_millis(c.display_ms),
            snooze_time: Duration::from_millis(c.snooze_ms),
            pressure_max_cmh2o: c.pressure_max_cmh2o,
            max_pip_plateau_delta_cmh2o: c.max_pip_plateau_delta_cmh2o,
            min_tidal_pressure_cmh2o: c.min_tidal_pressure_cmh2o,
            unmet_volume_ratio: c.unmet_volume_ratio,
        }
    }
}

impl From<&vent_config::Config> for VentCfg {
    fn from(c: &vent_config::Config) -> Self {
        Self {
            timing: TimingCfg::from(&c.timing),
            actuator: ActuatorCfg::from(&c.actuator),
            sensors: SensorCfg::from(&c.sensors),
            alarms: AlarmCfg::from(&c.alarms),
            compliance: Compliance::from(c.actuator.compliance),
        }
    }
}

// ── Persisted targets ────────────────────────────────────────────────────────

impl From<&Settings> for WaveformTarget {
    fn from(s: &Settings) -> Self {
        Self {
            breaths_per_minute: f64::from(s.respiration_rate),
            tidal_volume_ml: f64::from(s.tidal_volume),
            ie_inspiration: s.ie_ratio_left,
            ie_expiration: s.ie_ratio_right,
            peep_cmh2o: f64::from(s.peep_limit),
            pip_cmh2o: f64::from(s.pip_limit),
            plateau_time_ms: f64::from(s.plateau_time),
        }
    }
}

/// Copy breath targets into a settings record, rounding to the stored widths.
pub fn store_target(settings: &mut Settings, t: &WaveformTarget) {
    settings.respiration_rate = t.breaths_per_minute.round() as u8;
    settings.tidal_volume = t.tidal_volume_ml.round() as u16;
    settings.ie_ratio_left = t.ie_inspiration;
    settings.ie_ratio_right = t.ie_expiration;
    settings.peep_limit = t.peep_cmh2o.round() as u8;
    settings.pip_limit = t.pip_cmh2o.round() as u8;
    settings.plateau_time = t.plateau_time_ms.round() as u16;
}
