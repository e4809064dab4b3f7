#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Config schemas and persisted operator settings for the ventilator.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//!   Every section has defaults, so an empty file is a valid config.
//! - `Settings` is the checksummed record the operator edits at run time
//!   (targets, serial id, actuator zero); see [`settings`].
use serde::Deserialize;

mod atomic;
pub mod settings;

pub use settings::{FileSettingsStore, Settings, SettingsStore};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimingCfg {
    /// Control tick period (µs).
    pub control_period_us: u64,
    /// Actuator step-service period (µs).
    pub step_period_us: u64,
    /// Time spent in Startup before dropping to Off (ms).
    pub startup_ms: u64,
    /// Homing settle delay before stall detection starts (ms).
    pub stall_check_ms: u64,
    /// Homing gives up after this long (ms).
    pub homing_timeout_ms: u64,
    /// Minimum pause at end of expiration before PEEP is sampled (ms).
    pub min_peep_pause_ms: u64,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            control_period_us: 20_000,
            step_period_us: 50,
            startup_ms: 2_000,
            stall_check_ms: 400,
            homing_timeout_ms: 12_000,
            min_peep_pause_ms: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PositionSourceKind {
    /// Dead reckoning from the drive's step counter.
    #[default]
    Steps,
    /// Absolute magnetic encoder on the paddle shaft.
    Encoder,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceKind {
    None,
    Twenty,
    #[default]
    Fifty,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ActuatorCfg {
    pub motor_deg_per_step: f64,
    pub microstep: u32,
    pub pinion_teeth: u32,
    pub pulley_teeth: u32,
    pub max_steps_per_sec: f64,
    pub homing_steps_per_sec: f64,
    pub min_pos_deg: f64,
    pub max_pos_deg: f64,
    pub home_min_deg: f64,
    pub home_max_deg: f64,
    pub home_corr_move_deg: f64,
    pub home_correction_max_deg: f64,
    pub home_correction_min_deg: f64,
    pub home_correction_steps_per_sec: f64,
    /// Movement below this between two checks counts as stalled.
    pub stall_min_move_deg: f64,
    pub position_source: PositionSourceKind,
    pub compliance: ComplianceKind,
    pub min_bag_volume_l: f64,
    pub max_bag_volume_l: f64,
}

impl Default for ActuatorCfg {
    fn default() -> Self {
        Self {
            motor_deg_per_step: 1.8,
            microstep: 1,
            pinion_teeth: 14,
            pulley_teeth: 60,
            max_steps_per_sec: 600.0,
            homing_steps_per_sec: 100.0,
            min_pos_deg: 0.0,
            max_pos_deg: 180.0,
            home_min_deg: 0.2,
            home_max_deg: 1.0,
            home_corr_move_deg: 0.5,
            home_correction_max_deg: 5.0,
            home_correction_min_deg: 355.0,
            home_correction_steps_per_sec: 100.0,
            stall_min_move_deg: 0.5,
            position_source: PositionSourceKind::Steps,
            compliance: ComplianceKind::Fifty,
            min_bag_volume_l: 0.1,
            max_bag_volume_l: 1.06,
        }
    }
}

impl ActuatorCfg {
    /// Output-shaft degrees covered by the fewest whole steps a homing sweep
    /// issues in one control period.
    pub fn homing_min_deg_per_tick(&self, control_period_us: u64) -> f64 {
        let motor_steps = 360.0 / (self.motor_deg_per_step / f64::from(self.microstep.max(1)));
        let steps_per_rev =
            motor_steps * f64::from(self.pulley_teeth) / f64::from(self.pinion_teeth.max(1));
        let period_s = std::time::Duration::from_micros(control_period_us).as_secs_f64();
        let steps = (self.homing_steps_per_sec * period_s).floor();
        steps * 360.0 / steps_per_rev
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlowOrderKind {
    First,
    Second,
    #[default]
    Third,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SensorsCfg {
    pub adc_bits: u8,
    pub adc_ref_v: f64,
    pub supply_v: f64,
    pub divider_r1_ohm: f64,
    pub divider_r2_ohm: f64,
    pub gauge_max_psi: f64,
    pub gauge_min_psi: f64,
    /// Differential transducer variant: 0 = ±0.07 psi, 1 = ±0.09 psi.
    pub differential_type: u8,
    /// Samples averaged by a zero calibration.
    pub zero_samples: u32,
    pub flow_order: FlowOrderKind,
}

impl Default for SensorsCfg {
    fn default() -> Self {
        Self {
            adc_bits: 12,
            adc_ref_v: 3.3,
            supply_v: 5.0,
            divider_r1_ohm: 100_000.0,
            divider_r2_ohm: 196_000.0,
            gauge_max_psi: 1.0,
            gauge_min_psi: 0.0,
            differential_type: 0,
            zero_samples: 100,
            flow_order: FlowOrderKind::Third,
        }
    }
}

impl SensorsCfg {
    /// Rated `(max, min)` psi of the configured differential transducer.
    pub fn differential_range_psi(&self) -> Option<(f64, f64)> {
        match self.differential_type {
            0 => Some((0.07, -0.07)),
            1 => Some((0.09, -0.09)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlarmsCfg {
    /// How long each active alarm stays on the display (ms).
    pub display_ms: u64,
    /// Audio silence duration after a snooze (ms).
    pub snooze_ms: u64,
    /// Absolute high-pressure ceiling regardless of the PIP limit (cmH2O).
    pub pressure_max_cmh2o: f64,
    /// Peak minus plateau above this raises HIGH RESIST PRESSURE.
    pub max_pip_plateau_delta_cmh2o: f64,
    /// Peak minus PEEP below this raises NO TIDAL PRESSURE.
    pub min_tidal_pressure_cmh2o: f64,
    /// Delivered/target volume below this raises UNMET TIDAL VOLUME.
    pub unmet_volume_ratio: f64,
}

impl Default for AlarmsCfg {
    fn default() -> Self {
        Self {
            display_ms: 2_000,
            snooze_ms: 30_000,
            pressure_max_cmh2o: 41.0,
            max_pip_plateau_delta_cmh2o: 10.0,
            min_tidal_pressure_cmh2o: 2.0,
            unmet_volume_ratio: 0.9,
        }
    }
}

/// Inclusive `[min, max]` range for an operator-adjustable value.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, v: f64) -> bool {
        v.is_finite() && v >= self.min && v <= self.max
    }
}

/// Ranges enforced at the command-line / UI boundary.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LimitsCfg {
    pub bpm: Range,
    pub tidal_volume_ml: Range,
    pub ie: Range,
    pub peep_cmh2o: Range,
    pub pip_cmh2o: Range,
    pub plateau_ms: Range,
}

impl Default for LimitsCfg {
    fn default() -> Self {
        Self {
            bpm: Range::new(8.0, 30.0),
            tidal_volume_ml: Range::new(100.0, 1060.0),
            ie: Range::new(0.5, 4.0),
            peep_cmh2o: Range::new(5.0, 20.0),
            pip_cmh2o: Range::new(15.0, 40.0),
            plateau_ms: Range::new(100.0, 300.0),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RunnerCfg {
    /// Request SCHED_FIFO for the control tick thread.
    pub realtime: bool,
    pub rt_priority: i32,
    pub lock_memory: bool,
    pub cpu: Option<usize>,
    /// How often the front end polls the published snapshot (ms).
    pub snapshot_poll_ms: u64,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            realtime: false,
            rt_priority: 50,
            lock_memory: false,
            cpu: None,
            snapshot_poll_ms: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Pins {
    pub motor_step: u8,
    pub motor_dir: u8,
    pub motor_en: Option<u8>,
    pub spi_bus: u8,
    pub spi_cs: u8,
    pub gauge_channel: u8,
    pub differential_channel: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            motor_step: 23,
            motor_dir: 24,
            motor_en: Some(25),
            spi_bus: 0,
            spi_cs: 0,
            gauge_channel: 0,
            differential_channel: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SettingsCfg {
    /// Where the checksummed operator settings live.
    pub path: String,
}

impl Default for SettingsCfg {
    fn default() -> Self {
        Self {
            path: "ventilator-settings.toml".into(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub timing: TimingCfg,
    pub actuator: ActuatorCfg,
    pub sensors: SensorsCfg,
    pub alarms: AlarmsCfg,
    pub limits: LimitsCfg,
    pub logging: Logging,
    pub runner: RunnerCfg,
    pub pins: Pins,
    pub settings: SettingsCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn check_range(name: &str, r: &Range) -> eyre::Result<()> {
    if !(r.min.is_finite() && r.max.is_finite()) || r.min > r.max {
        eyre::bail!("limits.{name} must have finite min <= max");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Timing
        let t = &self.timing;
        if t.control_period_us == 0 {
            eyre::bail!("timing.control_period_us must be > 0");
        }
        if t.step_period_us == 0 {
            eyre::bail!("timing.step_period_us must be > 0");
        }
        if t.step_period_us >= t.control_period_us {
            eyre::bail!("timing.step_period_us must be shorter than timing.control_period_us");
        }
        if t.stall_check_ms >= t.homing_timeout_ms {
            eyre::bail!("timing.stall_check_ms must be < timing.homing_timeout_ms");
        }
        if t.homing_timeout_ms > 10 * 60 * 1000 {
            eyre::bail!("timing.homing_timeout_ms is unreasonably large (>10min)");
        }

        // Actuator
        let a = &self.actuator;
        if !(a.motor_deg_per_step > 0.0 && a.motor_deg_per_step <= 90.0) {
            eyre::bail!("actuator.motor_deg_per_step must be in (0, 90]");
        }
        if a.microstep == 0 {
            eyre::bail!("actuator.microstep must be >= 1");
        }
        if a.pinion_teeth == 0 || a.pulley_teeth == 0 {
            eyre::bail!("actuator.pinion_teeth and actuator.pulley_teeth must be > 0");
        }
        if a.max_steps_per_sec <= 0.0 {
            eyre::bail!("actuator.max_steps_per_sec must be > 0");
        }
        if a.homing_steps_per_sec <= 0.0 || a.homing_steps_per_sec > a.max_steps_per_sec {
            eyre::bail!("actuator.homing_steps_per_sec must be in (0, max_steps_per_sec]");
        }
        if a.home_correction_steps_per_sec <= 0.0 {
            eyre::bail!("actuator.home_correction_steps_per_sec must be > 0");
        }
        if !(0.0..360.0).contains(&a.min_pos_deg) || a.max_pos_deg <= a.min_pos_deg {
            eyre::bail!("actuator.min_pos_deg must be in [0, 360) and below actuator.max_pos_deg");
        }
        if a.max_pos_deg > 360.0 {
            eyre::bail!("actuator.max_pos_deg must be <= 360");
        }
        if !(a.home_min_deg >= 0.0 && a.home_min_deg < a.home_max_deg) {
            eyre::bail!("actuator.home_min_deg must be >= 0 and below actuator.home_max_deg");
        }
        if !(a.home_max_deg < a.home_correction_max_deg
            && a.home_correction_max_deg < a.home_correction_min_deg
            && a.home_correction_min_deg < 360.0)
        {
            eyre::bail!(
                "actuator home bands must satisfy home_max_deg < home_correction_max_deg < home_correction_min_deg < 360"
            );
        }
        if a.home_corr_move_deg <= 0.0 {
            eyre::bail!("actuator.home_corr_move_deg must be > 0");
        }
        if a.stall_min_move_deg < 0.0 {
            eyre::bail!("actuator.stall_min_move_deg must be >= 0");
        }
        // The stall check compares positions one control tick apart, so the
        // slowest tick of a homing sweep must still clear the threshold.
        let homing_deg_per_tick = a.homing_min_deg_per_tick(t.control_period_us);
        if homing_deg_per_tick <= a.stall_min_move_deg {
            eyre::bail!(
                "actuator.homing_steps_per_sec is too slow: homing moves {homing_deg_per_tick:.2} deg per control tick, not more than actuator.stall_min_move_deg ({:.2})",
                a.stall_min_move_deg
            );
        }
        if !(a.min_bag_volume_l > 0.0 && a.min_bag_volume_l < a.max_bag_volume_l) {
            eyre::bail!("actuator.min_bag_volume_l must be > 0 and below actuator.max_bag_volume_l");
        }

        // Sensors
        let s = &self.sensors;
        if !(1..=24).contains(&s.adc_bits) {
            eyre::bail!("sensors.adc_bits must be in [1, 24]");
        }
        if s.adc_ref_v <= 0.0 || s.supply_v <= 0.0 {
            eyre::bail!("sensors.adc_ref_v and sensors.supply_v must be > 0");
        }
        if s.divider_r1_ohm < 0.0 || s.divider_r2_ohm <= 0.0 {
            eyre::bail!("sensors.divider_r1_ohm must be >= 0 and sensors.divider_r2_ohm > 0");
        }
        if s.gauge_max_psi <= s.gauge_min_psi {
            eyre::bail!("sensors.gauge_max_psi must be > sensors.gauge_min_psi");
        }
        if s.differential_range_psi().is_none() {
            eyre::bail!("sensors.differential_type must be 0 or 1");
        }
        if s.zero_samples == 0 {
            eyre::bail!("sensors.zero_samples must be >= 1");
        }

        // Alarms
        let al = &self.alarms;
        if al.display_ms == 0 {
            eyre::bail!("alarms.display_ms must be >= 1");
        }
        if al.snooze_ms == 0 {
            eyre::bail!("alarms.snooze_ms must be >= 1");
        }
        if !(al.unmet_volume_ratio > 0.0 && al.unmet_volume_ratio <= 1.0) {
            eyre::bail!("alarms.unmet_volume_ratio must be in (0.0, 1.0]");
        }
        if al.max_pip_plateau_delta_cmh2o < 0.0 || al.min_tidal_pressure_cmh2o < 0.0 {
            eyre::bail!("alarms pressure deltas must be >= 0");
        }

        // Limits
        let l = &self.limits;
        check_range("bpm", &l.bpm)?;
        check_range("tidal_volume_ml", &l.tidal_volume_ml)?;
        check_range("ie", &l.ie)?;
        check_range("peep_cmh2o", &l.peep_cmh2o)?;
        check_range("pip_cmh2o", &l.pip_cmh2o)?;
        check_range("plateau_ms", &l.plateau_ms)?;
        if l.bpm.min <= 0.0 {
            eyre::bail!("limits.bpm.min must be > 0");
        }
        if l.ie.min <= 0.0 {
            eyre::bail!("limits.ie.min must be > 0");
        }

        // Runner
        if self.runner.realtime && !(1..=99).contains(&self.runner.rt_priority) {
            eyre::bail!("runner.rt_priority must be in [1, 99]");
        }
        if self.runner.snapshot_poll_ms == 0 {
            eyre::bail!("runner.snapshot_poll_ms must be >= 1");
        }

        if self.settings.path.trim().is_empty() {
            eyre::bail!("settings.path must not be empty");
        }

        Ok(())
    }
}
