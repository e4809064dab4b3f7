//! Runtime configuration for the control core.
//!
//! These are separate from the TOML-deserialized config in `vent_config`;
//! see `conversions` for the mapping.
use std::time::Duration;

/// Tick-level timing of the state machine.
#[derive(Debug, Clone)]
pub struct TimingCfg {
    /// Control tick period.
    pub tick: Duration,
    /// Actuator step-service period.
    pub step_period: Duration,
    /// Startup dwell before the machine drops to Off.
    pub startup: Duration,
    /// Homing settle delay before stall detection starts.
    pub stall_check: Duration,
    /// Homing gives up after this long.
    pub homing_timeout: Duration,
    /// Added to expiration before PEEP is sampled.
    pub min_peep_pause: Duration,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(20),
            step_period: Duration::from_micros(50),
            startup: Duration::from_millis(2_000),
            stall_check: Duration::from_millis(400),
            homing_timeout: Duration::from_millis(12_000),
            min_peep_pause: Duration::from_millis(50),
        }
    }
}

/// Mechanics and limits of the paddle actuator.
#[derive(Debug, Clone)]
pub struct ActuatorCfg {
    /// Drive steps per revolution of the paddle shaft (motor steps × gear ratio).
    pub steps_per_rev: f64,
    pub max_steps_per_sec: f64,
    pub homing_steps_per_sec: f64,
    pub min_pos_deg: f64,
    pub max_pos_deg: f64,
    /// Home window `[home_min_deg, home_max_deg]`.
    pub home_min_deg: f64,
    pub home_max_deg: f64,
    /// Size of one homing correction nudge.
    pub home_corr_move_deg: f64,
    /// Positions in `(home_max_deg, home_correction_max_deg]` are nudged back.
    pub home_correction_max_deg: f64,
    /// Positions in `(home_correction_min_deg, 360)` are nudged forward.
    pub home_correction_min_deg: f64,
    pub home_correction_steps_per_sec: f64,
    /// Movement at or below this between two `is_moving` checks counts as stalled.
    pub stall_min_move_deg: f64,
    pub min_bag_volume_l: f64,
    pub max_bag_volume_l: f64,
}

impl ActuatorCfg {
    /// Output-shaft steps per revolution from motor step angle, microstepping
    /// and belt reduction.
    pub fn steps_per_rev_for(
        motor_deg_per_step: f64,
        microstep: u32,
        pinion_teeth: u32,
        pulley_teeth: u32,
    ) -> f64 {
        let motor_steps = 360.0 / (motor_deg_per_step / f64::from(microstep.max(1)));
        let gear_ratio = f64::from(pulley_teeth) / f64::from(pinion_teeth.max(1));
        motor_steps * gear_ratio
    }
}

impl Default for ActuatorCfg {
    fn default() -> Self {
        Self {
            steps_per_rev: Self::steps_per_rev_for(1.8, 1, 14, 60),
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
            min_bag_volume_l: 0.1,
            max_bag_volume_l: 1.06,
        }
    }
}

/// ADC and divider between a transducer and the converter input.
#[derive(Debug, Clone, Copy)]
pub struct SensorElectrics {
    pub adc_bits: u8,
    pub adc_ref_v: f64,
    pub supply_v: f64,
    pub r1_ohm: f64,
    pub r2_ohm: f64,
}

impl Default for SensorElectrics {
    fn default() -> Self {
        Self {
            adc_bits: 12,
            adc_ref_v: 3.3,
            supply_v: 5.0,
            r1_ohm: 100_000.0,
            r2_ohm: 196_000.0,
        }
    }
}

impl SensorElectrics {
    pub fn full_scale(&self) -> i32 {
        1_i32 << self.adc_bits.min(30)
    }
}

/// Pressure sensing setup for the gauge and differential channels.
#[derive(Debug, Clone)]
pub struct SensorCfg {
    pub electrics: SensorElectrics,
    /// Gauge transducer rating `(max, min)` in psi.
    pub gauge_psi: (f64, f64),
    /// Differential transducer rating `(max, min)` in psi.
    pub differential_psi: (f64, f64),
    pub zero_samples: u32,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            electrics: SensorElectrics::default(),
            gauge_psi: (1.0, 0.0),
            differential_psi: (0.07, -0.07),
            zero_samples: 100,
        }
    }
}

/// Alarm display, snooze and evaluation thresholds.
#[derive(Debug, Clone)]
pub struct AlarmCfg {
    pub display_time: Duration,
    pub snooze_time: Duration,
    pub pressure_max_cmh2o: f64,
    pub max_pip_plateau_delta_cmh2o: f64,
    pub min_tidal_pressure_cmh2o: f64,
    pub unmet_volume_ratio: f64,
}

impl Default for AlarmCfg {
    fn default() -> Self {
        Self {
            display_time: Duration::from_millis(2_000),
            snooze_time: Duration::from_secs(30),
            pressure_max_cmh2o: 41.0,
            max_pip_plateau_delta_cmh2o: 10.0,
            min_tidal_pressure_cmh2o: 2.0,
            unmet_volume_ratio: 0.9,
        }
    }
}

/// Everything the state machine needs besides its hardware.
#[derive(Debug, Clone, Default)]
pub struct VentCfg {
    pub timing: TimingCfg,
    pub actuator: ActuatorCfg,
    pub sensors: SensorCfg,
    pub alarms: AlarmCfg,
    pub compliance: crate::actuator::Compliance,
}
