//! Paddle actuator: trajectory planning, homing and bag compliance.
//!
//! Angles are paddle-shaft degrees. The drive works in steps; conversion uses
//! `ActuatorCfg::steps_per_rev`. The drive sits behind a mutex so a separate
//! step-service thread can call `run()` while the control loop commands it.
use std::sync::{Arc, Mutex, MutexGuard};

use vent_traits::{HwResult, PositionSource, StepperDrive};

use crate::config::ActuatorCfg;
use crate::error::VentError;
use crate::hw_error::hw;
use crate::util::angular_distance_deg;

pub type SharedDrive<D> = Arc<Mutex<D>>;

/// Bag compliance profile used to map paddle angle to delivered volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compliance {
    None,
    Twenty,
    #[default]
    Fifty,
}

impl Compliance {
    /// Degrees to litres, quartic without constant term.
    const fn d2v(self) -> [f64; 4] {
        match self {
            Self::None => [
                -5.392_594_229_463_78e-9,
                1.370_064_649_798_86e-6,
                -3.705_485_411_664_71e-5,
                2.602_549_606_347_54e-4,
            ],
            Self::Twenty => [
                -3.185_092_076_767_39e-9,
                8.688_551_161_731_89e-7,
                -2.786_324_333_323_15e-5,
                -7.031_874_426_743_91e-5,
            ],
            Self::Fifty => [
                -3.425_202_168_789_51e-9,
                8.347_680_848_376_07e-7,
                -3.059_681_378_952_96e-6,
                -6.435_161_604_496_64e-4,
            ],
        }
    }

    /// Litres to degrees, cubic.
    const fn v2d(self) -> [f64; 4] {
        match self {
            Self::None => [227.42, -424.84, 309.29, 26.668],
            Self::Twenty => [612.61, -812.82, 436.56, 34.416],
            Self::Fifty => [263.07, -449.69, 321.88, 30.01],
        }
    }

    /// Bag volume in litres displaced at `deg`.
    pub fn volume_l(self, deg: f64, cfg: &ActuatorCfg) -> f64 {
        let [a, b, c, d] = self.d2v();
        let x = deg.clamp(cfg.min_pos_deg, cfg.max_pos_deg);
        let v = (((a * x + b) * x + c) * x + d) * x;
        v.clamp(0.0, cfg.max_bag_volume_l)
    }

    /// Paddle angle that displaces `litres`.
    pub fn degrees_for(self, litres: f64, cfg: &ActuatorCfg) -> f64 {
        let [a, b, c, d] = self.v2d();
        let v = litres.clamp(cfg.min_bag_volume_l, cfg.max_bag_volume_l);
        let deg = ((a * v + b) * v + c) * v + d;
        deg.clamp(cfg.min_pos_deg, cfg.max_pos_deg)
    }
}

/// What the actuator was last asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ActuatorCommand {
    pub target_angle_deg: f64,
    pub velocity_deg_per_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trajectory {
    pub velocity_deg_per_s: f64,
    /// The requested velocity exceeded the drive limit.
    pub clamped: bool,
}

/// Outcome of one homing correction attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HomeCorrection {
    AlreadyHome,
    Nudged { delta_deg: f64 },
    /// Too far from home for a nudge; a full homing move is needed.
    Uncorrectable,
}

impl HomeCorrection {
    pub fn is_correctable(&self) -> bool {
        !matches!(self, Self::Uncorrectable)
    }
}

pub struct Actuator<D: StepperDrive, P: PositionSource> {
    drive: SharedDrive<D>,
    position: P,
    cfg: ActuatorCfg,
    last_check_deg: Option<f64>,
    command: ActuatorCommand,
}

impl<D: StepperDrive, P: PositionSource> core::fmt::Debug for Actuator<D, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Actuator")
            .field("command", &self.command)
            .field("last_check_deg", &self.last_check_deg)
            .finish_non_exhaustive()
    }
}

impl<D: StepperDrive, P: PositionSource> Actuator<D, P> {
    pub fn new(drive: SharedDrive<D>, position: P, cfg: ActuatorCfg) -> Self {
        Self {
            drive,
            position,
            cfg,
            last_check_deg: None,
            command: ActuatorCommand::default(),
        }
    }

    /// Handle for the step-service thread.
    pub fn drive_handle(&self) -> SharedDrive<D> {
        Arc::clone(&self.drive)
    }

    pub fn cfg(&self) -> &ActuatorCfg {
        &self.cfg
    }

    pub fn command(&self) -> ActuatorCommand {
        self.command
    }

    pub fn rolls_over(&self) -> bool {
        self.position.rolls_over()
    }

    fn lock(&self) -> Result<MutexGuard<'_, D>, VentError> {
        self.drive
            .lock()
            .map_err(|_| VentError::State("actuator drive lock poisoned".into()))
    }

    fn with_drive<R>(&self, f: impl FnOnce(&mut D) -> HwResult<R>) -> Result<R, VentError> {
        let mut d = self.lock()?;
        f(&mut d).map_err(hw)
    }

    pub fn degrees_to_steps(&self, deg: f64) -> i64 {
        (deg / 360.0 * self.cfg.steps_per_rev).round() as i64
    }

    pub fn steps_to_degrees(&self, steps: i64) -> f64 {
        steps as f64 * 360.0 / self.cfg.steps_per_rev
    }

    pub fn max_velocity_deg_per_s(&self) -> f64 {
        self.cfg.max_steps_per_sec * 360.0 / self.cfg.steps_per_rev
    }

    /// Current paddle angle in `[0, 360)`.
    pub fn position_deg(&mut self) -> Result<f64, VentError> {
        let steps = self.lock()?.current_position();
        self.position
            .angle_deg(steps, self.cfg.steps_per_rev)
            .map_err(hw)
    }

    /// Velocity needed to reach `goal_deg` in `duration_s`, limited to what
    /// the drive can do. Records the command; does not move.
    pub fn plan_trajectory(
        &mut self,
        duration_s: f64,
        goal_deg: f64,
    ) -> Result<Trajectory, VentError> {
        let max = self.max_velocity_deg_per_s();
        let current = self.position_deg()?;
        let distance = (goal_deg - current).abs();
        let wanted = if duration_s > 0.0 {
            distance / duration_s
        } else {
            f64::INFINITY
        };
        let clamped = !(wanted <= max);
        let velocity = if clamped { max } else { wanted };
        if clamped {
            tracing::warn!(
                requested_deg_s = wanted,
                max_deg_s = max,
                duration_s,
                "trajectory velocity limited by drive"
            );
        }
        self.command = ActuatorCommand {
            target_angle_deg: goal_deg,
            velocity_deg_per_s: velocity,
        };
        Ok(Trajectory {
            velocity_deg_per_s: velocity,
            clamped,
        })
    }

    /// Command an absolute angle, clamped to the travel limits.
    pub fn set_position(&mut self, deg: f64) -> Result<(), VentError> {
        let deg = deg.clamp(self.cfg.min_pos_deg, self.cfg.max_pos_deg);
        let steps = self.degrees_to_steps(deg);
        self.command.target_angle_deg = deg;
        self.with_drive(|d| d.move_to(steps))
    }

    /// Command an angular speed, clamped to the drive limit.
    pub fn set_speed(&mut self, deg_per_s: f64) -> Result<(), VentError> {
        let sps = (deg_per_s.abs() / 360.0 * self.cfg.steps_per_rev)
            .min(self.cfg.max_steps_per_sec);
        self.command.velocity_deg_per_s = self.steps_to_degrees_f(sps);
        self.with_drive(|d| d.set_speed(sps))
    }

    fn steps_to_degrees_f(&self, steps: f64) -> f64 {
        steps * 360.0 / self.cfg.steps_per_rev
    }

    /// Cancel any motion where it stands.
    pub fn stop(&mut self) -> Result<(), VentError> {
        self.command.velocity_deg_per_s = 0.0;
        self.with_drive(|d| {
            let here = d.current_position();
            d.move_to(here)?;
            d.set_speed(0.0)
        })
    }

    pub fn target_reached(&self) -> Result<bool, VentError> {
        Ok(self.lock()?.distance_to_go() == 0)
    }

    fn home_floor(&self) -> f64 {
        if self.position.rolls_over() {
            self.cfg.home_min_deg
        } else {
            0.0
        }
    }

    fn in_home_window(&self, deg: f64) -> bool {
        deg >= self.home_floor() && deg <= self.cfg.home_max_deg
    }

    pub fn is_home(&mut self) -> Result<bool, VentError> {
        let deg = self.position_deg()?;
        Ok(self.in_home_window(deg))
    }

    /// Slightly past home in the forward direction, where a backward nudge
    /// recovers it.
    pub fn past_home_band(&mut self) -> Result<bool, VentError> {
        let deg = self.position_deg()?;
        Ok(deg > self.cfg.home_max_deg && deg <= self.cfg.home_correction_max_deg)
    }

    /// Nudge the paddle toward the home window when it is close enough.
    pub fn add_correction(&mut self) -> Result<HomeCorrection, VentError> {
        let deg = self.position_deg()?;
        let c = &self.cfg;
        let delta = if self.in_home_window(deg) {
            return Ok(HomeCorrection::AlreadyHome);
        } else if deg < c.home_min_deg {
            c.home_corr_move_deg
        } else if deg > c.home_max_deg && deg <= c.home_correction_max_deg {
            -c.home_corr_move_deg
        } else if deg > c.home_correction_min_deg && deg < 360.0 {
            c.home_corr_move_deg
        } else {
            tracing::debug!(angle_deg = deg, "too far from home to correct");
            return Ok(HomeCorrection::Uncorrectable);
        };
        let steps = self.degrees_to_steps(delta);
        let sps = c.home_correction_steps_per_sec;
        self.with_drive(|d| {
            d.set_speed(sps)?;
            d.move_by(steps)
        })?;
        tracing::debug!(angle_deg = deg, delta_deg = delta, "home correction");
        Ok(HomeCorrection::Nudged { delta_deg: delta })
    }

    /// Start a homing sweep: one forward revolution at homing speed.
    pub fn home(&mut self) -> Result<(), VentError> {
        let rev = self.cfg.steps_per_rev.round() as i64;
        let sps = self.cfg.homing_steps_per_sec;
        self.with_drive(|d| {
            d.set_speed(sps)?;
            d.move_by(rev)
        })?;
        self.command.velocity_deg_per_s = self.steps_to_degrees_f(sps);
        self.last_check_deg = Some(self.position_deg()?);
        Ok(())
    }

    /// True when the paddle moved more than the stall threshold since the
    /// previous call.
    pub fn is_moving(&mut self) -> Result<bool, VentError> {
        let now = self.position_deg()?;
        let moved = self
            .last_check_deg
            .is_none_or(|prev| angular_distance_deg(now, prev) > self.cfg.stall_min_move_deg);
        self.last_check_deg = Some(now);
        Ok(moved)
    }

    /// Declare the current position to be 0 for the drive counter.
    pub fn set_position_as_home(&mut self) -> Result<(), VentError> {
        self.with_drive(|d| d.set_current_position(0))?;
        self.command = ActuatorCommand::default();
        self.last_check_deg = None;
        Ok(())
    }

    /// Re-reference zero at the current position. Returns the value to persist
    /// for sources that keep one.
    pub fn set_current_position_as_zero(&mut self) -> Result<Option<u16>, VentError> {
        let zero = self.position.zero_here().map_err(hw)?;
        self.set_position_as_home()?;
        tracing::info!(?zero, "actuator zero set");
        Ok(zero)
    }

    pub fn load_zero(&mut self, zero: u16) -> Result<(), VentError> {
        self.position.load_zero(zero).map_err(hw)
    }

    pub fn volume_at_degrees(&self, deg: f64, compliance: Compliance) -> f64 {
        compliance.volume_l(deg, &self.cfg)
    }

    pub fn volume_to_degrees(&self, litres: f64, compliance: Compliance) -> f64 {
        compliance.degrees_for(litres, &self.cfg)
    }

    /// Displaced volume at the current angle, litres.
    pub fn degrees_to_volume(&mut self, compliance: Compliance) -> Result<f64, VentError> {
        let mut deg = self.position_deg()?;
        if deg > self.cfg.max_pos_deg + (360.0 - self.cfg.max_pos_deg) / 2.0 {
            // just behind zero
            deg = 0.0;
        }
        Ok(self.volume_at_degrees(deg, compliance))
    }

    /// Relative manual move for service use.
    pub fn jog(&mut self, delta_deg: f64, deg_per_s: f64) -> Result<(), VentError> {
        let steps = self.degrees_to_steps(delta_deg);
        self.set_speed(deg_per_s)?;
        self.with_drive(|d| d.move_by(steps))
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Result<(), VentError> {
        self.with_drive(|d| d.set_enabled(enabled))
    }
}
