//! Paddle angle sources.
use vent_traits::{AngleEncoder, HwResult, PositionSource};

use crate::bus::SharedBus;

/// Angle derived from the drive's own step counter. Never rolls over from the
/// actuator's point of view: 0 is wherever the counter was last zeroed.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepCountPosition;

impl PositionSource for StepCountPosition {
    fn angle_deg(&mut self, drive_steps: i64, steps_per_rev: f64) -> HwResult<f64> {
        if !(steps_per_rev.is_finite() && steps_per_rev > 0.0) {
            return Err(format!("invalid steps per revolution: {steps_per_rev}").into());
        }
        Ok((drive_steps as f64 / steps_per_rev * 360.0).rem_euclid(360.0))
    }

    fn zero_here(&mut self) -> HwResult<Option<u16>> {
        Ok(None)
    }

    fn load_zero(&mut self, _zero: u16) -> HwResult<()> {
        Ok(())
    }

    fn rolls_over(&self) -> bool {
        false
    }
}

/// Angle from an absolute magnetic encoder on the paddle shaft. The encoder
/// sits on a bus shared with other peripherals, so every read goes through
/// the bus guard.
#[derive(Debug, Clone)]
pub struct EncoderPosition<E: AngleEncoder> {
    bus: SharedBus<E>,
}

impl<E: AngleEncoder> EncoderPosition<E> {
    pub fn new(bus: SharedBus<E>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &SharedBus<E> {
        &self.bus
    }
}

impl<E: AngleEncoder> PositionSource for EncoderPosition<E> {
    fn angle_deg(&mut self, _drive_steps: i64, _steps_per_rev: f64) -> HwResult<f64> {
        let (raw, cpr) = self
            .bus
            .with(|enc| enc.read_angle_raw().map(|r| (r, enc.counts_per_rev())))??;
        let cpr = f64::from(cpr.max(1));
        Ok((f64::from(raw) * 360.0 / cpr).rem_euclid(360.0))
    }

    fn zero_here(&mut self) -> HwResult<Option<u16>> {
        let abs = self.bus.with(|enc| -> HwResult<u16> {
            let abs = enc.read_absolute_raw()?;
            enc.write_zero(abs)?;
            Ok(abs)
        })??;
        Ok(Some(abs))
    }

    fn load_zero(&mut self, zero: u16) -> HwResult<()> {
        self.bus.with(|enc| enc.write_zero(zero))?
    }

    fn rolls_over(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_count_wraps_negative_counts() {
        let mut p = StepCountPosition;
        let a = p.angle_deg(-50, 200.0).unwrap();
        assert!((a - 270.0).abs() < 1e-9);
        assert!(!p.rolls_over());
        assert_eq!(p.zero_here().unwrap(), None);
    }

    #[test]
    fn step_count_rejects_zero_resolution() {
        assert!(StepCountPosition.angle_deg(10, 0.0).is_err());
    }
}
