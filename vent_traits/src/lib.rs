pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Error type used at every hardware trait boundary.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Stepper drive with position tracking, modelled on a constant-speed
/// "run toward target" driver. Positions and distances are in drive steps.
pub trait StepperDrive {
    /// Set an absolute target position.
    fn move_to(&mut self, absolute_steps: i64) -> HwResult<()>;
    /// Set a target relative to the current position.
    fn move_by(&mut self, relative_steps: i64) -> HwResult<()>;
    /// Set the step rate magnitude used to approach the target.
    fn set_speed(&mut self, steps_per_sec: f64) -> HwResult<()>;
    /// Redefine the current position (and target) without moving.
    fn set_current_position(&mut self, steps: i64) -> HwResult<()>;
    fn set_enabled(&mut self, enabled: bool) -> HwResult<()>;

    fn current_position(&self) -> i64;
    fn distance_to_go(&self) -> i64;

    /// Step service: emit any steps that are due. Returns true while the
    /// drive still has distance to cover.
    fn run(&mut self) -> HwResult<bool>;
}

/// Single-channel ADC feeding a pressure transducer.
pub trait PressureAdc {
    /// Read one raw sample in counts.
    fn read_raw(&mut self) -> HwResult<i32>;
}

/// Absolute magnetic angle encoder with a writable zero register.
pub trait AngleEncoder {
    /// Raw angle in counts, `0..counts_per_rev()`, relative to the zero register.
    fn read_angle_raw(&mut self) -> HwResult<u16>;
    /// Raw angle ignoring the zero register.
    fn read_absolute_raw(&mut self) -> HwResult<u16>;
    fn write_zero(&mut self, zero: u16) -> HwResult<()>;
    fn counts_per_rev(&self) -> u16 {
        16_384
    }
}

/// Where the actuator's notion of "current angle" comes from.
pub trait PositionSource {
    /// Paddle angle in degrees, `[0, 360)`.
    ///
    /// `drive_steps` is the drive's step counter and `steps_per_rev` the number
    /// of drive steps per output revolution; sources with their own sensor may
    /// ignore both.
    fn angle_deg(&mut self, drive_steps: i64, steps_per_rev: f64) -> HwResult<f64>;

    /// Re-reference zero at the current position. Returns the persisted zero
    /// value when the source keeps one.
    fn zero_here(&mut self) -> HwResult<Option<u16>>;

    /// Restore a zero previously returned by `zero_here`.
    fn load_zero(&mut self, zero: u16) -> HwResult<()>;

    /// True when readings can wrap across 360/0 (absolute sensors).
    fn rolls_over(&self) -> bool;
}

impl<T: StepperDrive + ?Sized> StepperDrive for Box<T> {
    fn move_to(&mut self, absolute_steps: i64) -> HwResult<()> {
        (**self).move_to(absolute_steps)
    }
    fn move_by(&mut self, relative_steps: i64) -> HwResult<()> {
        (**self).move_by(relative_steps)
    }
    fn set_speed(&mut self, steps_per_sec: f64) -> HwResult<()> {
        (**self).set_speed(steps_per_sec)
    }
    fn set_current_position(&mut self, steps: i64) -> HwResult<()> {
        (**self).set_current_position(steps)
    }
    fn set_enabled(&mut self, enabled: bool) -> HwResult<()> {
        (**self).set_enabled(enabled)
    }
    fn current_position(&self) -> i64 {
        (**self).current_position()
    }
    fn distance_to_go(&self) -> i64 {
        (**self).distance_to_go()
    }
    fn run(&mut self) -> HwResult<bool> {
        (**self).run()
    }
}

impl<T: PressureAdc + ?Sized> PressureAdc for Box<T> {
    fn read_raw(&mut self) -> HwResult<i32> {
        (**self).read_raw()
    }
}

impl<T: PositionSource + ?Sized> PositionSource for Box<T> {
    fn angle_deg(&mut self, drive_steps: i64, steps_per_rev: f64) -> HwResult<f64> {
        (**self).angle_deg(drive_steps, steps_per_rev)
    }
    fn zero_here(&mut self) -> HwResult<Option<u16>> {
        (**self).zero_here()
    }
    fn load_zero(&mut self, zero: u16) -> HwResult<()> {
        (**self).load_zero(zero)
    }
    fn rolls_over(&self) -> bool {
        (**self).rolls_over()
    }
}
