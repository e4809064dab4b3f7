use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VentError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error(transparent)]
    Waveform(#[from] WaveformCalcError),
}

/// Breath timing that cannot be realised with the current targets.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum WaveformCalcError {
    #[error("breath rate must be > 0 (got {0})")]
    NonPositiveRate(f64),
    #[error("I:E ratio terms must be > 0 (got {0}:{1})")]
    NonPositiveRatio(f64, f64),
    #[error(
        "infeasible breath timing: inspiration {inspiration_s:.3}s, expiration {expiration_s:.3}s"
    )]
    NegativeDuration {
        inspiration_s: f64,
        expiration_s: f64,
    },
}

/// Reason the machine entered `Fault`. The numeric codes are stable and are
/// what gets logged and shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FaultCode {
    /// Homing produced no motion, ran out of time, or a diagnostic fault was forced.
    ActuatorFault = 1,
    /// Breath timing could not be computed from the targets.
    WaveformCalcError = 2,
    /// The drive or a sensor bus could not be commanded.
    HardwareFault = 3,
}

impl FaultCode {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::ActuatorFault),
            2 => Some(Self::WaveformCalcError),
            3 => Some(Self::HardwareFault),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ActuatorFault => "actuator fault",
            Self::WaveformCalcError => "waveform calculation error",
            Self::HardwareFault => "hardware fault",
        }
    }
}

impl core::fmt::Display for FaultCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("invalid target: {0}")]
    InvalidTarget(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
