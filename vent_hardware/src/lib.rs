//! Hardware behind the `vent_traits` seams.
//!
//! The simulated models are always available; the Raspberry Pi drivers are
//! compiled with the `hardware` feature on Linux.
pub mod error;
pub mod sim;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

pub use sim::{
    AdcHandle, FrontEnd, SimulatedAdc, SimulatedEncoder, SimulatedLung, SimulatedStepper,
    StepperProbe,
};

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gpio::{GpioStepper, SpiAdc};
