//! Maps `Box<dyn Error>` from trait boundaries to typed `VentError`.
//!
//! The traits in `vent_traits` use `Box<dyn Error + Send + Sync>`; this module
//! converts those to our typed error enum, with an optional feature-gated
//! path for `vent_hardware::HwError` downcasting.

use crate::error::VentError;

/// Map a trait-boundary error to a typed `VentError`.
///
/// Known hardware error types are downcast first; a `VentError` raised by our
/// own trait impls (e.g. a poisoned bus guard) passes through unchanged.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> VentError {
    if let Some(v) = e.downcast_ref::<VentError>() {
        return v.clone();
    }

    #[cfg(feature = "hardware-errors")]
    {
        use vent_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Io(_) => VentError::Hardware(hw.to_string()),
                other => VentError::HardwareFault(other.to_string()),
            };
        }
    }

    VentError::Hardware(e.to_string())
}

/// Convenience for `.map_err(hw)` on trait results.
pub(crate) fn hw(e: Box<dyn std::error::Error + Send + Sync>) -> VentError {
    map_hw_error(e.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vent_error_passes_through() {
        let e: Box<dyn std::error::Error + Send + Sync> =
            Box::new(VentError::State("bus lock poisoned".into()));
        assert_eq!(hw(e), VentError::State("bus lock poisoned".into()));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hw_error_maps_to_fault() {
        let e: Box<dyn std::error::Error + Send + Sync> =
            Box::new(vent_hardware::error::HwError::Disconnected);
        assert!(matches!(hw(e), VentError::HardwareFault(_)));
    }

    #[test]
    fn unknown_error_is_generic_hardware() {
        let e: Box<dyn std::error::Error + Send + Sync> = "boom".into();
        assert_eq!(hw(e), VentError::Hardware("boom".into()));
    }
}
