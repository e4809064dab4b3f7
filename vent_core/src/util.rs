//! Common time/period helpers for vent_core.
use std::time::Duration;

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Whole control ticks needed to cover `span`, rounded up and at least 1.
#[inline]
pub fn ticks_for(span: Duration, tick: Duration) -> u32 {
    let tick_ns = tick.as_nanos().max(1);
    let n = span.as_nanos().div_ceil(tick_ns).max(1);
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Tick rate in Hz for a tick period, clamped to at least 1 Hz.
#[inline]
pub fn rate_hz(tick: Duration) -> u64 {
    let us = u64::try_from(tick.as_micros()).unwrap_or(u64::MAX).max(1);
    (MICROS_PER_SEC / us).max(1)
}

/// Angular distance between two positions on a circle, in `[0, 180]`.
#[inline]
pub fn angular_distance_deg(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_round_up() {
        let tick = Duration::from_millis(20);
        assert_eq!(ticks_for(Duration::from_millis(2000), tick), 100);
        assert_eq!(ticks_for(Duration::from_millis(401), tick), 21);
        assert_eq!(ticks_for(Duration::ZERO, tick), 1);
    }

    #[test]
    fn rate_from_period() {
        assert_eq!(rate_hz(Duration::from_millis(20)), 50);
        assert_eq!(rate_hz(Duration::from_secs(5)), 1);
    }

    #[test]
    fn angular_distance_wraps() {
        assert!((angular_distance_deg(359.5, 0.5) - 1.0).abs() < 1e-9);
        assert!((angular_distance_deg(10.0, 350.0) - 20.0).abs() < 1e-9);
        assert!((angular_distance_deg(90.0, 90.0)).abs() < 1e-9);
    }
}
