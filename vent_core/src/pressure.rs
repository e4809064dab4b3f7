//! Raw ADC counts to pressure and flow.
//!
//! The transducers are ratiometric: output spans 10%..90% of supply over the
//! rated range, and reaches the ADC through a resistor divider. A linear
//! gain/offset pair is derived once at init from those electrics.
use vent_traits::PressureAdc;

use crate::config::SensorElectrics;
use crate::error::VentError;
use crate::hw_error::hw;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureUnit {
    Psi,
    Mbar,
    Bar,
    MmHg,
    InHg,
    CmH2O,
    InH2O,
    Atm,
    KPa,
}

impl PressureUnit {
    /// Multiplier from psi.
    pub const fn per_psi(self) -> f64 {
        match self {
            Self::Psi => 1.0,
            Self::Mbar => 68.9476,
            Self::Bar => 0.068_947_6,
            Self::MmHg => 51.7149,
            Self::InHg => 2.03602,
            Self::CmH2O => 70.307,
            Self::InH2O => 27.7076,
            Self::Atm => 0.068_046,
            Self::KPa => 6.89476,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowUnit {
    Lpm,
    Lps,
    Mlpm,
    Mlps,
    Cfm,
}

impl FlowUnit {
    /// Multiplier from litres per minute.
    pub const fn per_lpm(self) -> f64 {
        match self {
            Self::Lpm => 1.0,
            Self::Lps => 0.01667,
            Self::Mlpm => 1000.0,
            Self::Mlps => 16.67,
            Self::Cfm => 0.03531,
        }
    }
}

/// Order of the differential-pressure to flow fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowOrder {
    First,
    Second,
    #[default]
    Third,
}

impl FlowOrder {
    /// Flow in L/min for a differential pressure in mbar.
    pub fn lpm(self, mbar: f64) -> f64 {
        let x = mbar;
        match self {
            Self::First => 45.089 * x,
            Self::Second => (-1.4452 * x + 44.573) * x,
            Self::Third => ((-0.4608 * x - 1.5564) * x + 45.477) * x,
        }
    }
}

/// How the zero offset was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroKind {
    /// Never zeroed; zeroed reads behave like raw reads.
    #[default]
    None,
    /// Gauge channel at ambient.
    Gauge,
    /// Differential channel at no flow; offset is relative to mid-scale.
    Differential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureCalibration {
    /// psi per count.
    pub linear_gain: f64,
    /// psi subtracted after the gain.
    pub linear_offset: f64,
    /// Counts captured by the last zeroing.
    pub adc_zero_offset: i32,
    pub zero_kind: ZeroKind,
}

impl PressureCalibration {
    pub fn from_electrics(e: &SensorElectrics, max_psi: f64, min_psi: f64) -> Self {
        let c = (max_psi - min_psi) / (0.8 * e.supply_v);
        let v_step = (e.adc_ref_v / f64::from(e.full_scale())) * (e.r1_ohm + e.r2_ohm) / e.r2_ohm;
        Self {
            linear_gain: c * v_step,
            linear_offset: 0.1 * e.supply_v * c - min_psi,
            adc_zero_offset: 0,
            zero_kind: ZeroKind::None,
        }
    }

    /// Pressure in psi for `raw` counts.
    pub fn psi(&self, raw: i32, zero: bool) -> f64 {
        let raw_f = f64::from(raw);
        if !zero {
            return raw_f * self.linear_gain - self.linear_offset;
        }
        let offset = self.adc_zero_offset;
        match self.zero_kind {
            ZeroKind::None => raw_f * self.linear_gain - self.linear_offset,
            ZeroKind::Gauge => f64::from((raw - offset).max(0)) * self.linear_gain,
            ZeroKind::Differential => {
                f64::from((raw - offset).max(0)) * self.linear_gain - self.linear_offset
            }
        }
    }
}

/// One transducer channel behind an ADC.
#[derive(Debug)]
pub struct PressureSensor<A: PressureAdc> {
    adc: A,
    cal: PressureCalibration,
    full_scale: i32,
}

impl<A: PressureAdc> PressureSensor<A> {
    /// Set up a channel rated `min_psi..max_psi` with a previously captured
    /// zero offset (0 when none).
    pub fn init(
        adc: A,
        electrics: &SensorElectrics,
        max_psi: f64,
        min_psi: f64,
        zero_offset: i32,
    ) -> Self {
        let mut cal = PressureCalibration::from_electrics(electrics, max_psi, min_psi);
        cal.adc_zero_offset = zero_offset;
        Self {
            adc,
            cal,
            full_scale: electrics.full_scale(),
        }
    }

    pub fn calibration(&self) -> &PressureCalibration {
        &self.cal
    }

    pub fn adc_mut(&mut self) -> &mut A {
        &mut self.adc
    }

    /// Pure conversion of `raw` counts with this channel's calibration.
    pub fn convert(&self, raw: i32, unit: PressureUnit, zero: bool) -> f64 {
        self.cal.psi(raw, zero) * unit.per_psi()
    }

    pub fn read_raw(&mut self) -> Result<i32, VentError> {
        self.adc.read_raw().map_err(hw)
    }

    pub fn pressure(&mut self, unit: PressureUnit, zero: bool) -> Result<f64, VentError> {
        let raw = self.read_raw()?;
        Ok(self.convert(raw, unit, zero))
    }

    /// Flow through the differential element. Positive pressure across the
    /// element reads as negative (expiratory-positive) flow.
    pub fn flow(&mut self, unit: FlowUnit, zero: bool, order: FlowOrder) -> Result<f64, VentError> {
        let mbar = self.pressure(PressureUnit::Mbar, zero)?;
        Ok(-(order.lpm(mbar) * unit.per_lpm()))
    }

    /// Average `samples` reads into a new zero offset. On a read failure the
    /// previous offset is kept.
    pub fn calculate_zero(&mut self, kind: ZeroKind, samples: u32) -> Result<i32, VentError> {
        let n = samples.max(1);
        let mut sum: i64 = 0;
        for _ in 0..n {
            sum += i64::from(self.read_raw()?);
        }
        let mut offset = i32::try_from(sum / i64::from(n))
            .map_err(|_| VentError::Hardware("zero average out of range".into()))?;
        if kind == ZeroKind::Differential {
            offset -= self.full_scale / 2;
        }
        self.cal.adc_zero_offset = offset;
        self.cal.zero_kind = kind;
        tracing::info!(offset, ?kind, samples = n, "pressure zero captured");
        Ok(offset)
    }

    pub fn reset_zero(&mut self) {
        self.cal.adc_zero_offset = 0;
        self.cal.zero_kind = ZeroKind::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(i32);
    impl PressureAdc for Fixed {
        fn read_raw(&mut self) -> vent_traits::HwResult<i32> {
            Ok(self.0)
        }
    }

    fn gauge(raw: i32) -> PressureSensor<Fixed> {
        PressureSensor::init(Fixed(raw), &SensorElectrics::default(), 1.0, 0.0, 0)
    }

    #[test]
    fn rated_minimum_reads_min_psi() {
        let s = gauge(0);
        // 0 psi sits at 10% of supply through the divider: ~411 counts
        let psi = s.convert(411, PressureUnit::Psi, false);
        assert!(psi.abs() < 0.002, "psi = {psi}");
    }

    #[test]
    fn first_order_flow_is_linear() {
        assert!((FlowOrder::First.lpm(2.0) - 90.178).abs() < 1e-9);
        assert_eq!(FlowOrder::Third.lpm(0.0), 0.0);
    }

    #[test]
    fn reset_zero_restores_raw_behaviour() {
        let mut s = gauge(500);
        s.calculate_zero(ZeroKind::Gauge, 4).unwrap();
        assert_eq!(s.calibration().adc_zero_offset, 500);
        s.reset_zero();
        let a = s.convert(600, PressureUnit::Psi, true);
        let b = s.convert(600, PressureUnit::Psi, false);
        assert!((a - b).abs() < 1e-12);
    }
}
