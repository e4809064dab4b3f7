//! Raspberry Pi drivers: step/dir/enable stepper driver and an MCP3204-class
//! SPI ADC.
use std::time::{Duration, Instant};

use rppal::gpio::{Gpio, OutputPin};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use tracing::trace;
use vent_traits::{HwResult, PressureAdc, StepperDrive};

use crate::error::{HwError, Result};

/// Step pulse high time.
const STEP_PULSE: Duration = Duration::from_micros(2);

pub struct GpioStepper {
    step: OutputPin,
    dir: OutputPin,
    enable: Option<OutputPin>,
    position: i64,
    target: i64,
    interval: Option<Duration>,
    last_step_at: Instant,
}

impl GpioStepper {
    pub fn new(step_pin: u8, dir_pin: u8, enable_pin: Option<u8>) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut step = gpio
            .get(step_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output();
        let dir = gpio
            .get(dir_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output();
        let enable = match enable_pin {
            Some(p) => {
                let mut pin = gpio
                    .get(p)
                    .map_err(|e| HwError::Gpio(e.to_string()))?
                    .into_output();
                // driver enable is active low
                pin.set_low();
                Some(pin)
            }
            None => None,
        };
        step.set_low();
        Ok(Self {
            step,
            dir,
            enable,
            position: 0,
            target: 0,
            interval: None,
            last_step_at: Instant::now(),
        })
    }

    fn pulse(&mut self, forward: bool) {
        if forward {
            self.dir.set_high();
        } else {
            self.dir.set_low();
        }
        self.step.set_high();
        let t = Instant::now();
        while t.elapsed() < STEP_PULSE {
            std::hint::spin_loop();
        }
        self.step.set_low();
        self.position += if forward { 1 } else { -1 };
    }
}

impl StepperDrive for GpioStepper {
    fn move_to(&mut self, absolute_steps: i64) -> HwResult<()> {
        self.target = absolute_steps;
        Ok(())
    }

    fn move_by(&mut self, relative_steps: i64) -> HwResult<()> {
        self.target = self.position.saturating_add(relative_steps);
        Ok(())
    }

    fn set_speed(&mut self, steps_per_sec: f64) -> HwResult<()> {
        let sps = steps_per_sec.abs();
        self.interval = (sps.is_finite() && sps > 0.0).then(|| Duration::from_secs_f64(1.0 / sps));
        self.last_step_at = Instant::now();
        Ok(())
    }

    fn set_current_position(&mut self, steps: i64) -> HwResult<()> {
        self.position = steps;
        self.target = steps;
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> HwResult<()> {
        if let Some(pin) = self.enable.as_mut() {
            if enabled {
                pin.set_low();
            } else {
                pin.set_high();
            }
        }
        Ok(())
    }

    fn current_position(&self) -> i64 {
        self.position
    }

    fn distance_to_go(&self) -> i64 {
        self.target - self.position
    }

    fn run(&mut self) -> HwResult<bool> {
        let dist = self.distance_to_go();
        if dist == 0 {
            return Ok(false);
        }
        let Some(interval) = self.interval else {
            return Ok(true);
        };
        let now = Instant::now();
        if now.saturating_duration_since(self.last_step_at) >= interval {
            self.pulse(dist > 0);
            self.last_step_at = now;
        }
        Ok(self.distance_to_go() != 0)
    }
}

/// 12-bit, 4-channel SPI ADC (MCP3204 command framing).
pub struct SpiAdc {
    spi: Spi,
    channel: u8,
}

impl SpiAdc {
    pub fn new(bus: u8, cs: u8, channel: u8) -> Result<Self> {
        if channel > 3 {
            return Err(HwError::Channel(channel));
        }
        let bus = match bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            _ => return Err(HwError::Spi(format!("unsupported bus {bus}"))),
        };
        let ss = match cs {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            _ => return Err(HwError::Spi(format!("unsupported chip select {cs}"))),
        };
        let spi = Spi::new(bus, ss, 1_000_000, Mode::Mode0).map_err(|e| HwError::Spi(e.to_string()))?;
        Ok(Self { spi, channel })
    }
}

impl PressureAdc for SpiAdc {
    fn read_raw(&mut self) -> HwResult<i32> {
        // start bit, single-ended, channel select
        let tx = [0x06, (self.channel & 0x03) << 6, 0x00];
        let mut rx = [0u8; 3];
        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        let value = (i32::from(rx[1] & 0x0F) << 8) | i32::from(rx[2]);
        trace!(channel = self.channel, raw = value, "adc read");
        Ok(value)
    }
}
