use serde::{Deserialize, Serialize};

use super::Sampler;
use crate::differentiate::{halving_taps, Differentiator};
use crate::error::Result;
use crate::hardware::BoxedSource;
use crate::units::{ALTITUDE_IDEAL_PERIOD_US, STANDARD_ALTIMETER_INHG};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AltitudeReading {
    /// Feet, referenced to 29.92 inHg
    pub pressure_altitude: i32,
    /// Feet MSL, corrected for the altimeter setting
    pub altitude: i32,
    /// Vertical speed, feet per minute
    pub altitude_prime: f64,
    /// inHg
    pub altimeter: f64,
    pub good: bool,
}

impl Default for AltitudeReading {
    fn default() -> Self {
        Self {
            pressure_altitude: 0,
            altitude: 0,
            altitude_prime: 0.0,
            altimeter: STANDARD_ALTIMETER_INHG,
            good: false,
        }
    }
}

pub struct Altitude {
    sampler: Sampler<i32>,
    diff: Differentiator,
    reading: AltitudeReading,
}

impl Altitude {
    pub fn new() -> Self {
        Self {
            sampler: Sampler::new(ALTITUDE_IDEAL_PERIOD_US),
            diff: Differentiator::new(100, &halving_taps(20)),
            reading: AltitudeReading::default(),
        }
    }

    pub fn connect_hardware(&mut self, hardware: BoxedSource<i32>) {
        self.sampler.connect(hardware);
    }

    pub fn is_connected(&self) -> bool {
        self.sampler.is_connected()
    }

    pub fn duty_cycle(&mut self, main_loop_interval_us: u32) -> Result<u32> {
        self.sampler.duty_cycle(main_loop_interval_us)
    }

    /// Altimeter setting in inches of mercury. Applies from the next sample.
    pub fn set_altimeter(&mut self, inches_hg: f64) {
        self.reading.altimeter = inches_hg;
    }

    pub fn update(&mut self) -> Result<bool> {
        let Some(pressure_altitude) = self.sampler.poll()? else {
            return Ok(false);
        };
        self.diff.add_sample(pressure_altitude);
        let correction = ((self.reading.altimeter - STANDARD_ALTIMETER_INHG) * 1000.0).round() as i32;
        self.reading = AltitudeReading {
            pressure_altitude,
            altitude: pressure_altitude.saturating_add(correction),
            altitude_prime: self.diff.differentiate() * self.sampler.sample_rate() * 60.0,
            altimeter: self.reading.altimeter,
            good: true,
        };
        Ok(true)
    }

    pub fn reading(&self) -> &AltitudeReading {
        &self.reading
    }
}

impl Default for Altitude {
    fn default() -> Self {
        Self::new()
    }
}
