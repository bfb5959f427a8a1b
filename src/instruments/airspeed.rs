use serde::{Deserialize, Serialize};

use super::Sampler;
use crate::differentiate::{halving_taps, Differentiator};
use crate::error::Result;
use crate::hardware::BoxedSource;
use crate::units::AIRSPEED_IDEAL_PERIOD_US;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AirspeedReading {
    /// Indicated airspeed, knots
    pub knots: u32,
    /// knots/s
    pub knots_prime: f64,
    pub good: bool,
}

pub struct Airspeed {
    sampler: Sampler<u32>,
    diff: Differentiator,
    reading: AirspeedReading,
}

impl Airspeed {
    pub fn new() -> Self {
        Self {
            sampler: Sampler::new(AIRSPEED_IDEAL_PERIOD_US),
            diff: Differentiator::new(100, &halving_taps(20)),
            reading: AirspeedReading::default(),
        }
    }

    pub fn connect_hardware(&mut self, hardware: BoxedSource<u32>) {
        self.sampler.connect(hardware);
    }

    pub fn is_connected(&self) -> bool {
        self.sampler.is_connected()
    }

    pub fn duty_cycle(&mut self, main_loop_interval_us: u32) -> Result<u32> {
        self.sampler.duty_cycle(main_loop_interval_us)
    }

    pub fn update(&mut self) -> Result<bool> {
        let Some(knots) = self.sampler.poll()? else {
            return Ok(false);
        };
        self.diff.add_sample(knots.min(i32::MAX as u32) as i32);
        self.reading = AirspeedReading {
            knots,
            knots_prime: self.diff.differentiate() * self.sampler.sample_rate(),
            good: true,
        };
        Ok(true)
    }

    pub fn reading(&self) -> &AirspeedReading {
        &self.reading
    }
}

impl Default for Airspeed {
    fn default() -> Self {
        Self::new()
    }
}
