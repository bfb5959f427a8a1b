use serde::{Deserialize, Serialize};

use super::Sampler;
use crate::differentiate::{halving_taps, Differentiator};
use crate::error::Result;
use crate::hardware::BoxedSource;
use crate::units::COMPASS_IDEAL_PERIOD_US;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompassReading {
    /// Magnetic heading in (0, 360] degrees
    pub heading: f64,
    /// deg/s, positive turning right
    pub heading_prime: f64,
    pub good: bool,
}

pub struct Compass {
    sampler: Sampler<f64>,
    diff: Differentiator,
    // Continuous heading, free of the 360/0 seam
    unwrapped: f64,
    reading: CompassReading,
}

impl Compass {
    pub fn new() -> Self {
        Self {
            sampler: Sampler::new(COMPASS_IDEAL_PERIOD_US),
            diff: Differentiator::new(100, &halving_taps(8)),
            unwrapped: 0.0,
            reading: CompassReading::default(),
        }
    }

    pub fn connect_hardware(&mut self, hardware: BoxedSource<f64>) {
        self.sampler.connect(hardware);
    }

    pub fn is_connected(&self) -> bool {
        self.sampler.is_connected()
    }

    pub fn duty_cycle(&mut self, main_loop_interval_us: u32) -> Result<u32> {
        self.sampler.duty_cycle(main_loop_interval_us)
    }

    pub fn update(&mut self) -> Result<bool> {
        let Some(raw) = self.sampler.poll()? else {
            return Ok(false);
        };
        let heading = normalize_heading(raw);

        if self.reading.good {
            let mut delta = heading - self.reading.heading;
            if delta > 180.0 {
                delta -= 360.0;
            } else if delta < -180.0 {
                delta += 360.0;
            }
            self.unwrapped += delta;
        } else {
            self.unwrapped = heading;
        }
        self.diff.add_sample(self.unwrapped.round() as i32);

        self.reading = CompassReading {
            heading,
            heading_prime: self.diff.differentiate() * self.sampler.sample_rate(),
            good: true,
        };
        Ok(true)
    }

    pub fn reading(&self) -> &CompassReading {
        &self.reading
    }
}

impl Default for Compass {
    fn default() -> Self {
        Self::new()
    }
}

/// Fold degrees into (0, 360]; north reads 360.
pub fn normalize_heading(degrees: f64) -> f64 {
    let mut h = degrees % 360.0;
    if h <= 0.0 {
        h += 360.0;
    }
    h
}
