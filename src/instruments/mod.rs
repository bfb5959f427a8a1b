// Instrument filters: each polls one hardware source on its own duty cycle
// and turns the raw level into a smoothed value, a rate and a validity flag.

pub mod airspeed;
pub mod altitude;
pub mod compass;
pub mod gps;
pub mod nav;

pub use airspeed::{Airspeed, AirspeedReading};
pub use altitude::{Altitude, AltitudeReading};
pub use compass::{Compass, CompassReading};
pub use gps::{Gps, GpsReading};
pub use nav::{Nav, NavReading};

use crate::error::{EfisError, Result};
use crate::hardware::{duty_cycle, BoxedSource};

/// Hardware slot and sample-rate bookkeeping shared by every instrument.
pub(crate) struct Sampler<T> {
    hardware: Option<BoxedSource<T>>,
    ideal_period_us: u32,
    sample_rate: f64,
}

impl<T> Sampler<T> {
    pub(crate) fn new(ideal_period_us: u32) -> Self {
        Self {
            hardware: None,
            ideal_period_us,
            sample_rate: 1_000_000.0 / f64::from(ideal_period_us),
        }
    }

    pub(crate) fn connect(&mut self, hardware: BoxedSource<T>) {
        self.hardware = Some(hardware);
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.hardware.is_some()
    }

    pub(crate) fn duty_cycle(&mut self, main_loop_interval_us: u32) -> Result<u32> {
        let hardware = self.hardware.as_ref().ok_or(EfisError::NoIoBoard)?;
        let (ticks, rate) = duty_cycle(
            main_loop_interval_us,
            hardware.time_base(),
            self.ideal_period_us,
        );
        self.sample_rate = rate;
        Ok(ticks)
    }

    pub(crate) fn poll(&mut self) -> Result<Option<T>> {
        self.hardware
            .as_mut()
            .ok_or(EfisError::NoIoBoard)?
            .sample()
    }

    pub(crate) fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}
