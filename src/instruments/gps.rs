use serde::{Deserialize, Serialize};

use super::Sampler;
use crate::differentiate::{Differentiator, GPS_TAPS};
use crate::error::Result;
use crate::hardware::{BoxedSource, GpsFix};
use crate::units::GPS_IDEAL_PERIOD_US;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GpsReading {
    pub lat: f64,
    pub lng: f64,
    /// True track, degrees
    pub ground_track: u32,
    /// knots
    pub ground_speed: u32,
    /// Along-track acceleration, knots/s
    pub delta_v: f64,
    pub unix_time: i64,
    pub good: bool,
}

pub struct Gps {
    sampler: Sampler<GpsFix>,
    diff: Differentiator,
    reading: GpsReading,
}

impl Gps {
    pub fn new() -> Self {
        Self {
            sampler: Sampler::new(GPS_IDEAL_PERIOD_US),
            diff: Differentiator::new(GPS_TAPS.len(), &GPS_TAPS),
            reading: GpsReading::default(),
        }
    }

    pub fn connect_hardware(&mut self, hardware: BoxedSource<GpsFix>) {
        self.sampler.connect(hardware);
    }

    pub fn is_connected(&self) -> bool {
        self.sampler.is_connected()
    }

    pub fn duty_cycle(&mut self, main_loop_interval_us: u32) -> Result<u32> {
        self.sampler.duty_cycle(main_loop_interval_us)
    }

    pub fn update(&mut self) -> Result<bool> {
        let Some(fix) = self.sampler.poll()? else {
            return Ok(false);
        };
        if !fix.good {
            self.reading.good = false;
            return Ok(true);
        }
        self.diff.add_sample(fix.ground_speed_kt.min(i32::MAX as u32) as i32);
        self.reading = GpsReading {
            lat: fix.lat,
            lng: fix.lng,
            ground_track: fix.track_deg,
            ground_speed: fix.ground_speed_kt,
            delta_v: self.diff.differentiate() * self.sampler.sample_rate(),
            unix_time: fix.unix_time,
            good: true,
        };
        Ok(true)
    }

    pub fn reading(&self) -> &GpsReading {
        &self.reading
    }
}

impl Default for Gps {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::ScriptedSource;

    fn fix(speed: u32, good: bool) -> GpsFix {
        GpsFix {
            lat: 47.5,
            lng: -122.3,
            track_deg: 90,
            ground_speed_kt: speed,
            unix_time: 1_700_000_000,
            good,
        }
    }

    #[test]
    fn test_delta_v_from_speed_change() {
        let mut gps = Gps::new();
        gps.connect_hardware(Box::new(
            ScriptedSource::with_samples((0..8).map(|i| fix(100 + 5 * i, true))).with_time_base(1.0),
        ));
        gps.duty_cycle(30_000).unwrap();
        for _ in 0..8 {
            gps.update().unwrap();
        }
        let r = gps.reading();
        assert!(r.good);
        assert_eq!(r.ground_speed, 135);
        assert_eq!(r.ground_track, 90);
        assert!((r.delta_v - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_lost_fix_clears_good() {
        let mut gps = Gps::new();
        gps.connect_hardware(Box::new(ScriptedSource::with_samples([
            fix(120, true),
            fix(0, false),
        ])));
        gps.update().unwrap();
        assert!(gps.reading().good);
        gps.update().unwrap();
        assert!(!gps.reading().good);
        // Last good position is retained
        assert_eq!(gps.reading().ground_speed, 120);
    }
}
