use serde::{Deserialize, Serialize};

use super::Sampler;
use crate::differentiate::{halving_taps, Differentiator};
use crate::error::Result;
use crate::hardware::{BoxedSource, NavSample};
use crate::units::NAV_IDEAL_PERIOD_US;

/// Course and glideslope deviation in hundredths of a degree.
///
/// Positive `cdi` means the selected course lies to the right, positive
/// `gsi` means the glide path lies above.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavReading {
    /// Selected course, degrees
    pub obs: u32,
    pub cdi: i32,
    pub gsi: i32,
    /// TO flag; false reads FROM
    pub to: bool,
    pub cdi_prime: f64,
    pub gsi_prime: f64,
    pub cdi_good: bool,
    pub gsi_good: bool,
}

impl Default for NavReading {
    fn default() -> Self {
        Self {
            obs: 360,
            cdi: 0,
            gsi: 0,
            to: false,
            cdi_prime: 0.0,
            gsi_prime: 0.0,
            cdi_good: false,
            gsi_good: false,
        }
    }
}

pub struct Nav {
    sampler: Sampler<NavSample>,
    cdi_diff: Differentiator,
    gsi_diff: Differentiator,
    // Last valid radial, 1/100 degree
    radial: Option<i32>,
    reading: NavReading,
}

impl Nav {
    pub fn new() -> Self {
        Self {
            sampler: Sampler::new(NAV_IDEAL_PERIOD_US),
            cdi_diff: Differentiator::new(100, &halving_taps(8)),
            gsi_diff: Differentiator::new(100, &halving_taps(8)),
            radial: None,
            reading: NavReading::default(),
        }
    }

    pub fn connect_hardware(&mut self, hardware: BoxedSource<NavSample>) {
        self.sampler.connect(hardware);
    }

    pub fn is_connected(&self) -> bool {
        self.sampler.is_connected()
    }

    pub fn duty_cycle(&mut self, main_loop_interval_us: u32) -> Result<u32> {
        self.sampler.duty_cycle(main_loop_interval_us)
    }

    /// Select a course. The needle moves at once against the last radial
    /// received, and its rate history restarts from the new deviation.
    ///
    /// # Panics
    ///
    /// Panics unless `degrees` is in 1..=360.
    pub fn set_obs(&mut self, degrees: u32) {
        assert!((1..=360).contains(&degrees), "OBS {} out of range", degrees);
        self.reading.obs = degrees;
        let Some(radial) = self.radial else {
            return;
        };
        let (cdi, to) = course_deviation(degrees, radial);
        self.cdi_diff = Differentiator::new(100, &halving_taps(8));
        self.cdi_diff.add_sample(cdi);
        self.reading.cdi = cdi;
        self.reading.to = to;
        self.reading.cdi_prime = 0.0;
    }

    pub fn update(&mut self) -> Result<bool> {
        let Some(sample) = self.sampler.poll()? else {
            return Ok(false);
        };
        let rate = self.sampler.sample_rate();

        if sample.cdi_valid {
            self.radial = Some(sample.radial);
            let (cdi, to) = course_deviation(self.reading.obs, sample.radial);
            self.cdi_diff.add_sample(cdi);
            self.reading.cdi = cdi;
            self.reading.to = to;
            self.reading.cdi_prime = self.cdi_diff.differentiate() * rate;
        }
        self.reading.cdi_good = sample.cdi_valid;

        if sample.gsi_valid {
            self.gsi_diff.add_sample(sample.gsi);
            self.reading.gsi = sample.gsi;
            self.reading.gsi_prime = self.gsi_diff.differentiate() * rate;
        }
        self.reading.gsi_good = sample.gsi_valid;

        Ok(true)
    }

    pub fn reading(&self) -> &NavReading {
        &self.reading
    }
}

impl Default for Nav {
    fn default() -> Self {
        Self::new()
    }
}

/// Deviation of the course `obs` (degrees) from the received `radial`
/// (1/100 degree), and whether the station is ahead.
pub fn course_deviation(obs: u32, radial: i32) -> (i32, bool) {
    let mut radial = radial % 36_000;
    if radial <= 0 {
        radial += 36_000;
    }

    let mut cdi = obs as i32 * 100 - radial;
    if cdi > 18_000 {
        cdi -= 36_000;
    } else if cdi <= -18_000 {
        cdi += 36_000;
    }

    if cdi > 9_000 {
        (18_000 - cdi, true)
    } else if cdi < -9_000 {
        (-18_000 - cdi, true)
    } else {
        (cdi, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::ScriptedSource;

    #[test]
    fn test_outbound_deviation() {
        // Course 090 outbound, aircraft on the 080 radial: course is to the right
        assert_eq!(course_deviation(90, 8_000), (1_000, false));
        // On the 100 radial: course is to the left
        assert_eq!(course_deviation(90, 10_000), (-1_000, false));
    }

    #[test]
    fn test_inbound_deviation() {
        // Inbound on 360, aircraft on the 170 radial (east of course)
        assert_eq!(course_deviation(360, 17_000), (-1_000, true));
        // Inbound on 180, aircraft on the 010 radial (east of course, heading south)
        assert_eq!(course_deviation(180, 1_000), (1_000, true));
    }

    #[test]
    fn test_radial_normalization() {
        assert_eq!(course_deviation(360, 0), (0, false));
        assert_eq!(course_deviation(10, 36_500), (500, false));
        assert_eq!(course_deviation(350, -500), (-500, false));
    }

    #[test]
    fn test_update_tracks_validity() {
        let mut nav = Nav::new();
        nav.connect_hardware(Box::new(ScriptedSource::with_samples([
            NavSample {
                radial: 8_000,
                gsi: 25,
                cdi_valid: true,
                gsi_valid: true,
            },
            NavSample {
                radial: 8_000,
                gsi: 0,
                cdi_valid: true,
                gsi_valid: false,
            },
        ])));
        nav.set_obs(90);
        nav.update().unwrap();
        assert!(nav.reading().cdi_good && nav.reading().gsi_good);
        assert_eq!(nav.reading().cdi, 1_000);
        assert_eq!(nav.reading().gsi, 25);

        nav.update().unwrap();
        assert!(nav.reading().cdi_good);
        assert!(!nav.reading().gsi_good);
    }

    #[test]
    fn test_new_course_recenters_needle_at_once() {
        let mut nav = Nav::new();
        nav.connect_hardware(Box::new(ScriptedSource::with_samples([NavSample {
            radial: 9_000,
            cdi_valid: true,
            ..Default::default()
        }])));
        nav.update().unwrap();
        // Default course 360 from the 090 radial: full scale left
        assert_eq!(nav.reading().cdi, -9_000);

        nav.set_obs(90);
        let r = nav.reading();
        assert_eq!(r.obs, 90);
        assert_eq!(r.cdi, 0);
        assert!(!r.to);
        assert_eq!(r.cdi_prime, 0.0);

        nav.set_obs(270);
        assert_eq!(nav.reading().cdi, 0);
        assert!(nav.reading().to);
    }

    #[test]
    fn test_course_before_any_radial_only_sets_obs() {
        let mut nav = Nav::new();
        nav.set_obs(45);
        assert_eq!(nav.reading().obs, 45);
        assert_eq!(nav.reading().cdi, 0);
        assert!(!nav.reading().cdi_good);
    }

    #[test]
    #[should_panic]
    fn test_obs_out_of_range() {
        Nav::new().set_obs(0);
    }
}
