// Attitude and heading reference.
//
// `Ahrs` owns the inertial source and the fused `AttitudeState`; the math
// that turns a sample into angles lives behind `AttitudeSolver` so devices
// that solve attitude themselves plug in next to the complementary filter.

pub mod complementary;
pub mod constants;
pub mod cooked;

pub use complementary::ComplementaryFilter;
pub use constants::AhrsConstants;
pub use cooked::CookedAttitude;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EfisError, Result, SyntaxError};
use crate::hardware::{AhrsSample, BoxedSource};
use crate::instruments::{CompassReading, GpsReading};

/// Fused attitude, radians and rad/s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttitudeState {
    pub roll: f64,
    pub pitch: f64,
    /// [0, 2π)
    pub heading: f64,
    /// Slip/skid angle
    pub yaw: f64,
    pub roll_prime: f64,
    pub pitch_prime: f64,
    pub heading_prime: f64,
    pub yaw_prime: f64,
    pub good: bool,
}

impl AttitudeState {
    pub fn heading_deg(&self) -> f64 {
        self.heading.to_degrees()
    }
}

/// Per-device attitude math.
pub trait AttitudeSolver: Send {
    fn name(&self) -> &'static str;

    /// Flight: references from GPS and compass.
    fn solve_flying(
        &mut self,
        state: &mut AttitudeState,
        sample: &AhrsSample,
        gps: &GpsReading,
        compass: &CompassReading,
        constants: &AhrsConstants,
    );

    /// Ground: gravity gives pitch and roll directly.
    fn solve_still(
        &mut self,
        state: &mut AttitudeState,
        sample: &AhrsSample,
        compass: &CompassReading,
        constants: &AhrsConstants,
    );
}

const DEBUG_EVERY: u64 = 40;

pub struct Ahrs {
    hardware: Option<BoxedSource<AhrsSample>>,
    solver: Box<dyn AttitudeSolver>,
    constants: AhrsConstants,
    state: AttitudeState,
    cycles: u64,
}

impl Ahrs {
    /// Complementary filter over raw rate gyros and accelerometers.
    pub fn new() -> Self {
        Self::with_solver(Box::new(ComplementaryFilter::new()))
    }

    /// For devices that output their own attitude.
    pub fn cooked() -> Self {
        Self::with_solver(Box::new(CookedAttitude))
    }

    pub fn with_solver(solver: Box<dyn AttitudeSolver>) -> Self {
        Self {
            hardware: None,
            solver,
            constants: AhrsConstants::default(),
            state: AttitudeState::default(),
            cycles: 0,
        }
    }

    pub fn connect_hardware(&mut self, hardware: BoxedSource<AhrsSample>) {
        self.hardware = Some(hardware);
    }

    pub fn is_connected(&self) -> bool {
        self.hardware.is_some()
    }

    /// The AHRS runs on every scheduler tick.
    pub fn duty_cycle(&self, _main_loop_interval_us: u32) -> u32 {
        1
    }

    /// One flight-mode cycle. `Ok(false)` when the source had nothing new.
    pub fn sample_and_compute(&mut self, gps: &GpsReading, compass: &CompassReading) -> Result<bool> {
        let Some(sample) = self.poll()? else {
            return Ok(false);
        };
        self.solver
            .solve_flying(&mut self.state, &sample, gps, compass, &self.constants);
        self.trace();
        Ok(true)
    }

    /// One ground-mode cycle.
    pub fn sample_and_compute_still(&mut self, compass: &CompassReading) -> Result<bool> {
        let Some(sample) = self.poll()? else {
            return Ok(false);
        };
        self.solver
            .solve_still(&mut self.state, &sample, compass, &self.constants);
        self.trace();
        Ok(true)
    }

    pub fn init_constants(&mut self, path: impl AsRef<Path>) -> Result<Option<SyntaxError>> {
        let result = self.constants.load(path.as_ref())?;
        log::info!(
            "ahrs constants from {}: noise {:.4}, yaw/roll {:.4}",
            path.as_ref().display(),
            self.constants.noise_constant,
            self.constants.yaw_roll_constant
        );
        Ok(result)
    }

    pub fn set_constants(&mut self, constants: AhrsConstants) {
        self.constants = constants;
    }

    pub fn constants(&self) -> &AhrsConstants {
        &self.constants
    }

    pub fn state(&self) -> &AttitudeState {
        &self.state
    }

    pub fn solver_name(&self) -> &'static str {
        self.solver.name()
    }

    fn poll(&mut self) -> Result<Option<AhrsSample>> {
        self.hardware
            .as_mut()
            .ok_or(EfisError::NoIoBoard)?
            .sample()
    }

    fn trace(&mut self) {
        self.cycles += 1;
        if self.cycles % DEBUG_EVERY == 0 {
            let s = &self.state;
            log::debug!(
                "ahrs[{}] roll {:.1} pitch {:.1} hdg {:.1} yaw {:.2} good {}",
                self.solver.name(),
                s.roll.to_degrees(),
                s.pitch.to_degrees(),
                s.heading.to_degrees(),
                s.yaw.to_degrees(),
                s.good
            );
        }
    }
}

impl Default for Ahrs {
    fn default() -> Self {
        Self::new()
    }
}
