use super::{AhrsConstants, AttitudeSolver, AttitudeState};
use crate::hardware::AhrsSample;
use crate::instruments::{CompassReading, GpsReading};
use crate::units::{finite_or, wrap_two_pi, LOCAL_GRAVITY};

/// Pass-through for AHRS boxes that already solve attitude: the device's
/// angles and rates are taken as they are, with no integration.
#[derive(Clone, Copy, Debug, Default)]
pub struct CookedAttitude;

impl CookedAttitude {
    fn assign(state: &mut AttitudeState, sample: &AhrsSample) {
        state.roll = finite_or(sample.roll_cooked, state.roll);
        state.pitch = finite_or(sample.pitch_cooked, state.pitch);
        state.heading = wrap_two_pi(finite_or(sample.heading_cooked, state.heading));
        state.roll_prime = sample.ang_roll;
        state.pitch_prime = sample.ang_pitch;
        state.heading_prime = sample.ang_head;
        state.yaw = finite_or(sample.accel_yaw.atan2(LOCAL_GRAVITY), state.yaw);
        state.good = sample.good;
    }
}

impl AttitudeSolver for CookedAttitude {
    fn name(&self) -> &'static str {
        "cooked"
    }

    fn solve_flying(
        &mut self,
        state: &mut AttitudeState,
        sample: &AhrsSample,
        _gps: &GpsReading,
        _compass: &CompassReading,
        _constants: &AhrsConstants,
    ) {
        Self::assign(state, sample);
    }

    fn solve_still(
        &mut self,
        state: &mut AttitudeState,
        sample: &AhrsSample,
        _compass: &CompassReading,
        _constants: &AhrsConstants,
    ) {
        Self::assign(state, sample);
    }
}
