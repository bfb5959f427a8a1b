use super::{AhrsConstants, AttitudeSolver, AttitudeState};
use crate::hardware::AhrsSample;
use crate::instruments::{CompassReading, GpsReading};
use crate::units::{finite_or, normalize_pi, wrap_two_pi, KNOTS_PER_METER_S, LOCAL_GRAVITY};

/// Complementary filter per axis: integrate the gyro rate, then pull the
/// integrated angle toward an absolute reference at `noise_constant` rad/s
/// per rad of disagreement.
#[derive(Clone, Copy, Debug, Default)]
pub struct ComplementaryFilter;

impl ComplementaryFilter {
    pub fn new() -> Self {
        ComplementaryFilter
    }
}

impl AttitudeSolver for ComplementaryFilter {
    fn name(&self) -> &'static str {
        "complementary"
    }

    fn solve_flying(
        &mut self,
        state: &mut AttitudeState,
        sample: &AhrsSample,
        gps: &GpsReading,
        compass: &CompassReading,
        constants: &AhrsConstants,
    ) {
        let dt = f64::from(sample.dt_us) / 1_000_000.0;
        let gain = correction_gain(constants.noise_constant, dt);

        // Pitch: gravity vector less the along-track acceleration GPS sees
        let dv = if gps.good { gps.delta_v } else { 0.0 };
        compute_pitch(state, sample, dt, dv, gain);

        // Roll: bank angle a coordinated turn at this rate and speed needs
        state.roll_prime = sample.ang_roll;
        let integrated = state.roll + state.roll_prime * dt;
        let estimate = if gps.good {
            let speed = f64::from(gps.ground_speed) / KNOTS_PER_METER_S;
            (speed * sample.ang_head / LOCAL_GRAVITY).atan()
                - constants.yaw_roll_constant * sample.accel_yaw
        } else {
            integrated
        };
        state.roll = blend(integrated, finite_or(estimate, integrated), gain);

        // Heading: compass, compared across the north seam
        state.heading_prime = sample.ang_head;
        let integrated = state.heading + state.heading_prime * dt;
        state.heading = if compass.good {
            let error = normalize_pi(compass.heading.to_radians() - integrated);
            wrap_two_pi(integrated + error * gain)
        } else {
            wrap_two_pi(integrated)
        };

        compute_yaw(state, sample, dt);
        state.good = sample.good && gps.good && compass.good;
    }

    fn solve_still(
        &mut self,
        state: &mut AttitudeState,
        sample: &AhrsSample,
        compass: &CompassReading,
        _constants: &AhrsConstants,
    ) {
        compute_pitch(state, sample, 0.0, 0.0, 0.0);

        state.roll = finite_or(sample.accel_yaw.atan2(sample.accel_lift), state.roll);
        state.roll_prime = 0.0;

        state.heading_prime = 0.0;
        if compass.good {
            state.heading = wrap_two_pi(compass.heading.to_radians());
        }

        compute_yaw(state, sample, 0.0);
        state.good = sample.good && compass.good;
    }
}

/// Fraction of the reference error applied this cycle, capped so a long
/// gap between samples cannot overshoot the reference.
fn correction_gain(noise_constant: f64, dt: f64) -> f64 {
    (noise_constant * dt).clamp(0.0, 1.0)
}

fn blend(integrated: f64, estimate: f64, gain: f64) -> f64 {
    integrated + (estimate - integrated) * gain
}

/// With `dt == 0` pitch is taken straight from the accelerometers.
fn compute_pitch(state: &mut AttitudeState, sample: &AhrsSample, dt: f64, dv_knots: f64, gain: f64) {
    let estimate = ((sample.accel_thrust - dv_knots / KNOTS_PER_METER_S) / sample.accel_lift).atan();
    if dt > 0.0 {
        state.pitch_prime = sample.ang_pitch;
        let integrated = state.pitch + state.pitch_prime * dt;
        state.pitch = blend(integrated, finite_or(estimate, integrated), gain);
    } else {
        state.pitch = finite_or(estimate, state.pitch);
        state.pitch_prime = 0.0;
    }
}

fn compute_yaw(state: &mut AttitudeState, sample: &AhrsSample, dt: f64) {
    let yaw = finite_or(sample.accel_yaw.atan2(LOCAL_GRAVITY), state.yaw);
    state.yaw_prime = if dt > 0.0 { (yaw - state.yaw) / dt } else { 0.0 };
    state.yaw = yaw;
}
