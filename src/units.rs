// Physical constants and angle helpers shared by the instruments, AHRS and
// autopilot. Angles inside the core are radians unless a name says otherwise.

use std::f64::consts::{PI, TAU};

pub const KNOTS_PER_METER_S: f64 = 1.943_841_6;
pub const LOCAL_GRAVITY: f64 = 9.806_65;
pub const NM_PER_METER: f64 = 0.000_539_956_803;
pub const FEET_PER_METER: f64 = 3.280_839_9;
pub const STANDARD_ALTIMETER_INHG: f64 = 29.92;

/// Default main loop period used by the scheduler (µs)
pub const DEFAULT_MAIN_LOOP_INTERVAL_US: u32 = 30_000;

// Ideal sample periods for sources that report no native rate (µs)
pub const AIRSPEED_IDEAL_PERIOD_US: u32 = 500_000;
pub const ALTITUDE_IDEAL_PERIOD_US: u32 = 750_000;
pub const COMPASS_IDEAL_PERIOD_US: u32 = 500_000;
pub const GPS_IDEAL_PERIOD_US: u32 = 500_000;
pub const NAV_IDEAL_PERIOD_US: u32 = 1_000_000;
pub const AUTOPILOT_UPDATE_PERIOD_US: u32 = 300_000;

/// Fold an angle into (-π, π]
pub fn normalize_pi(angle: f64) -> f64 {
    let mut a = angle % TAU;
    if a <= -PI {
        a += TAU;
    } else if a > PI {
        a -= TAU;
    }
    a
}

/// Fold an angle into [0, 2π)
pub fn wrap_two_pi(angle: f64) -> f64 {
    let mut a = angle % TAU;
    if a < 0.0 {
        a += TAU;
    }
    // A tiny negative angle rounds up to exactly 2π
    if a >= TAU {
        0.0
    } else {
        a
    }
}

/// Clamp without panicking on an inverted range; the lower bound wins.
pub fn limit(value: f64, min: f64, max: f64) -> f64 {
    let capped = if value > max { max } else { value };
    if capped < min {
        min
    } else {
        capped
    }
}

/// Keep `value` if finite, otherwise use `fallback`.
pub fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
