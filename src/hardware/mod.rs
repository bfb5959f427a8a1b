// Capability contracts between the EFIS core and the device drivers.
//
// Drivers (serial AHRS boxes, air data computers, GPS receivers, nav radios,
// servo controllers, simulator bridges) implement these traits. The core only
// sees the decoded samples below, never a wire format.

pub mod mock;

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;

/// A polled sensor.
pub trait HardwareSource {
    type Sample;

    /// `Ok(Some(_))` when new data arrived since the last call.
    fn sample(&mut self) -> Result<Option<Self::Sample>>;

    /// Native sample rate in Hz, or 0 when the scheduler should pick the rate.
    fn time_base(&self) -> f64 {
        0.0
    }
}

pub type BoxedSource<T> = Box<dyn HardwareSource<Sample = T> + Send>;

/// Raw inertial sample, plus the pre-computed attitude for devices that
/// solve it themselves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AhrsSample {
    // m/s^2
    pub accel_thrust: f64,
    pub accel_yaw: f64,
    pub accel_lift: f64,
    // rad/s
    pub ang_roll: f64,
    pub ang_pitch: f64,
    pub ang_head: f64,
    // rad
    pub roll_cooked: f64,
    pub pitch_cooked: f64,
    pub heading_cooked: f64,
    /// µs since the previous good sample, 1 if there was none
    pub dt_us: u32,
    pub good: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub lat: f64,
    pub lng: f64,
    pub track_deg: u32,
    pub ground_speed_kt: u32,
    pub unix_time: i64,
    pub good: bool,
}

/// Nav radio output in hundredths of a degree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NavSample {
    pub radial: i32,
    pub gsi: i32,
    pub cdi_valid: bool,
    pub gsi_valid: bool,
}

/// Servo controller for the three control surfaces. Force and trim are
/// percent of travel in [-100, 100].
pub trait ServoHardware {
    /// Switch axes on or off. `None` leaves that axis as it is.
    fn servo_state_change(
        &mut self,
        roll: Option<bool>,
        pitch: Option<bool>,
        rudder: Option<bool>,
    ) -> Result<()>;

    fn update_aileron_servo(&mut self, force: f64, trim: f64) -> Result<()>;
    fn update_elevator_servo(&mut self, force: f64, trim: f64) -> Result<()>;
    fn update_rudder_servo(&mut self, force: f64, trim: f64) -> Result<()>;
}

/// Microsecond time source for control-loop dt.
pub trait Clock {
    fn now_us(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }
}

/// Lock, recovering the data from a poisoned mutex.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scheduler ticks between updates of a component, and the sample rate (Hz)
/// that results.
///
/// A source with a native rate is polled as close to that rate as the main
/// loop allows. A source without one falls back to `ideal_period_us`.
///
/// # Panics
///
/// Panics if `main_loop_interval_us` is zero.
pub fn duty_cycle(main_loop_interval_us: u32, time_base_hz: f64, ideal_period_us: u32) -> (u32, f64) {
    assert!(main_loop_interval_us > 0, "main loop interval must be positive");
    let interval = f64::from(main_loop_interval_us);
    if time_base_hz <= 0.0 {
        let ticks = (ideal_period_us / main_loop_interval_us).max(1);
        (ticks, 1_000_000.0 / (f64::from(ticks) * interval))
    } else {
        let ticks = (1_000_000.0 / (interval * time_base_hz)).round().max(1.0) as u32;
        (ticks, time_base_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duty_cycle_ideal_period() {
        let (ticks, rate) = duty_cycle(30_000, 0.0, 500_000);
        assert_eq!(ticks, 16);
        assert!((rate - 1_000_000.0 / 480_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_duty_cycle_native_rate() {
        let (ticks, rate) = duty_cycle(30_000, 10.0, 500_000);
        // 100 ms / 30 ms rounds to 3
        assert_eq!(ticks, 3);
        assert_eq!(rate, 10.0);
    }

    #[test]
    fn test_duty_cycle_never_zero() {
        assert_eq!(duty_cycle(1_000_000, 0.0, 500_000).0, 1);
        assert_eq!(duty_cycle(30_000, 1000.0, 500_000).0, 1);
    }

    #[test]
    #[should_panic]
    fn test_duty_cycle_zero_interval() {
        duty_cycle(0, 0.0, 500_000);
    }
}
