// sim.rs: Point-mass aircraft for closed-loop runs without hardware
//
// One shared `SimAircraft` stands behind every hardware contract: the sensor
// sources read it, the servo controller writes its control surfaces, and the
// autopilot's clock is the aircraft's own time. A driver alternates
// `SimAircraft::step` with `Efis::tick`.
//
// The model is rate-command, not aerodynamic: surface deflection sets a roll
// or pitch rate, heading follows a coordinated turn, and airspeed trades with
// pitch at fixed power.

use std::f64::consts::TAU;
use std::sync::{Arc, Mutex};

use crate::ahrs::{Ahrs, AhrsConstants};
use crate::autopilot::Autopilot;
use crate::efis::{Efis, EfisConfig, EfisEvent};
use crate::error::Result;
use crate::hardware::{lock, AhrsSample, Clock, GpsFix, HardwareSource, NavSample, ServoHardware};
use crate::units::{limit, normalize_pi, FEET_PER_METER, KNOTS_PER_METER_S, LOCAL_GRAVITY, NM_PER_METER};

// ─── Airframe ────────────────────────────────────────────────────────────────

const DEG: f64 = std::f64::consts::PI / 180.0;

/// rad/s of roll rate per percent of aileron
const ROLL_RATE_PER_PERCENT: f64 = 0.3 * DEG;
/// rad/s of pitch rate per percent of elevator
const PITCH_RATE_PER_PERCENT: f64 = 0.1 * DEG;
/// Slip per percent of rudder
const SLIP_PER_PERCENT: f64 = 0.002;
/// Slip per rad/s of roll rate
const ADVERSE_YAW: f64 = 0.5;
/// Surface response time constant, seconds
const RATE_LAG_S: f64 = 0.3;
const SLIP_LAG_S: f64 = 0.5;

/// Level-flight airspeed at the fixed power setting
const CRUISE_KT: f64 = 100.0;
/// Fraction of the gap to cruise speed recovered per second
const SPEED_RECOVERY: f64 = 0.1;
const MIN_FLYING_KT: f64 = 30.0;
const MAX_BANK: f64 = 60.0 * DEG;
const MAX_PITCH: f64 = 20.0 * DEG;

// ─── Navaid ──────────────────────────────────────────────────────────────────

/// VOR/ILS station position; the aircraft flies in nm east and north of it
const STATION_LAT: f64 = 47.45;
const STATION_LNG: f64 = -122.31;
const GLIDEPATH_DEG: f64 = 3.0;
const GLIDESLOPE_RANGE_NM: f64 = 15.0;
/// Radial is meaningless right over the station
const CONE_OF_CONFUSION_NM: f64 = 0.1;
const SIM_EPOCH: i64 = 1_700_000_000;

/// Attitude filter tuning used when the config names no constants file
pub const SIM_NOISE_CONSTANT: f64 = 0.5;

#[derive(Clone, Debug, PartialEq)]
pub struct SimAircraft {
    // Attitude, radians
    pub roll: f64,
    pub roll_rate: f64,
    pub pitch: f64,
    pub pitch_rate: f64,
    pub heading: f64,
    pub heading_rate: f64,
    pub slip: f64,
    // Energy
    pub airspeed_kt: f64,
    /// kt/s
    pub airspeed_rate: f64,
    pub altitude_ft: f64,
    // Position relative to the station, nm
    pub east_nm: f64,
    pub north_nm: f64,
    pub time_us: u64,
    // Servo controller state, percent
    pub aileron: f64,
    pub elevator: f64,
    pub rudder: f64,
    pub roll_servo: bool,
    pub pitch_servo: bool,
    pub rudder_servo: bool,
}

pub type SharedAircraft = Arc<Mutex<SimAircraft>>;

impl SimAircraft {
    /// Wings level at cruise speed, 10 nm south of the station.
    pub fn new(altitude_ft: f64, heading_deg: f64) -> Self {
        Self {
            roll: 0.0,
            roll_rate: 0.0,
            pitch: 0.0,
            pitch_rate: 0.0,
            heading: (heading_deg * DEG).rem_euclid(TAU),
            heading_rate: 0.0,
            slip: 0.0,
            airspeed_kt: CRUISE_KT,
            airspeed_rate: 0.0,
            altitude_ft,
            east_nm: 0.0,
            north_nm: -10.0,
            time_us: 0,
            aileron: 0.0,
            elevator: 0.0,
            rudder: 0.0,
            roll_servo: false,
            pitch_servo: false,
            rudder_servo: false,
        }
    }

    pub fn at(mut self, east_nm: f64, north_nm: f64) -> Self {
        self.east_nm = east_nm;
        self.north_nm = north_nm;
        self
    }

    pub fn shared(self) -> SharedAircraft {
        Arc::new(Mutex::new(self))
    }

    /// Advance the aircraft by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let response = (dt / RATE_LAG_S).min(1.0);
        let aileron = if self.roll_servo { self.aileron } else { 0.0 };
        let elevator = if self.pitch_servo { self.elevator } else { 0.0 };
        let rudder = if self.rudder_servo { self.rudder } else { 0.0 };

        self.roll_rate += (aileron * ROLL_RATE_PER_PERCENT - self.roll_rate) * response;
        self.pitch_rate += (elevator * PITCH_RATE_PER_PERCENT - self.pitch_rate) * response;
        self.roll = limit(self.roll + self.roll_rate * dt, -MAX_BANK, MAX_BANK);
        self.pitch = limit(self.pitch + self.pitch_rate * dt, -MAX_PITCH, MAX_PITCH);

        let speed = self.speed_ms();
        self.heading_rate = LOCAL_GRAVITY * self.roll.tan() / speed;
        self.heading = (self.heading + self.heading_rate * dt).rem_euclid(TAU);

        let slip_target = ADVERSE_YAW * self.roll_rate + rudder * SLIP_PER_PERCENT;
        self.slip += (slip_target - self.slip) * (dt / SLIP_LAG_S).min(1.0);

        // Climbing costs speed; power pulls back toward cruise
        self.airspeed_rate =
            -LOCAL_GRAVITY * self.pitch.sin() * KNOTS_PER_METER_S + (CRUISE_KT - self.airspeed_kt) * SPEED_RECOVERY;
        self.airspeed_kt = (self.airspeed_kt + self.airspeed_rate * dt).max(MIN_FLYING_KT);

        self.altitude_ft += speed * self.pitch.sin() * FEET_PER_METER * dt;
        let travelled_nm = speed * self.pitch.cos() * dt * NM_PER_METER;
        self.east_nm += travelled_nm * self.heading.sin();
        self.north_nm += travelled_nm * self.heading.cos();

        self.time_us += (dt * 1_000_000.0).round() as u64;
    }

    pub fn speed_ms(&self) -> f64 {
        self.airspeed_kt.max(MIN_FLYING_KT) / KNOTS_PER_METER_S
    }

    /// Degrees in (0, 360]
    pub fn heading_deg(&self) -> f64 {
        let h = self.heading.to_degrees();
        if h <= 0.0 {
            h + 360.0
        } else {
            h
        }
    }

    pub fn distance_nm(&self) -> f64 {
        self.east_nm.hypot(self.north_nm)
    }

    /// Bearing from the station to the aircraft, centidegrees in (0, 36000]
    pub fn radial(&self) -> i32 {
        let r = (self.east_nm.atan2(self.north_nm).to_degrees() * 100.0).round() as i32;
        if r <= 0 {
            r + 36_000
        } else {
            r
        }
    }

    /// Centidegrees; positive when the glide path is above the aircraft
    pub fn glideslope_deviation(&self) -> i32 {
        let distance_ft = self.distance_nm() / NM_PER_METER * FEET_PER_METER;
        let angle = self.altitude_ft.atan2(distance_ft).to_degrees();
        ((GLIDEPATH_DEG - angle) * 100.0).round() as i32
    }

    fn ahrs_sample(&self, dt_us: u32) -> AhrsSample {
        AhrsSample {
            accel_thrust: LOCAL_GRAVITY * self.pitch.sin() + self.airspeed_rate / KNOTS_PER_METER_S,
            accel_yaw: LOCAL_GRAVITY * self.slip.tan(),
            accel_lift: LOCAL_GRAVITY * self.pitch.cos(),
            ang_roll: self.roll_rate,
            ang_pitch: self.pitch_rate,
            ang_head: self.heading_rate,
            roll_cooked: self.roll,
            pitch_cooked: self.pitch,
            heading_cooked: self.heading,
            dt_us,
            good: true,
        }
    }

    fn gps_fix(&self) -> GpsFix {
        GpsFix {
            lat: STATION_LAT + self.north_nm / 60.0,
            lng: STATION_LNG + self.east_nm / (60.0 * STATION_LAT.to_radians().cos()),
            track_deg: self.heading_deg().round() as u32,
            ground_speed_kt: self.airspeed_kt.round() as u32,
            unix_time: SIM_EPOCH + (self.time_us / 1_000_000) as i64,
            good: true,
        }
    }

    fn nav_sample(&self) -> NavSample {
        let distance = self.distance_nm();
        NavSample {
            radial: self.radial(),
            gsi: self.glideslope_deviation(),
            cdi_valid: distance > CONE_OF_CONFUSION_NM,
            gsi_valid: distance > CONE_OF_CONFUSION_NM && distance < GLIDESLOPE_RANGE_NM,
        }
    }
}

// ─── Hardware bridges ────────────────────────────────────────────────────────

/// Inertial box reporting both raw rates and its own attitude solution, so
/// it serves either AHRS solver.
pub struct SimAhrs {
    aircraft: SharedAircraft,
    last_us: Option<u64>,
}

impl SimAhrs {
    pub fn new(aircraft: &SharedAircraft) -> Self {
        Self {
            aircraft: Arc::clone(aircraft),
            last_us: None,
        }
    }
}

impl HardwareSource for SimAhrs {
    type Sample = AhrsSample;

    fn sample(&mut self) -> Result<Option<AhrsSample>> {
        let a = lock(&self.aircraft);
        let dt_us = match self.last_us {
            Some(last) if last == a.time_us => return Ok(None),
            Some(last) => u32::try_from(a.time_us.saturating_sub(last)).unwrap_or(u32::MAX),
            None => 1,
        };
        self.last_us = Some(a.time_us);
        Ok(Some(a.ahrs_sample(dt_us)))
    }
}

macro_rules! sim_source {
    ($name:ident, $sample:ty, |$a:ident| $read:expr) => {
        pub struct $name {
            aircraft: SharedAircraft,
        }

        impl $name {
            pub fn new(aircraft: &SharedAircraft) -> Self {
                Self {
                    aircraft: Arc::clone(aircraft),
                }
            }
        }

        impl HardwareSource for $name {
            type Sample = $sample;

            fn sample(&mut self) -> Result<Option<$sample>> {
                let $a = lock(&self.aircraft);
                Ok(Some($read))
            }
        }
    };
}

sim_source!(SimAirspeed, u32, |a| a.airspeed_kt.round() as u32);
sim_source!(SimAltimeter, i32, |a| a.altitude_ft.round() as i32);
sim_source!(SimCompass, f64, |a| a.heading_deg());
sim_source!(SimGps, GpsFix, |a| a.gps_fix());
sim_source!(SimNavRadio, NavSample, |a| a.nav_sample());

pub struct SimServos {
    aircraft: SharedAircraft,
}

impl SimServos {
    pub fn new(aircraft: &SharedAircraft) -> Self {
        Self {
            aircraft: Arc::clone(aircraft),
        }
    }
}

impl ServoHardware for SimServos {
    fn servo_state_change(&mut self, roll: Option<bool>, pitch: Option<bool>, rudder: Option<bool>) -> Result<()> {
        let mut a = lock(&self.aircraft);
        if let Some(on) = roll {
            a.roll_servo = on;
        }
        if let Some(on) = pitch {
            a.pitch_servo = on;
        }
        if let Some(on) = rudder {
            a.rudder_servo = on;
        }
        Ok(())
    }

    fn update_aileron_servo(&mut self, force: f64, trim: f64) -> Result<()> {
        lock(&self.aircraft).aileron = force + trim;
        Ok(())
    }

    fn update_elevator_servo(&mut self, force: f64, trim: f64) -> Result<()> {
        lock(&self.aircraft).elevator = force + trim;
        Ok(())
    }

    fn update_rudder_servo(&mut self, force: f64, trim: f64) -> Result<()> {
        lock(&self.aircraft).rudder = force + trim;
        Ok(())
    }
}

/// The aircraft's own time, so autopilot dt follows simulated seconds.
pub struct SimClock {
    aircraft: SharedAircraft,
}

impl SimClock {
    pub fn new(aircraft: &SharedAircraft) -> Self {
        Self {
            aircraft: Arc::clone(aircraft),
        }
    }
}

impl Clock for SimClock {
    fn now_us(&self) -> u64 {
        lock(&self.aircraft).time_us
    }
}

// ─── Wiring ──────────────────────────────────────────────────────────────────

/// Connect every EFIS component to the simulated aircraft.
pub fn attach(efis: &mut Efis, aircraft: &SharedAircraft) {
    efis.ahrs.connect_hardware(Box::new(SimAhrs::new(aircraft)));
    efis.airspeed.connect_hardware(Box::new(SimAirspeed::new(aircraft)));
    efis.altitude.connect_hardware(Box::new(SimAltimeter::new(aircraft)));
    efis.compass.connect_hardware(Box::new(SimCompass::new(aircraft)));
    efis.gps.connect_hardware(Box::new(SimGps::new(aircraft)));
    efis.nav.connect_hardware(Box::new(SimNavRadio::new(aircraft)));
    efis.autopilot.connect_servos(Box::new(SimServos::new(aircraft)));
}

/// An EFIS on simulated hardware, with the autopilot timed by the aircraft.
pub fn build(config: EfisConfig, aircraft: &SharedAircraft, cooked: bool) -> Efis {
    let mut ahrs = if cooked { Ahrs::cooked() } else { Ahrs::new() };
    ahrs.set_constants(AhrsConstants {
        noise_constant: SIM_NOISE_CONSTANT,
        yaw_roll_constant: 0.0,
    });
    let autopilot = Autopilot::with_clock(config.autopilot.clone(), Box::new(SimClock::new(aircraft)));
    let mut efis = Efis::with_components(config, ahrs, autopilot);
    attach(&mut efis, aircraft);
    efis
}

/// Fly `seconds` of simulated time, one main loop interval per tick.
pub fn fly(efis: &mut Efis, aircraft: &SharedAircraft, seconds: f64) -> Result<Vec<EfisEvent>> {
    let dt = f64::from(efis.config().main_loop_interval_us) / 1_000_000.0;
    let ticks = (seconds / dt).round() as u64;
    let mut events = Vec::new();
    for _ in 0..ticks {
        lock(aircraft).step(dt);
        events.extend(efis.tick()?);
    }
    Ok(events)
}

/// Signed heading error in degrees, for reports.
pub fn heading_error_deg(actual_deg: f64, target_deg: f64) -> f64 {
    normalize_pi((target_deg - actual_deg) * DEG).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn run(aircraft: &mut SimAircraft, seconds: f64) {
        for _ in 0..(seconds / 0.03).round() as usize {
            aircraft.step(0.03);
        }
    }

    #[test]
    fn test_hands_off_holds_level_cruise() {
        let mut a = SimAircraft::new(3000.0, 90.0);
        run(&mut a, 60.0);
        assert_abs_diff_eq!(a.altitude_ft, 3000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(a.airspeed_kt, CRUISE_KT, epsilon = 1e-6);
        assert_abs_diff_eq!(a.heading_deg(), 90.0, epsilon = 1e-6);
        // 100 kt east for a minute
        assert_abs_diff_eq!(a.east_nm, 100.0 / 60.0, epsilon = 1e-3);
        assert_eq!(a.time_us, 60_000_000);
    }

    #[test]
    fn test_surfaces_ignored_until_servo_engaged() {
        let mut a = SimAircraft::new(3000.0, 360.0);
        a.aileron = 50.0;
        run(&mut a, 5.0);
        assert_eq!(a.roll, 0.0);

        a.roll_servo = true;
        run(&mut a, 2.0);
        assert!(a.roll > 0.0);
        // Right bank turns right
        assert!(a.heading_rate > 0.0);
    }

    #[test]
    fn test_pitch_up_climbs_and_slows() {
        let mut a = SimAircraft::new(3000.0, 360.0);
        a.pitch = 5.0 * DEG;
        run(&mut a, 10.0);
        assert!(a.altitude_ft > 3100.0);
        assert!(a.airspeed_kt < CRUISE_KT);
    }

    #[test]
    fn test_radial_and_glideslope_geometry() {
        let north = SimAircraft::new(3000.0, 360.0).at(0.0, 5.0);
        assert_eq!(north.radial(), 36_000);
        let east = SimAircraft::new(3000.0, 360.0).at(5.0, 0.0);
        assert_eq!(east.radial(), 9_000);
        let south = SimAircraft::new(3000.0, 360.0).at(0.0, -5.0);
        assert_eq!(south.radial(), 18_000);

        // 3 degrees at 5 nm is about 1590 ft
        let low = SimAircraft::new(1000.0, 360.0).at(0.0, -5.0);
        assert!(low.glideslope_deviation() > 0);
        let high = SimAircraft::new(2500.0, 360.0).at(0.0, -5.0);
        assert!(high.glideslope_deviation() < 0);
        assert!(!SimAircraft::new(1000.0, 360.0).at(0.0, -20.0).nav_sample().gsi_valid);
    }

    #[test]
    fn test_ahrs_source_only_reports_new_time() {
        let aircraft = SimAircraft::new(3000.0, 360.0).shared();
        let mut src = SimAhrs::new(&aircraft);
        assert_eq!(src.sample().unwrap().map(|s| s.dt_us), Some(1));
        assert_eq!(src.sample().unwrap(), None);

        lock(&aircraft).step(0.03);
        let sample = src.sample().unwrap().unwrap();
        assert_eq!(sample.dt_us, 30_000);
        assert_abs_diff_eq!(sample.accel_lift, LOCAL_GRAVITY, epsilon = 1e-9);
    }

    #[test]
    fn test_servos_drive_the_aircraft() {
        let aircraft = SimAircraft::new(3000.0, 360.0).shared();
        let mut servos = SimServos::new(&aircraft);
        servos.servo_state_change(Some(true), None, None).unwrap();
        servos.update_aileron_servo(20.0, 1.0).unwrap();

        let a = lock(&aircraft);
        assert!(a.roll_servo);
        assert!(!a.pitch_servo);
        assert_eq!(a.aileron, 21.0);
    }

    #[test]
    fn test_built_efis_is_fully_wired() {
        let aircraft = SimAircraft::new(3000.0, 360.0).shared();
        let mut efis = build(EfisConfig::default(), &aircraft, false);
        let duty = efis.configure().unwrap();
        assert!(duty.gps.is_some());
        assert!(duty.nav.is_some());
        assert_eq!(duty.autopilot, Some(10));

        fly(&mut efis, &aircraft, 3.0).unwrap();
        assert!(efis.is_flying());
        assert!(efis.ahrs.state().good);
        assert_eq!(efis.airspeed.reading().knots, 100);
        assert_eq!(efis.altitude.reading().altitude, 3000);
    }

    #[test]
    fn test_heading_error_wraps() {
        assert_abs_diff_eq!(heading_error_deg(350.0, 10.0), 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(heading_error_deg(10.0, 350.0), -20.0, epsilon = 1e-9);
    }
}
