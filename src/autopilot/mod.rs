// Cascaded autopilot.
//
// Three independent chains, each angle -> rate -> force with a clamp at every
// stage:
//   roll:   heading (or course) error -> bank -> roll rate -> aileron
//   pitch:  airspeed / altitude / glideslope -> pitch -> pitch rate -> elevator
//   rudder: slip angle -> rudder
//
// The autopilot never writes sensor state. Every command and update takes a
// `FlightData` snapshot of the instruments it reads.

pub mod config;

pub use config::AutopilotConfig;

use serde::{Deserialize, Serialize};

use crate::ahrs::AttitudeState;
use crate::error::{EfisError, Result};
use crate::hardware::{Clock, ServoHardware, SystemClock};
use crate::instruments::{AirspeedReading, AltitudeReading, NavReading};
use crate::units::{limit, normalize_pi, wrap_two_pi, AUTOPILOT_UPDATE_PERIOD_US};

/// dt used when there is no previous update to measure from
const FIRST_UPDATE_DT: f64 = 1e-6;
const DEBUG_EVERY: u64 = 40;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutopilotMode {
    Manual,
    Vor,
    Ils,
}

/// What the autopilot reads from the other components for one step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct FlightData {
    pub attitude: AttitudeState,
    pub airspeed: AirspeedReading,
    pub altitude: AltitudeReading,
    pub nav: NavReading,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axis {
    Roll,
    Pitch,
    Rudder,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PitchPrimary {
    Airspeed,
    Altitude,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AutopilotStatus {
    pub roll_engaged: bool,
    pub pitch_engaged: bool,
    pub rudder_engaged: bool,
    pub mode: AutopilotMode,
    pub desired_heading: u32,
    pub desired_radial: u32,
    pub desired_altitude: i32,
    pub desired_airspeed: u32,
    pub desired_pitch_deg: f64,
    pub aileron_force: f64,
    pub elevator_force: f64,
    pub rudder_force: f64,
    pub updates: u64,
}

pub struct Autopilot {
    config: AutopilotConfig,
    servos: Option<Box<dyn ServoHardware + Send>>,
    clock: Box<dyn Clock + Send>,

    roll_engaged: bool,
    pitch_engaged: bool,
    rudder_engaged: bool,
    mode: AutopilotMode,

    // Targets
    desired_heading: u32,
    desired_radial: u32,
    desired_altitude: i32,
    climb_airspeed: u32,
    descent_airspeed: u32,
    desired_airspeed: u32,
    airspeed_limits: Option<(u32, u32)>,
    ils_desired_heading: f64,
    desired_pitch: f64,
    target_pitch_prime: f64,

    // Outputs, percent
    aileron_force: f64,
    elevator_force: f64,
    rudder_force: f64,
    aileron_trim: f64,
    elevator_trim: f64,
    rudder_trim: f64,

    calls_to_pitch: u32,
    last_update_us: Option<u64>,
    updates: u64,
}

impl Autopilot {
    pub fn new(config: AutopilotConfig) -> Self {
        Self::with_clock(config, Box::new(SystemClock))
    }

    pub fn with_clock(config: AutopilotConfig, clock: Box<dyn Clock + Send>) -> Self {
        Self {
            config,
            servos: None,
            clock,
            roll_engaged: false,
            pitch_engaged: false,
            rudder_engaged: false,
            mode: AutopilotMode::Manual,
            desired_heading: 360,
            desired_radial: 360,
            desired_altitude: 0,
            climb_airspeed: 0,
            descent_airspeed: 0,
            desired_airspeed: 0,
            airspeed_limits: None,
            ils_desired_heading: 0.0,
            desired_pitch: 0.0,
            target_pitch_prime: 0.0,
            aileron_force: 0.0,
            elevator_force: 0.0,
            rudder_force: 0.0,
            aileron_trim: 0.0,
            elevator_trim: 0.0,
            rudder_trim: 0.0,
            calls_to_pitch: 0,
            last_update_us: None,
            updates: 0,
        }
    }

    pub fn connect_servos(&mut self, servos: Box<dyn ServoHardware + Send>) {
        self.servos = Some(servos);
    }

    pub fn is_connected(&self) -> bool {
        self.servos.is_some()
    }

    /// Scheduler ticks between updates.
    ///
    /// # Panics
    ///
    /// Panics if `main_loop_interval_us` is zero.
    pub fn duty_cycle(&self, main_loop_interval_us: u32) -> u32 {
        assert!(main_loop_interval_us > 0, "main loop interval must be positive");
        (AUTOPILOT_UPDATE_PERIOD_US / main_loop_interval_us).max(1)
    }

    // ─── Commands ────────────────────────────────────────────────────────────

    /// Fly a magnetic heading, engaging roll if needed.
    ///
    /// # Panics
    ///
    /// Panics unless `heading` is in 1..=360.
    pub fn set_heading(&mut self, heading: u32, data: &FlightData) -> Result<()> {
        assert!((1..=360).contains(&heading), "heading {} out of range", heading);
        self.require_servos()?;

        self.mode = AutopilotMode::Manual;
        self.desired_heading = heading;
        log::info!("autopilot: heading {:03}", heading);
        if !self.roll_engaged {
            self.engage(Axis::Roll, data)?;
        }
        self.switch_servos(Some(true), None, None)
    }

    /// Hold `altitude` ft, climbing at `climb_airspeed` and descending at
    /// `descent_airspeed` knots.
    pub fn set_altitude(
        &mut self,
        altitude: i32,
        climb_airspeed: u32,
        descent_airspeed: u32,
        data: &FlightData,
    ) -> Result<()> {
        self.require_servos()?;
        if !data.altitude.good {
            return Err(EfisError::NoAltitude);
        }

        // Leaving the glide path keeps the localizer
        if self.mode == AutopilotMode::Ils {
            self.mode = AutopilotMode::Vor;
        }
        self.desired_altitude = altitude;
        self.climb_airspeed = climb_airspeed;
        self.descent_airspeed = descent_airspeed;
        log::info!(
            "autopilot: altitude {} ft, climb {} kt, descent {} kt",
            altitude,
            climb_airspeed,
            descent_airspeed
        );
        if !self.pitch_engaged {
            self.engage(Axis::Pitch, data)?;
        }
        self.switch_servos(None, Some(true), None)
    }

    /// Couple to the localizer and glideslope down to `mda` ft. A zero
    /// `descent_airspeed` flies the glideslope; otherwise the descent is
    /// flown at that airspeed.
    pub fn set_ils(&mut self, mda: i32, descent_airspeed: u32, data: &FlightData) -> Result<()> {
        self.require_servos()?;
        if !data.nav.cdi_good {
            return Err(EfisError::NoCdi);
        }
        if !data.nav.gsi_good && descent_airspeed == 0 {
            return Err(EfisError::NoGlideslope);
        }

        self.mode = AutopilotMode::Ils;
        self.desired_altitude = mda;
        self.descent_airspeed = descent_airspeed;
        self.desired_airspeed = descent_airspeed;
        self.ils_desired_heading = data.attitude.heading;
        log::info!("autopilot: ILS to {} ft, descent {} kt", mda, descent_airspeed);

        if !self.roll_engaged {
            self.engage(Axis::Roll, data)?;
        }
        if !self.pitch_engaged {
            self.engage(Axis::Pitch, data)?;
        }
        self.switch_servos(Some(true), Some(true), None)
    }

    /// Track `radial` flying `heading`, which must be the radial (outbound)
    /// or its reciprocal (inbound).
    ///
    /// # Panics
    ///
    /// Panics if either angle is outside 1..=360 or `heading` does not match
    /// the radial.
    pub fn set_vor(&mut self, radial: u32, heading: u32, data: &FlightData) -> Result<()> {
        assert!((1..=360).contains(&radial), "radial {} out of range", radial);
        assert!((1..=360).contains(&heading), "heading {} out of range", heading);
        assert!(
            heading == radial || (heading + 180) % 360 == radial % 360,
            "heading {} does not fly radial {}",
            heading,
            radial
        );
        self.require_servos()?;

        self.mode = AutopilotMode::Vor;
        self.desired_radial = radial;
        self.desired_heading = heading;
        self.ils_desired_heading = f64::from(heading).to_radians();
        log::info!("autopilot: VOR radial {:03} heading {:03}", radial, heading);
        if !self.roll_engaged {
            self.engage(Axis::Roll, data)?;
        }
        self.switch_servos(Some(true), None, None)
    }

    /// # Panics
    ///
    /// Panics unless `min < max`, `min > 10` and `max > 40`.
    pub fn set_airspeed_limits(&mut self, min: u32, max: u32) -> Result<()> {
        assert!(min < max, "airspeed limits inverted: {} >= {}", min, max);
        assert!(min > 10, "minimum airspeed {} too low", min);
        assert!(max > 40, "maximum airspeed {} too low", max);
        self.require_servos()?;
        self.airspeed_limits = Some((min, max));
        Ok(())
    }

    pub fn enable_auto_coordination(&mut self, data: &FlightData) -> Result<()> {
        self.require_servos()?;
        if !self.rudder_engaged {
            self.engage(Axis::Rudder, data)?;
        }
        self.switch_servos(None, None, Some(true))
    }

    pub fn disable_auto_coordination(&mut self) -> Result<()> {
        self.require_servos()?;
        self.rudder_engaged = false;
        if !self.is_engaged() {
            self.last_update_us = None;
        }
        log::info!("autopilot: rudder disengaged");
        self.switch_servos(None, None, Some(false))
    }

    /// Release roll and pitch. Rudder coordination is left as it is.
    pub fn disengage(&mut self) -> Result<()> {
        self.require_servos()?;
        self.roll_engaged = false;
        self.pitch_engaged = false;
        if !self.rudder_engaged {
            self.last_update_us = None;
        }
        log::info!("autopilot: disengaged");
        self.switch_servos(Some(false), Some(false), None)
    }

    // ─── Control law ─────────────────────────────────────────────────────────

    /// One step of every engaged chain. A chain whose inputs are invalid
    /// aborts the step with the matching error; engagement is kept.
    pub fn update(&mut self, data: &FlightData) -> Result<()> {
        self.require_servos()?;

        let now = self.clock.now_us();
        let dt = match self.last_update_us {
            Some(prev) if now > prev => (now - prev) as f64 / 1_000_000.0,
            _ => FIRST_UPDATE_DT,
        };
        self.last_update_us = Some(now);
        self.updates += 1;

        if self.roll_engaged {
            self.update_roll(data, dt)?;
        }
        if self.pitch_engaged {
            self.update_pitch(data, dt)?;
        }
        if self.rudder_engaged {
            self.update_rudder(data)?;
        }

        if self.updates % DEBUG_EVERY == 0 {
            log::debug!(
                "autopilot: dt {:.3} hdg {:03} pitch* {:.2} ail {:.1} elev {:.1} rud {:.1}",
                dt,
                self.desired_heading,
                self.desired_pitch.to_degrees(),
                self.aileron_force,
                self.elevator_force,
                self.rudder_force
            );
        }
        Ok(())
    }

    fn update_roll(&mut self, data: &FlightData, dt: f64) -> Result<()> {
        let attitude = &data.attitude;
        if !attitude.good {
            return Err(EfisError::NoAhrs);
        }

        let target_heading = match self.mode {
            AutopilotMode::Manual => f64::from(self.desired_heading).to_radians(),
            AutopilotMode::Vor | AutopilotMode::Ils => self.track_course(&data.nav, dt)?,
        };

        let c = &self.config;
        let heading_error = normalize_pi(target_heading - attitude.heading);
        let target_roll = limit(
            heading_error * c.roll_angle_amplifier,
            c.min_roll_angle,
            c.max_roll_angle,
        );
        let target_roll_prime = limit(
            (target_roll - attitude.roll) * c.roll_angle_prime_amplifier,
            c.min_roll_angle_prime,
            c.max_roll_angle_prime,
        );
        self.aileron_force = limit(
            self.aileron_force + (target_roll_prime - attitude.roll_prime) * c.roll_force_amplifier * dt,
            c.min_aileron_force,
            c.max_aileron_force,
        );

        let (force, trim) = (self.aileron_force, self.aileron_trim);
        self.servos()?.update_aileron_servo(force, trim)
    }

    /// Steer the course target so the needle centers at a rate proportional
    /// to its deflection. Returns the heading to fly, radians.
    fn track_course(&mut self, nav: &NavReading, dt: f64) -> Result<f64> {
        if !nav.cdi_good {
            return Err(EfisError::NoCdi);
        }
        let cdi = centidegrees_to_radians(f64::from(nav.cdi));
        let cdi_prime = centidegrees_to_radians(nav.cdi_prime);

        let desired_cdi_prime = -self.config.cdi_prime_amplifier * cdi;
        let cdi_prime_error = desired_cdi_prime - cdi_prime;
        self.ils_desired_heading = wrap_two_pi(
            self.ils_desired_heading - self.config.cdi_heading_amplifier * cdi_prime_error * dt,
        );
        self.desired_heading = whole_degrees(self.ils_desired_heading);
        Ok(self.ils_desired_heading)
    }

    fn update_pitch(&mut self, data: &FlightData, dt: f64) -> Result<()> {
        if !data.airspeed.good {
            return Err(EfisError::NoAirspeed);
        }
        if !data.altitude.good {
            return Err(EfisError::NoAltitude);
        }
        if !data.attitude.good {
            return Err(EfisError::NoAhrs);
        }

        self.desired_airspeed = if data.altitude.altitude > self.desired_altitude {
            self.descent_airspeed
        } else {
            self.climb_airspeed
        };

        self.calls_to_pitch += 1;
        let due = self.calls_to_pitch >= self.config.pitch_duty_cycle;
        // Each target nudge stands in for the skipped cycles too
        let step = dt * f64::from(self.config.pitch_duty_cycle.max(1));
        let c = &self.config;

        if self.mode == AutopilotMode::Ils && self.desired_airspeed == 0 {
            if !data.nav.gsi_good {
                return Err(EfisError::NoGlideslope);
            }
            if due {
                self.calls_to_pitch = 0;
                let gsi = centidegrees_to_radians(f64::from(data.nav.gsi));
                let gsi_prime = centidegrees_to_radians(data.nav.gsi_prime);
                let desired_gsi_prime = -c.gsi_prime_amplifier * gsi;
                self.desired_pitch -= c.gsi_pitch_amplifier * (desired_gsi_prime - gsi_prime) * step;
            }
        } else {
            let (primary, working_airspeed) = self.select_primary(data);
            match primary {
                PitchPrimary::Airspeed => {
                    if due {
                        self.calls_to_pitch = 0;
                        let airspeed_error = working_airspeed - f64::from(data.airspeed.knots);
                        let desired_airspeed_prime = c.airspeed_prime_amplifier * airspeed_error;
                        // Too slow lowers the nose
                        self.desired_pitch -= c.airspeed_pitch_amplifier
                            * (desired_airspeed_prime - data.airspeed.knots_prime)
                            * step;
                    }
                }
                PitchPrimary::Altitude => {
                    let altitude_error = f64::from(self.desired_altitude) - f64::from(data.altitude.altitude);
                    let desired_altitude_prime =
                        limit(c.altitude_prime_amplifier * altitude_error, c.min_vsi, c.max_vsi);
                    let pitch_rate_error = self.target_pitch_prime - data.attitude.pitch_prime;
                    if due && pitch_rate_error.abs() < c.pitch_settled_rate {
                        self.calls_to_pitch = 0;
                        self.desired_pitch += c.altitude_pitch_amplifier
                            * (desired_altitude_prime - data.altitude.altitude_prime)
                            * step;
                    }
                }
            }
        }

        let c = &self.config;
        self.desired_pitch = limit(self.desired_pitch, c.min_pitch_angle, c.max_pitch_angle);
        self.target_pitch_prime = (self.desired_pitch - data.attitude.pitch) * c.pitch_prime_amplifier;
        self.elevator_force = limit(
            self.elevator_force
                + (self.target_pitch_prime - data.attitude.pitch_prime) * c.pitch_force_amplifier * dt,
            c.min_elevator_force,
            c.max_elevator_force,
        );

        let (force, trim) = (self.elevator_force, self.elevator_trim);
        self.servos()?.update_elevator_servo(force, trim)
    }

    /// Airspeed takes over far from the target altitude while already near
    /// the target speed, and always when outside the airspeed limits.
    fn select_primary(&self, data: &FlightData) -> (PitchPrimary, f64) {
        let airspeed = f64::from(data.airspeed.knots);
        let mut working = f64::from(self.desired_airspeed);

        if let Some((min, max)) = self.airspeed_limits {
            if airspeed < f64::from(min) {
                return (PitchPrimary::Airspeed, f64::from(min));
            }
            if airspeed > f64::from(max) {
                return (PitchPrimary::Airspeed, f64::from(max));
            }
            working = limit(working, f64::from(min), f64::from(max));
        }

        let altitude_error = f64::from(self.desired_altitude) - f64::from(data.altitude.altitude);
        if altitude_error.abs() > self.config.airspeed_primary_altitude_error
            && (working - airspeed).abs() < self.config.airspeed_primary_airspeed_error
        {
            (PitchPrimary::Airspeed, working)
        } else {
            (PitchPrimary::Altitude, working)
        }
    }

    fn update_rudder(&mut self, data: &FlightData) -> Result<()> {
        if !data.attitude.good {
            return Err(EfisError::NoAhrs);
        }
        let c = &self.config;
        self.rudder_force = limit(
            self.rudder_force + c.rudder_force_amplifier * data.attitude.yaw,
            c.min_rudder_force,
            c.max_rudder_force,
        );
        let (force, trim) = (self.rudder_force, self.rudder_trim);
        self.servos()?.update_rudder_servo(force, trim)
    }

    // ─── Engagement ──────────────────────────────────────────────────────────

    /// Engage one axis from a centered force: run a single update with the
    /// other axes suppressed, then restore them. If that update fails the
    /// axis is left disengaged.
    fn engage(&mut self, axis: Axis, data: &FlightData) -> Result<()> {
        match axis {
            Axis::Roll => self.aileron_force = 0.0,
            Axis::Pitch => {
                self.elevator_force = 0.0;
                self.desired_pitch = limit(
                    data.attitude.pitch,
                    self.config.min_pitch_angle,
                    self.config.max_pitch_angle,
                );
                self.target_pitch_prime = 0.0;
                // Recompute the pitch target on the first update
                self.calls_to_pitch = self.config.pitch_duty_cycle;
            }
            Axis::Rudder => self.rudder_force = 0.0,
        }
        // Nothing has been updating: no dt to measure from
        if !self.is_engaged() {
            self.last_update_us = None;
        }

        let saved = (self.roll_engaged, self.pitch_engaged, self.rudder_engaged);
        self.roll_engaged = axis == Axis::Roll;
        self.pitch_engaged = axis == Axis::Pitch;
        self.rudder_engaged = axis == Axis::Rudder;

        let result = self.update(data);

        self.roll_engaged = saved.0 || (axis == Axis::Roll && result.is_ok());
        self.pitch_engaged = saved.1 || (axis == Axis::Pitch && result.is_ok());
        self.rudder_engaged = saved.2 || (axis == Axis::Rudder && result.is_ok());

        match &result {
            Ok(()) => log::info!("autopilot: {:?} engaged", axis),
            Err(e) => log::warn!("autopilot: {:?} not engaged: {}", axis, e),
        }
        result
    }

    fn require_servos(&self) -> Result<()> {
        if self.servos.is_some() {
            Ok(())
        } else {
            Err(EfisError::NoServos)
        }
    }

    fn servos(&mut self) -> Result<&mut (dyn ServoHardware + Send + 'static)> {
        self.servos.as_deref_mut().ok_or(EfisError::NoServos)
    }

    fn switch_servos(&mut self, roll: Option<bool>, pitch: Option<bool>, rudder: Option<bool>) -> Result<()> {
        self.servos()?.servo_state_change(roll, pitch, rudder)
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn config(&self) -> &AutopilotConfig {
        &self.config
    }

    pub fn mode(&self) -> AutopilotMode {
        self.mode
    }

    pub fn is_roll_engaged(&self) -> bool {
        self.roll_engaged
    }

    pub fn is_pitch_engaged(&self) -> bool {
        self.pitch_engaged
    }

    pub fn is_rudder_engaged(&self) -> bool {
        self.rudder_engaged
    }

    pub fn is_engaged(&self) -> bool {
        self.roll_engaged || self.pitch_engaged || self.rudder_engaged
    }

    pub fn desired_heading(&self) -> u32 {
        self.desired_heading
    }

    pub fn desired_altitude(&self) -> i32 {
        self.desired_altitude
    }

    /// Radians
    pub fn desired_pitch(&self) -> f64 {
        self.desired_pitch
    }

    pub fn aileron_force(&self) -> f64 {
        self.aileron_force
    }

    pub fn elevator_force(&self) -> f64 {
        self.elevator_force
    }

    pub fn rudder_force(&self) -> f64 {
        self.rudder_force
    }

    pub fn status(&self) -> AutopilotStatus {
        AutopilotStatus {
            roll_engaged: self.roll_engaged,
            pitch_engaged: self.pitch_engaged,
            rudder_engaged: self.rudder_engaged,
            mode: self.mode,
            desired_heading: self.desired_heading,
            desired_radial: self.desired_radial,
            desired_altitude: self.desired_altitude,
            desired_airspeed: self.desired_airspeed,
            desired_pitch_deg: self.desired_pitch.to_degrees(),
            aileron_force: self.aileron_force,
            elevator_force: self.elevator_force,
            rudder_force: self.rudder_force,
            updates: self.updates,
        }
    }
}

fn centidegrees_to_radians(value: f64) -> f64 {
    (value / 100.0).to_radians()
}

/// Heading in 1..=360 degrees for display and status
fn whole_degrees(radians: f64) -> u32 {
    let degrees = wrap_two_pi(radians).to_degrees().round() as u32;
    if degrees == 0 {
        360
    } else {
        degrees.min(360)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{ManualClock, MockServos, ServoCommand};

    fn autopilot() -> (Autopilot, MockServos, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let servos = MockServos::new();
        let mut ap = Autopilot::with_clock(AutopilotConfig::default(), Box::new(clock.clone()));
        ap.connect_servos(Box::new(servos.clone()));
        (ap, servos, clock)
    }

    fn flight(heading_deg: f64) -> FlightData {
        FlightData {
            attitude: AttitudeState {
                heading: heading_deg.to_radians(),
                good: true,
                ..Default::default()
            },
            airspeed: AirspeedReading {
                knots: 100,
                knots_prime: 0.0,
                good: true,
            },
            altitude: AltitudeReading {
                pressure_altitude: 5000,
                altitude: 5000,
                good: true,
                ..Default::default()
            },
            nav: NavReading {
                cdi_good: true,
                gsi_good: true,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_set_heading_engages_roll_with_positive_aileron() {
        let (mut ap, servos, _clock) = autopilot();
        let data = flight(0.0);

        // Rudder is engaged first so the bootstrap has a sibling to suppress
        ap.enable_auto_coordination(&data).unwrap();
        let before = servos.log().commands.len();

        ap.set_heading(90, &data).unwrap();
        assert!(ap.is_roll_engaged());
        assert!(ap.is_rudder_engaged());
        assert!(!ap.is_pitch_engaged());
        assert_eq!(ap.mode(), AutopilotMode::Manual);
        assert!(ap.aileron_force() > 0.0);
        assert!(ap.aileron_force() <= 100.0);

        let log = servos.log();
        let bootstrap = &log.commands[before..];
        assert!(bootstrap.iter().any(|c| matches!(c, ServoCommand::Aileron(..))));
        assert!(!bootstrap.iter().any(|c| matches!(c, ServoCommand::Rudder(..))));
        assert!(log.roll_on);
        assert_eq!(
            log.commands.last(),
            Some(&ServoCommand::StateChange {
                roll: Some(true),
                pitch: None,
                rudder: None
            })
        );
    }

    #[test]
    fn test_commands_without_servos_fail_before_mutating() {
        let clock = ManualClock::new(0);
        let mut ap = Autopilot::with_clock(AutopilotConfig::default(), Box::new(clock));
        let data = flight(0.0);

        assert_eq!(ap.set_heading(90, &data), Err(EfisError::NoServos));
        assert_eq!(ap.set_altitude(8000, 120, 140, &data), Err(EfisError::NoServos));
        assert_eq!(ap.set_ils(400, 0, &data), Err(EfisError::NoServos));
        assert_eq!(ap.set_vor(360, 180, &data), Err(EfisError::NoServos));
        assert_eq!(ap.set_airspeed_limits(60, 150), Err(EfisError::NoServos));
        assert_eq!(ap.enable_auto_coordination(&data), Err(EfisError::NoServos));
        assert_eq!(ap.disable_auto_coordination(), Err(EfisError::NoServos));
        assert_eq!(ap.disengage(), Err(EfisError::NoServos));
        assert_eq!(ap.update(&data), Err(EfisError::NoServos));

        let status = ap.status();
        assert!(!status.roll_engaged && !status.pitch_engaged && !status.rudder_engaged);
        assert_eq!(status.mode, AutopilotMode::Manual);
        assert_eq!(status.desired_heading, 360);
        assert_eq!(status.desired_altitude, 0);
        assert_eq!(status.desired_radial, 360);
    }

    #[test]
    fn test_vor_reciprocal_heading_accepted() {
        let (mut ap, _servos, _clock) = autopilot();
        ap.set_vor(360, 180, &flight(180.0)).unwrap();
        assert_eq!(ap.mode(), AutopilotMode::Vor);
        assert!(ap.is_roll_engaged());
        assert_eq!(ap.status().desired_radial, 360);

        ap.set_vor(90, 270, &flight(270.0)).unwrap();
        ap.set_vor(90, 90, &flight(90.0)).unwrap();
    }

    #[test]
    #[should_panic]
    fn test_vor_heading_must_match_radial() {
        let (mut ap, _servos, _clock) = autopilot();
        let _ = ap.set_vor(90, 45, &flight(45.0));
    }

    #[test]
    #[should_panic]
    fn test_heading_zero_rejected() {
        let (mut ap, _servos, _clock) = autopilot();
        let _ = ap.set_heading(0, &flight(0.0));
    }

    #[test]
    #[should_panic]
    fn test_inverted_airspeed_limits() {
        let (mut ap, _servos, _clock) = autopilot();
        let _ = ap.set_airspeed_limits(150, 90);
    }

    #[test]
    fn test_forces_stay_clamped() {
        let (mut ap, servos, clock) = autopilot();
        let mut data = flight(0.0);
        ap.set_heading(180, &data).unwrap();
        ap.set_altitude(20_000, 100, 100, &data).unwrap();
        ap.enable_auto_coordination(&data).unwrap();

        data.attitude.roll_prime = -5.0;
        data.attitude.pitch_prime = -5.0;
        data.attitude.pitch = -0.5;
        data.attitude.yaw = 1.5;
        // The rudder has no dt term and walks slowly into its stop
        for _ in 0..4000 {
            clock.advance_us(1_000_000);
            ap.update(&data).unwrap();
            for force in [ap.aileron_force(), ap.elevator_force(), ap.rudder_force()] {
                assert!((-100.0..=100.0).contains(&force), "force {} escaped", force);
            }
        }
        assert_eq!(ap.aileron_force(), 100.0);
        assert_eq!(ap.elevator_force(), 100.0);
        assert_eq!(ap.rudder_force(), -100.0);
        assert_eq!(servos.log().last_rudder(), Some(-100.0));
    }

    #[test]
    fn test_invalid_ahrs_skips_cycle_but_keeps_engagement() {
        let (mut ap, _servos, clock) = autopilot();
        let mut data = flight(0.0);
        ap.set_heading(90, &data).unwrap();

        data.attitude.good = false;
        clock.advance_us(100_000);
        let err = ap.update(&data).unwrap_err();
        assert_eq!(err, EfisError::NoAhrs);
        assert!(err.is_transient());
        assert!(ap.is_roll_engaged());
        assert_eq!(ap.desired_heading(), 90);
    }

    #[test]
    fn test_engage_failure_leaves_axis_off() {
        let (mut ap, _servos, _clock) = autopilot();
        let mut data = flight(0.0);
        data.attitude.good = false;
        assert_eq!(ap.set_heading(90, &data), Err(EfisError::NoAhrs));
        assert!(!ap.is_roll_engaged());
    }

    #[test]
    fn test_set_altitude_requires_altitude() {
        let (mut ap, _servos, _clock) = autopilot();
        let mut data = flight(0.0);
        data.altitude.good = false;
        assert_eq!(ap.set_altitude(8000, 100, 120, &data), Err(EfisError::NoAltitude));
        assert!(!ap.is_pitch_engaged());
        assert_eq!(ap.desired_altitude(), 0);
    }

    #[test]
    fn test_ils_requires_nav() {
        let (mut ap, _servos, _clock) = autopilot();
        let mut data = flight(0.0);
        data.nav.cdi_good = false;
        assert_eq!(ap.set_ils(500, 0, &data), Err(EfisError::NoCdi));

        data.nav.cdi_good = true;
        data.nav.gsi_good = false;
        assert_eq!(ap.set_ils(500, 0, &data), Err(EfisError::NoGlideslope));
        // A non-precision descent does not need the glideslope
        ap.set_ils(500, 90, &data).unwrap();
        assert!(ap.is_roll_engaged() && ap.is_pitch_engaged());
        assert_eq!(ap.mode(), AutopilotMode::Ils);
    }

    #[test]
    fn test_course_to_the_right_turns_right() {
        let (mut ap, _servos, clock) = autopilot();
        let mut data = flight(90.0);
        ap.set_vor(90, 90, &data).unwrap();

        // Needle two degrees right, steady
        data.nav.cdi = 200;
        let mut last = ap.status().desired_heading;
        for _ in 0..20 {
            clock.advance_us(300_000);
            ap.update(&data).unwrap();
        }
        let now = ap.status().desired_heading;
        assert!(now > last, "course target {} did not move right of {}", now, last);
        assert!(ap.aileron_force() > 0.0);

        // Missing needle aborts the cycle
        data.nav.cdi_good = false;
        clock.advance_us(300_000);
        assert_eq!(ap.update(&data), Err(EfisError::NoCdi));
        last = now;
        assert_eq!(ap.status().desired_heading, last);
    }

    #[test]
    fn test_pitch_target_moves_on_duty_cycle() {
        let (mut ap, _servos, clock) = autopilot();
        let data = flight(0.0);
        // 50 ft low and on speed: altitude is primary
        ap.set_altitude(5050, 100, 100, &data).unwrap();

        let mut last = ap.desired_pitch();
        let mut moved = Vec::new();
        for _ in 0..9 {
            clock.advance_us(100_000);
            ap.update(&data).unwrap();
            moved.push(ap.desired_pitch() != last);
            last = ap.desired_pitch();
        }
        assert_eq!(
            moved,
            vec![false, false, true, false, false, true, false, false, true]
        );
        assert!(ap.desired_pitch() > 0.0);
    }

    #[test]
    fn test_slow_airspeed_lowers_nose() {
        let (mut ap, _servos, clock) = autopilot();
        let mut data = flight(0.0);
        ap.set_airspeed_limits(110, 200).unwrap();
        ap.set_altitude(9000, 120, 120, &data).unwrap();

        data.airspeed.knots = 95;
        for _ in 0..30 {
            clock.advance_us(100_000);
            ap.update(&data).unwrap();
        }
        assert!(ap.desired_pitch() < 0.0);
        assert!(ap.desired_pitch() >= -10f64.to_radians() - 1e-12);
    }

    #[test]
    fn test_glideslope_above_raises_nose() {
        let (mut ap, _servos, clock) = autopilot();
        let mut data = flight(0.0);
        data.altitude.altitude = 3000;
        ap.set_ils(500, 0, &data).unwrap();

        // Glide path half a degree above
        data.nav.gsi = 50;
        let start = ap.desired_pitch();
        for _ in 0..12 {
            clock.advance_us(100_000);
            ap.update(&data).unwrap();
        }
        assert!(ap.desired_pitch() > start);

        data.nav.gsi_good = false;
        clock.advance_us(100_000);
        assert_eq!(ap.update(&data), Err(EfisError::NoGlideslope));
    }

    #[test]
    fn test_rudder_opposes_slip() {
        let (mut ap, servos, clock) = autopilot();
        let mut data = flight(0.0);
        ap.enable_auto_coordination(&data).unwrap();
        data.attitude.yaw = 0.05;
        clock.advance_us(100_000);
        ap.update(&data).unwrap();
        assert!(ap.rudder_force() < 0.0);
        assert_eq!(servos.log().last_rudder(), Some(ap.rudder_force()));

        ap.disable_auto_coordination().unwrap();
        assert!(!ap.is_rudder_engaged());
        assert!(!servos.log().rudder_on);
    }

    #[test]
    fn test_disengage_opens_roll_and_pitch() {
        let (mut ap, servos, _clock) = autopilot();
        let data = flight(0.0);
        ap.set_heading(90, &data).unwrap();
        ap.set_altitude(6000, 100, 100, &data).unwrap();
        ap.enable_auto_coordination(&data).unwrap();

        ap.disengage().unwrap();
        assert!(!ap.is_roll_engaged());
        assert!(!ap.is_pitch_engaged());
        assert!(ap.is_rudder_engaged());

        let log = servos.log();
        assert!(!log.roll_on && !log.pitch_on && log.rudder_on);
        assert_eq!(
            log.commands.last(),
            Some(&ServoCommand::StateChange {
                roll: Some(false),
                pitch: Some(false),
                rudder: None
            })
        );
    }

    #[test]
    fn test_set_altitude_leaves_ils_for_localizer() {
        let (mut ap, _servos, _clock) = autopilot();
        let data = flight(0.0);
        ap.set_ils(500, 0, &data).unwrap();
        ap.set_altitude(3000, 100, 100, &data).unwrap();
        assert_eq!(ap.mode(), AutopilotMode::Vor);
    }

    #[test]
    fn test_reengage_after_idle_starts_from_minimal_dt() {
        let (mut ap, _servos, clock) = autopilot();
        let data = flight(0.0);
        ap.set_heading(10, &data).unwrap();
        let first = ap.aileron_force();
        ap.disengage().unwrap();

        // Two minutes with nothing engaged
        clock.advance_us(120_000_000);
        ap.set_heading(10, &data).unwrap();
        assert!(ap.aileron_force().abs() < 1.0, "aileron {}", ap.aileron_force());
        assert!((ap.aileron_force() - first).abs() < 1e-9);
    }

    #[test]
    fn test_disengage_keeps_rudder_coordinating() {
        let (mut ap, servos, clock) = autopilot();
        let mut data = flight(0.0);
        ap.enable_auto_coordination(&data).unwrap();
        ap.set_heading(10, &data).unwrap();
        ap.disengage().unwrap();

        data.attitude.yaw = 0.05;
        clock.advance_us(300_000);
        ap.update(&data).unwrap();
        assert!(ap.rudder_force() < 0.0);
        assert_eq!(servos.log().last_rudder(), Some(ap.rudder_force()));
    }

    #[test]
    fn test_airspeed_primary_far_from_altitude_and_on_speed() {
        let (mut ap, _servos, _clock) = autopilot();
        // 5000 ft, 100 kt
        let data = flight(0.0);

        ap.desired_altitude = 5500;
        ap.desired_airspeed = 105;
        assert_eq!(ap.select_primary(&data), (PitchPrimary::Airspeed, 105.0));

        ap.desired_altitude = 4500;
        ap.desired_airspeed = 95;
        assert_eq!(ap.select_primary(&data), (PitchPrimary::Airspeed, 95.0));
    }

    #[test]
    fn test_altitude_primary_when_either_threshold_fails() {
        let (mut ap, _servos, _clock) = autopilot();
        let data = flight(0.0);

        // Within 100 ft of the target
        ap.desired_altitude = 5080;
        ap.desired_airspeed = 105;
        assert_eq!(ap.select_primary(&data), (PitchPrimary::Altitude, 105.0));

        // Far from the target but 20 kt off speed
        ap.desired_altitude = 5500;
        ap.desired_airspeed = 120;
        assert_eq!(ap.select_primary(&data), (PitchPrimary::Altitude, 120.0));
    }

    #[test]
    fn test_airspeed_limits_override_and_clamp_target() {
        let (mut ap, _servos, _clock) = autopilot();
        let mut data = flight(0.0);
        ap.set_airspeed_limits(60, 130).unwrap();
        ap.desired_altitude = 5020;

        // Target outside the limits is clamped before comparing
        ap.desired_airspeed = 150;
        assert_eq!(ap.select_primary(&data), (PitchPrimary::Altitude, 130.0));

        data.airspeed.knots = 140;
        assert_eq!(ap.select_primary(&data), (PitchPrimary::Airspeed, 130.0));
        data.airspeed.knots = 55;
        assert_eq!(ap.select_primary(&data), (PitchPrimary::Airspeed, 60.0));
    }

    #[test]
    fn test_climb_or_descent_airspeed_by_altitude() {
        let (mut ap, _servos, clock) = autopilot();
        let mut data = flight(0.0);
        ap.set_altitude(6000, 80, 120, &data).unwrap();
        assert_eq!(ap.status().desired_airspeed, 80);

        data.altitude.altitude = 7000;
        clock.advance_us(100_000);
        ap.update(&data).unwrap();
        assert_eq!(ap.status().desired_airspeed, 120);

        data.altitude.altitude = 5999;
        clock.advance_us(100_000);
        ap.update(&data).unwrap();
        assert_eq!(ap.status().desired_airspeed, 80);
    }

    #[test]
    fn test_extreme_altitude_targets_do_not_overflow() {
        let (mut ap, _servos, clock) = autopilot();
        let mut data = flight(0.0);
        data.altitude.altitude = -100;
        ap.set_altitude(i32::MAX, 80, 120, &data).unwrap();
        for _ in 0..6 {
            clock.advance_us(100_000);
            ap.update(&data).unwrap();
        }
        assert!(ap.desired_pitch() <= 10f64.to_radians() + 1e-12);

        data.altitude.altitude = 100;
        ap.set_altitude(i32::MIN, 80, 120, &data).unwrap();
        for _ in 0..6 {
            clock.advance_us(100_000);
            ap.update(&data).unwrap();
        }
        assert!(ap.desired_pitch().is_finite());
    }

    #[test]
    fn test_duty_cycle() {
        let (ap, _servos, _clock) = autopilot();
        assert_eq!(ap.duty_cycle(30_000), 10);
        assert_eq!(ap.duty_cycle(500_000), 1);
    }

    #[test]
    fn test_whole_degrees() {
        assert_eq!(whole_degrees(0.0), 360);
        assert_eq!(whole_degrees(std::f64::consts::PI), 180);
        assert_eq!(whole_degrees(-0.001), 360);
    }
}
