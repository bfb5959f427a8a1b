// efis.rs: Scheduler and dependency context for the EFIS core
//
// `Efis` owns one of each component and is the only place they meet:
//   - instruments and the AHRS are polled on their own duty cycles
//   - the autopilot gets a read-only `FlightData` snapshot each step
//   - commands are dispatched with a fresh snapshot
//
// It takes no wall-clock time of its own. A driver calls `tick()` once per
// main loop interval and reacts to the returned events.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ahrs::{Ahrs, AttitudeState};
use crate::autopilot::{Autopilot, AutopilotConfig, AutopilotStatus, FlightData};
use crate::error::{EfisError, Result};
use crate::instruments::{
    Airspeed, AirspeedReading, Altitude, AltitudeReading, Compass, CompassReading, Gps, GpsReading, Nav,
    NavReading,
};
use crate::units::DEFAULT_MAIN_LOOP_INTERVAL_US;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EfisConfig {
    pub main_loop_interval_us: u32,
    /// At or above this airspeed or ground speed the AHRS runs in flight mode
    pub flying_airspeed_kt: u32,
    /// Tunables file for the attitude filter
    pub ahrs_constants: Option<PathBuf>,
    pub autopilot: AutopilotConfig,
}

impl Default for EfisConfig {
    fn default() -> Self {
        Self {
            main_loop_interval_us: DEFAULT_MAIN_LOOP_INTERVAL_US,
            flying_airspeed_kt: 40,
            ahrs_constants: None,
            autopilot: AutopilotConfig::default(),
        }
    }
}

impl EfisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| EfisError::NoSuchFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config: EfisConfig =
            serde_json::from_str(&text).map_err(|e| EfisError::BadConfig(e.to_string()))?;
        if config.main_loop_interval_us == 0 {
            return Err(EfisError::BadConfig("main_loop_interval_us must be positive".into()));
        }
        Ok(config)
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum EfisEvent {
    AttitudeValidity { good: bool },
    FlightPhase { flying: bool },
    InstrumentFault { instrument: &'static str, error: EfisError },
    AutopilotCycleSkipped(EfisError),
}

// ─── Commands ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum AutopilotCommand {
    SetHeading(u32),
    SetAltitude { altitude: i32, climb_airspeed: u32, descent_airspeed: u32 },
    SetIls { mda: i32, descent_airspeed: u32 },
    SetVor { radial: u32, heading: u32 },
    SetAirspeedLimits { min: u32, max: u32 },
    EnableAutoCoordination,
    DisableAutoCoordination,
    Disengage,
}

// ─── Duty cycles ─────────────────────────────────────────────────────────────

/// Ticks between updates; `None` for a component with no hardware.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DutyCycles {
    pub ahrs: u32,
    pub gps: Option<u32>,
    pub compass: Option<u32>,
    pub airspeed: Option<u32>,
    pub altitude: Option<u32>,
    pub nav: Option<u32>,
    pub autopilot: Option<u32>,
}

fn due(duty: Option<u32>, tick: u64) -> bool {
    duty.map_or(false, |d| tick % u64::from(d.max(1)) == 0)
}

fn installed(name: &str, duty: Result<u32>) -> Result<Option<u32>> {
    match duty {
        Ok(ticks) => Ok(Some(ticks)),
        Err(EfisError::NoIoBoard) => {
            log::info!("efis: no {} installed", name);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize)]
pub struct EfisSnapshot {
    pub tick: u64,
    pub flying: bool,
    pub attitude: AttitudeState,
    pub airspeed: AirspeedReading,
    pub altitude: AltitudeReading,
    pub compass: CompassReading,
    pub gps: GpsReading,
    pub nav: NavReading,
    pub autopilot: AutopilotStatus,
}

// ─── The context ─────────────────────────────────────────────────────────────

pub struct Efis {
    config: EfisConfig,
    pub ahrs: Ahrs,
    pub airspeed: Airspeed,
    pub altitude: Altitude,
    pub compass: Compass,
    pub gps: Gps,
    pub nav: Nav,
    pub autopilot: Autopilot,
    duty: Option<DutyCycles>,
    ticks: u64,
    flying: bool,
    attitude_good: bool,
}

impl Efis {
    pub fn new(config: EfisConfig) -> Self {
        let autopilot = Autopilot::new(config.autopilot.clone());
        Self::with_components(config, Ahrs::new(), autopilot)
    }

    /// Supply a specific AHRS (e.g. [`Ahrs::cooked`]) or an autopilot with
    /// its own clock.
    pub fn with_components(config: EfisConfig, ahrs: Ahrs, autopilot: Autopilot) -> Self {
        Self {
            config,
            ahrs,
            airspeed: Airspeed::new(),
            altitude: Altitude::new(),
            compass: Compass::new(),
            gps: Gps::new(),
            nav: Nav::new(),
            autopilot,
            duty: None,
            ticks: 0,
            flying: false,
            attitude_good: false,
        }
    }

    /// Load AHRS tunables and work out every component's duty cycle. Called
    /// by the first `tick()` if not called before.
    pub fn configure(&mut self) -> Result<DutyCycles> {
        if !self.ahrs.is_connected() {
            return Err(EfisError::NoIoBoard);
        }
        if let Some(path) = self.config.ahrs_constants.clone() {
            if let Some(err) = self.ahrs.init_constants(&path)? {
                log::warn!("efis: {} has errors, first at {}", path.display(), err);
            }
        }

        let interval = self.config.main_loop_interval_us;
        let duty = DutyCycles {
            ahrs: self.ahrs.duty_cycle(interval),
            gps: installed("gps", self.gps.duty_cycle(interval))?,
            compass: installed("compass", self.compass.duty_cycle(interval))?,
            airspeed: installed("airspeed", self.airspeed.duty_cycle(interval))?,
            altitude: installed("altimeter", self.altitude.duty_cycle(interval))?,
            nav: installed("nav radio", self.nav.duty_cycle(interval))?,
            autopilot: if self.autopilot.is_connected() {
                Some(self.autopilot.duty_cycle(interval))
            } else {
                log::info!("efis: no autopilot servos installed");
                None
            },
        };
        log::info!("efis: duty cycles {:?} at {} us", duty, interval);
        self.duty = Some(duty);
        Ok(duty)
    }

    /// One main loop iteration.
    pub fn tick(&mut self) -> Result<Vec<EfisEvent>> {
        let duty = match self.duty {
            Some(duty) => duty,
            None => self.configure()?,
        };
        let tick = self.ticks;
        self.ticks += 1;
        let mut events = Vec::new();

        if due(duty.gps, tick) {
            fault("gps", self.gps.update(), &mut events)?;
        }
        if due(duty.compass, tick) {
            fault("compass", self.compass.update(), &mut events)?;
        }
        if due(duty.airspeed, tick) {
            fault("airspeed", self.airspeed.update(), &mut events)?;
        }
        if due(duty.altitude, tick) {
            fault("altimeter", self.altitude.update(), &mut events)?;
        }
        if due(duty.nav, tick) {
            fault("nav radio", self.nav.update(), &mut events)?;
        }

        if due(Some(duty.ahrs), tick) {
            let flying = self.is_moving();
            if flying != self.flying {
                self.flying = flying;
                events.push(EfisEvent::FlightPhase { flying });
            }
            let result = if flying {
                self.ahrs
                    .sample_and_compute(self.gps.reading(), self.compass.reading())
            } else {
                self.ahrs.sample_and_compute_still(self.compass.reading())
            };
            fault("ahrs", result, &mut events)?;

            let good = self.ahrs.state().good;
            if good != self.attitude_good {
                self.attitude_good = good;
                events.push(EfisEvent::AttitudeValidity { good });
            }
        }

        if due(duty.autopilot, tick) && self.autopilot.is_engaged() {
            let data = self.flight_data();
            match self.autopilot.update(&data) {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    log::warn!("efis: autopilot cycle skipped: {}", e);
                    events.push(EfisEvent::AutopilotCycleSkipped(e));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(events)
    }

    pub fn command(&mut self, command: AutopilotCommand) -> Result<()> {
        let data = self.flight_data();
        match command {
            AutopilotCommand::SetHeading(heading) => self.autopilot.set_heading(heading, &data),
            AutopilotCommand::SetAltitude {
                altitude,
                climb_airspeed,
                descent_airspeed,
            } => self.autopilot.set_altitude(altitude, climb_airspeed, descent_airspeed, &data),
            AutopilotCommand::SetIls { mda, descent_airspeed } => self.autopilot.set_ils(mda, descent_airspeed, &data),
            AutopilotCommand::SetVor { radial, heading } => self.set_vor(radial, heading),
            AutopilotCommand::SetAirspeedLimits { min, max } => self.autopilot.set_airspeed_limits(min, max),
            AutopilotCommand::EnableAutoCoordination => self.autopilot.enable_auto_coordination(&data),
            AutopilotCommand::DisableAutoCoordination => self.autopilot.disable_auto_coordination(),
            AutopilotCommand::Disengage => self.autopilot.disengage(),
        }
    }

    /// The course flown becomes the selected course before the roll axis
    /// bootstraps, so tracking starts from the deviation it will steer by.
    fn set_vor(&mut self, radial: u32, heading: u32) -> Result<()> {
        let previous_obs = self.nav.reading().obs;
        if self.nav.is_connected() {
            self.nav.set_obs(heading);
        }
        let data = self.flight_data();
        let result = self.autopilot.set_vor(radial, heading, &data);
        if result.is_err() && self.nav.is_connected() {
            self.nav.set_obs(previous_obs);
        }
        result
    }

    pub fn flight_data(&self) -> FlightData {
        FlightData {
            attitude: *self.ahrs.state(),
            airspeed: *self.airspeed.reading(),
            altitude: *self.altitude.reading(),
            nav: *self.nav.reading(),
        }
    }

    pub fn snapshot(&self) -> EfisSnapshot {
        EfisSnapshot {
            tick: self.ticks,
            flying: self.flying,
            attitude: *self.ahrs.state(),
            airspeed: *self.airspeed.reading(),
            altitude: *self.altitude.reading(),
            compass: *self.compass.reading(),
            gps: *self.gps.reading(),
            nav: *self.nav.reading(),
            autopilot: self.autopilot.status(),
        }
    }

    pub fn config(&self) -> &EfisConfig {
        &self.config
    }

    pub fn duty_cycles(&self) -> Option<DutyCycles> {
        self.duty
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_flying(&self) -> bool {
        self.flying
    }

    fn is_moving(&self) -> bool {
        let threshold = self.config.flying_airspeed_kt;
        let airspeed = self.airspeed.reading();
        let gps = self.gps.reading();
        (airspeed.good && airspeed.knots >= threshold) || (gps.good && gps.ground_speed >= threshold)
    }
}

/// Driver failures become events so one bad serial frame does not stop the
/// loop; anything else propagates.
fn fault(instrument: &'static str, result: Result<bool>, events: &mut Vec<EfisEvent>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(error @ EfisError::BadIoDriver(_)) => {
            log::warn!("efis: {} fault: {}", instrument, error);
            events.push(EfisEvent::InstrumentFault { instrument, error });
            Ok(())
        }
        Err(e) => Err(e),
    }
}
