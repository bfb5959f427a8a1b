use serde::{Deserialize, Serialize};
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::autopilot::AutopilotMode;
use crate::efis::EfisSnapshot;

/// Flat panel readout, written out periodically for an external display.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub tick: u64,
    pub uptime_seconds: f64,
    pub flying: bool,
    // Attitude, degrees
    pub attitude_good: bool,
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub heading_deg: f64,
    pub yaw_deg: f64,
    // Air data
    pub airspeed_kt: u32,
    pub airspeed_trend: f64,
    pub altitude_ft: i32,
    pub vsi_fpm: f64,
    pub altimeter_inhg: f64,
    // GPS
    pub gps_good: bool,
    pub gps_lat: f64,
    pub gps_lng: f64,
    pub ground_track: u32,
    pub ground_speed_kt: u32,
    // Nav, degrees
    pub obs: u32,
    pub cdi_deg: Option<f64>,
    pub gsi_deg: Option<f64>,
    pub to_flag: bool,
    // Autopilot
    pub ap_mode: AutopilotMode,
    pub ap_roll: bool,
    pub ap_pitch: bool,
    pub ap_rudder: bool,
    pub ap_heading: u32,
    pub ap_altitude: i32,
    pub ap_airspeed: u32,
    pub aileron_force: f64,
    pub elevator_force: f64,
    pub rudder_force: f64,
}

impl LiveStatus {
    pub fn from_snapshot(snapshot: &EfisSnapshot, uptime_seconds: f64) -> Self {
        let a = &snapshot.attitude;
        let nav = &snapshot.nav;
        let ap = &snapshot.autopilot;
        Self {
            timestamp: current_timestamp(),
            tick: snapshot.tick,
            uptime_seconds,
            flying: snapshot.flying,
            attitude_good: a.good,
            roll_deg: a.roll.to_degrees(),
            pitch_deg: a.pitch.to_degrees(),
            heading_deg: a.heading_deg(),
            yaw_deg: a.yaw.to_degrees(),
            airspeed_kt: snapshot.airspeed.knots,
            airspeed_trend: snapshot.airspeed.knots_prime,
            altitude_ft: snapshot.altitude.altitude,
            vsi_fpm: snapshot.altitude.altitude_prime,
            altimeter_inhg: snapshot.altitude.altimeter,
            gps_good: snapshot.gps.good,
            gps_lat: snapshot.gps.lat,
            gps_lng: snapshot.gps.lng,
            ground_track: snapshot.gps.ground_track,
            ground_speed_kt: snapshot.gps.ground_speed,
            obs: nav.obs,
            cdi_deg: nav.cdi_good.then(|| f64::from(nav.cdi) / 100.0),
            gsi_deg: nav.gsi_good.then(|| f64::from(nav.gsi) / 100.0),
            to_flag: nav.to,
            ap_mode: ap.mode,
            ap_roll: ap.roll_engaged,
            ap_pitch: ap.pitch_engaged,
            ap_rudder: ap.rudder_engaged,
            ap_heading: ap.desired_heading,
            ap_altitude: ap.desired_altitude,
            ap_airspeed: ap.desired_airspeed,
            aileron_force: ap.aileron_force,
            elevator_force: ap.elevator_force,
            rudder_force: ap.rudder_force,
        }
    }

    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
