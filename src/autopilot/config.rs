use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const DEG: f64 = PI / 180.0;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Gains and limits for the three control chains. Angles are radians,
/// forces percent of servo travel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotConfig {
    // ── Roll chain ──
    /// Bank angle per radian of heading error
    pub roll_angle_amplifier: f64,
    /// Roll rate (1/s) per radian of bank error
    pub roll_angle_prime_amplifier: f64,
    /// Aileron percent per rad/s of roll rate error, per second
    pub roll_force_amplifier: f64,

    // ── Course tracking ──
    pub cdi_prime_amplifier: f64,
    pub cdi_heading_amplifier: f64,
    pub gsi_prime_amplifier: f64,
    pub gsi_pitch_amplifier: f64,

    // ── Pitch chain ──
    /// kt/s of airspeed change wanted per knot of error
    pub airspeed_prime_amplifier: f64,
    /// Pitch change (rad/s) per kt/s of airspeed rate error
    pub airspeed_pitch_amplifier: f64,
    /// ft/min wanted per foot of altitude error
    pub altitude_prime_amplifier: f64,
    /// Pitch change (rad/s) per ft/min of climb rate error
    pub altitude_pitch_amplifier: f64,
    /// Pitch rate (1/s) per radian of pitch error
    pub pitch_prime_amplifier: f64,
    /// Elevator percent per rad/s of pitch rate error, per second
    pub pitch_force_amplifier: f64,
    /// Roll loop updates per pitch target update
    pub pitch_duty_cycle: u32,

    // ── Rudder chain ──
    /// Rudder percent per radian of slip, per update
    pub rudder_force_amplifier: f64,

    // ── Limits ──
    pub min_roll_angle: f64,
    pub max_roll_angle: f64,
    pub min_roll_angle_prime: f64,
    pub max_roll_angle_prime: f64,
    pub min_pitch_angle: f64,
    pub max_pitch_angle: f64,
    pub min_aileron_force: f64,
    pub max_aileron_force: f64,
    pub min_elevator_force: f64,
    pub max_elevator_force: f64,
    pub min_rudder_force: f64,
    pub max_rudder_force: f64,
    /// ft/min
    pub min_vsi: f64,
    pub max_vsi: f64,

    // ── Primary instrument selection ──
    /// Altitude error (ft) beyond which airspeed may take over
    pub airspeed_primary_altitude_error: f64,
    /// Airspeed error (kt) within which airspeed may take over
    pub airspeed_primary_airspeed_error: f64,
    /// Pitch rate error (rad/s) below which the altitude loop may move the target
    pub pitch_settled_rate: f64,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            roll_angle_amplifier: 1.5,
            roll_angle_prime_amplifier: 0.5,
            roll_force_amplifier: 2.0 / DEG,
            cdi_prime_amplifier: 0.2,
            cdi_heading_amplifier: 0.5,
            gsi_prime_amplifier: 0.2,
            gsi_pitch_amplifier: 1.0 / (2.0 * PI),
            airspeed_prime_amplifier: 1.0,
            airspeed_pitch_amplifier: 0.05 * DEG,
            altitude_prime_amplifier: 1.5,
            altitude_pitch_amplifier: 5.0 * DEG / (2000.0 * 10.0),
            pitch_prime_amplifier: 0.2,
            pitch_force_amplifier: 5.0 / DEG,
            pitch_duty_cycle: 3,
            rudder_force_amplifier: -DEG,
            min_roll_angle: -35.0 * DEG,
            max_roll_angle: 35.0 * DEG,
            min_roll_angle_prime: -10.0 * DEG,
            max_roll_angle_prime: 10.0 * DEG,
            min_pitch_angle: -10.0 * DEG,
            max_pitch_angle: 10.0 * DEG,
            min_aileron_force: -100.0,
            max_aileron_force: 100.0,
            min_elevator_force: -100.0,
            max_elevator_force: 100.0,
            min_rudder_force: -100.0,
            max_rudder_force: 100.0,
            min_vsi: -1000.0,
            max_vsi: 1000.0,
            airspeed_primary_altitude_error: 100.0,
            airspeed_primary_airspeed_error: 10.0,
            pitch_settled_rate: 2.0 * DEG,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits_are_ordered() {
        let c = AutopilotConfig::default();
        assert!(c.min_roll_angle < c.max_roll_angle);
        assert!(c.min_roll_angle_prime < c.max_roll_angle_prime);
        assert!(c.min_pitch_angle < c.max_pitch_angle);
        assert!(c.min_vsi < c.max_vsi);
        assert_eq!(c.max_aileron_force, 100.0);
        assert!(c.rudder_force_amplifier < 0.0);
        assert_eq!(c.pitch_duty_cycle, 3);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let c: AutopilotConfig =
            serde_json::from_str(r#"{ "roll_angle_amplifier": 2.0, "pitch_duty_cycle": 5 }"#).unwrap();
        assert_eq!(c.roll_angle_amplifier, 2.0);
        assert_eq!(c.pitch_duty_cycle, 5);
        assert_eq!(c.cdi_prime_amplifier, 0.2);
    }
}
