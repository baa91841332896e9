use crate::core::track::Track;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hard cap on any vehicle's speed (units/tick), independent of power-up multipliers.
pub const ABSOLUTE_MAX_SPEED: f64 = 12.0;

/// Number of ticks a crashed vehicle stays out of control.
pub const CRASH_TICKS: u32 = 60;

/// Fraction of speed a vehicle keeps after crashing.
const CRASH_SPEED_FACTOR: f64 = 0.3;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Thief,
    Police,
}

impl Role {
    pub fn opponent(self) -> Role {
        match self {
            Role::Thief => Role::Police,
            Role::Police => Role::Thief,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Role::Thief => write!(f, "thief"),
            Role::Police => write!(f, "police"),
        }
    }
}

/// Selects which controller drives a vehicle.
/// * `Arbiter` - safety layer plus situational dispatch to fuzzy/minimax/A*/safety controllers
/// * `Csp` - the constraint solver drives the vehicle directly
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ControllerMode {
    Arbiter,
    Csp,
}

impl Default for ControllerMode {
    fn default() -> Self {
        ControllerMode::Arbiter
    }
}

/// * `role` - Thief or police
/// * `color` - CSS hex color used by observers
/// * `start_lane` - Lane the vehicle starts in
/// * `start_distance` - (units) Longitudinal start position
/// * `max_speed` - (units/tick) Base maximum speed without power-ups
/// * `acceleration_rate` - (units/tick^2) Speed gained per tick at full throttle
/// * `brake_rate` - (units/tick^2) Speed lost per tick at full braking
/// * `steering_rate` - (px/tick) Lateral speed when changing lanes
/// * `max_steering_rate` - (px/tick) Lateral speed during emergency maneuvers
#[derive(Debug, Deserialize, Clone)]
pub struct VehiclePars {
    pub role: Role,
    pub color: String,
    pub start_lane: usize,
    pub start_distance: f64,
    pub max_speed: f64,
    pub acceleration_rate: f64,
    pub brake_rate: f64,
    #[serde(default = "default_steering_rate")]
    pub steering_rate: f64,
    #[serde(default = "default_max_steering_rate")]
    pub max_steering_rate: f64,
    #[serde(default)]
    pub controller_mode: ControllerMode,
}

fn default_steering_rate() -> f64 {
    5.0
}

fn default_max_steering_rate() -> f64 {
    8.0
}

impl VehiclePars {
    pub fn default_thief() -> VehiclePars {
        VehiclePars {
            role: Role::Thief,
            color: String::from("#dc143c"),
            start_lane: 1,
            start_distance: 0.0,
            max_speed: 8.0,
            acceleration_rate: 0.2,
            brake_rate: 0.3,
            steering_rate: default_steering_rate(),
            max_steering_rate: default_max_steering_rate(),
            controller_mode: ControllerMode::Arbiter,
        }
    }

    pub fn default_police() -> VehiclePars {
        VehiclePars {
            role: Role::Police,
            color: String::from("#1e90ff"),
            start_lane: 1,
            start_distance: -300.0,
            max_speed: 8.0,
            acceleration_rate: 0.22,
            brake_rate: 0.32,
            steering_rate: default_steering_rate(),
            max_steering_rate: default_max_steering_rate(),
            controller_mode: ControllerMode::Arbiter,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    pub role: Role,
    pub color: String,
    pub controller_mode: ControllerMode,
    pub x: f64,
    pub distance: f64,
    pub speed: f64,
    /// Current maximum speed, i.e. the base value scaled by active power-ups.
    pub max_speed: f64,
    base_max_speed: f64,
    pub acceleration_rate: f64,
    pub brake_rate: f64,
    pub steering_rate: f64,
    pub max_steering_rate: f64,
    pub crashed: bool,
    pub crash_timer: u32,
    pub shield_active: bool,
    pub ghost_active: bool,
}

impl Vehicle {
    pub fn new(vehicle_pars: &VehiclePars, track: &Track) -> Vehicle {
        Vehicle {
            role: vehicle_pars.role,
            color: vehicle_pars.color.to_owned(),
            controller_mode: vehicle_pars.controller_mode,
            x: track.lane_center_x(vehicle_pars.start_lane),
            distance: vehicle_pars.start_distance,
            speed: 0.0,
            max_speed: vehicle_pars.max_speed,
            base_max_speed: vehicle_pars.max_speed,
            acceleration_rate: vehicle_pars.acceleration_rate,
            brake_rate: vehicle_pars.brake_rate,
            steering_rate: vehicle_pars.steering_rate,
            max_steering_rate: vehicle_pars.max_steering_rate,
            crashed: false,
            crash_timer: 0,
            shield_active: false,
            ghost_active: false,
        }
    }

    pub fn lane(&self, track: &Track) -> usize {
        track.lane_from_x(self.x)
    }

    /// The method returns the effective speed limit, i.e. the current maximum speed capped by
    /// the absolute limit.
    pub fn speed_limit(&self) -> f64 {
        self.max_speed.min(ABSOLUTE_MAX_SPEED)
    }

    pub fn speed_ratio(&self) -> f64 {
        let limit = self.speed_limit();
        if limit > 0.0 {
            (self.speed / limit).max(0.0).min(1.0)
        } else {
            0.0
        }
    }

    /// The method scales the base maximum speed by the product of all active power-up
    /// multipliers.
    pub fn set_speed_multiplier(&mut self, multiplier: f64) {
        self.max_speed = self.base_max_speed * multiplier;
    }

    /// The method moves the vehicle laterally toward target_x by at most rate pixels.
    pub fn steer_towards(&mut self, target_x: f64, rate: f64) {
        let dx = target_x - self.x;
        if dx.abs() <= rate {
            self.x = target_x;
        } else {
            self.x += rate * dx.signum();
        }
    }

    pub fn accelerate(&mut self, throttle: f64) {
        self.speed += self.acceleration_rate * throttle.max(0.0);
    }

    pub fn brake(&mut self, intensity: f64) {
        self.speed -= self.brake_rate * intensity.max(0.0);
    }

    /// The method re-establishes the speed and lateral bound invariants. It must be called after
    /// every mutation of the kinematic state.
    pub fn clamp_state(&mut self, track: &Track) {
        if !self.speed.is_finite() {
            self.speed = 0.0;
        }
        self.speed = self.speed.max(0.0).min(self.speed_limit());
        self.x = track.clamp_x(self.x);
    }

    /// The method advances the vehicle by its current speed (one tick).
    pub fn advance(&mut self) {
        self.distance += self.speed;
    }

    pub fn crash(&mut self) {
        self.crashed = true;
        self.crash_timer = CRASH_TICKS;
        self.speed = (self.speed * CRASH_SPEED_FACTOR).max(0.0);
    }

    /// The method counts the crash timer down and clears the crash state once it expires.
    pub fn update_crash(&mut self) {
        if self.crashed && self.crash_timer > 0 {
            self.crash_timer -= 1;
            if self.crash_timer == 0 {
                self.crashed = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn vehicle_starts_in_lane_center() {
        let track = Track::default();
        let thief = Vehicle::new(&VehiclePars::default_thief(), &track);
        assert_relative_eq!(thief.x, track.lane_center_x(1));
        assert_eq!(thief.lane(&track), 1);
        assert_relative_eq!(thief.speed, 0.0);
    }

    #[test]
    fn clamp_state_enforces_bounds() {
        let track = Track::default();
        let mut police = Vehicle::new(&VehiclePars::default_police(), &track);
        police.set_speed_multiplier(2.0);
        police.speed = 40.0;
        police.x = 2000.0;
        police.clamp_state(&track);
        assert_relative_eq!(police.speed, ABSOLUTE_MAX_SPEED);
        assert_relative_eq!(police.x, track.lateral_bounds().1);

        police.speed = -1.0;
        police.clamp_state(&track);
        assert_relative_eq!(police.speed, 0.0);
    }

    #[test]
    fn crash_recovers_after_timer() {
        let track = Track::default();
        let mut thief = Vehicle::new(&VehiclePars::default_thief(), &track);
        thief.speed = 8.0;
        thief.crash();
        assert!(thief.crashed);
        assert_relative_eq!(thief.speed, 2.4, epsilon = 1e-9);

        for _ in 0..CRASH_TICKS {
            thief.update_crash();
        }
        assert!(!thief.crashed);
    }

    #[test]
    fn steering_does_not_overshoot() {
        let track = Track::default();
        let mut thief = Vehicle::new(&VehiclePars::default_thief(), &track);
        thief.steer_towards(thief.x + 3.0, 5.0);
        assert_relative_eq!(thief.x, track.lane_center_x(1) + 3.0);
        thief.steer_towards(0.0, 5.0);
        assert_relative_eq!(thief.x, track.lane_center_x(1) - 2.0);
    }
}
