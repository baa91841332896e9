//! Vehicle decision engine: predictive safety layer, constraint solver, fuzzy controller,
//! adversarial search, pathfinding and the arbiter that dispatches between them every tick.

pub mod arbiter;
pub mod astar;
pub mod csp;
pub mod fuzzy;
pub mod minimax;
pub mod safety;

use crate::core::track::Track;
use crate::core::vehicle::Vehicle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lateral distance (px) below which a vehicle counts as arrived at its target lane center.
pub const LANE_ARRIVAL_TOLERANCE: f64 = 5.0;

/// Speed above which steering is one pixel per tick slower.
const FAST_STEERING_SPEED: f64 = 6.0;

/// Speed gained per tick when maintaining speed below 95% of the limit.
const MAINTAIN_DRIFT: f64 = 0.05;

/// Cruise braking never drops below this fraction of the speed limit.
const CRUISE_BRAKE_FLOOR: f64 = 0.5;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SpeedAction {
    Accelerate,
    Maintain,
    Brake,
}

pub const SPEED_ACTIONS: [SpeedAction; 3] = [
    SpeedAction::Accelerate,
    SpeedAction::Maintain,
    SpeedAction::Brake,
];

/// Decision is one element of the 3 lanes x 3 speed actions action space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub lane: usize,
    pub speed_action: SpeedAction,
}

impl Decision {
    pub fn new(lane: usize, speed_action: SpeedAction) -> Decision {
        Decision { lane, speed_action }
    }
}

/// Ordinal danger classification produced by the safety layer.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    None,
    Low,
    Moderate,
    High,
    Critical,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Urgency::None => "none",
            Urgency::Low => "low",
            Urgency::Moderate => "moderate",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        };
        write!(f, "{}", name)
    }
}

/// The controller that executed a tick's decision.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Controller {
    Idle,
    SafetyOverride,
    Safety,
    Fuzzy,
    Minimax,
    #[serde(rename = "astar")]
    AStar,
    Csp,
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Controller::Idle => "idle",
            Controller::SafetyOverride => "safety_override",
            Controller::Safety => "safety",
            Controller::Fuzzy => "fuzzy",
            Controller::Minimax => "minimax",
            Controller::AStar => "astar",
            Controller::Csp => "csp",
        };
        write!(f, "{}", name)
    }
}

/// steering_rate returns the lateral rate used for regular lane changes, which is one pixel per
/// tick slower at high speed.
pub fn steering_rate(vehicle: &Vehicle) -> f64 {
    if vehicle.speed > FAST_STEERING_SPEED {
        (vehicle.steering_rate - 1.0).max(1.0)
    } else {
        vehicle.steering_rate
    }
}

/// apply_decision executes a discrete decision on the vehicle: smooth steering toward the target
/// lane center and one speed step, followed by re-clamping the kinematic state.
pub fn apply_decision(vehicle: &mut Vehicle, decision: Decision, track: &Track) {
    let target_x = track.lane_center_x(decision.lane);
    if (target_x - vehicle.x).abs() > LANE_ARRIVAL_TOLERANCE {
        let rate = steering_rate(vehicle);
        vehicle.steer_towards(target_x, rate);
    }

    let limit = vehicle.speed_limit();
    match decision.speed_action {
        SpeedAction::Accelerate => vehicle.accelerate(1.0),
        SpeedAction::Maintain => {
            if vehicle.speed < limit * 0.95 {
                vehicle.speed = (vehicle.speed + MAINTAIN_DRIFT).min(limit);
            }
        }
        SpeedAction::Brake => {
            let floor = (limit * CRUISE_BRAKE_FLOOR).min(vehicle.speed);
            vehicle.speed = (vehicle.speed - vehicle.brake_rate).max(floor);
        }
    }

    vehicle.clamp_state(track);
}

/// approach_speed moves the vehicle's speed toward target_speed using its role-specific
/// acceleration and brake rates.
pub fn approach_speed(vehicle: &mut Vehicle, target_speed: f64) {
    let target_speed = target_speed.max(0.0).min(vehicle.speed_limit());
    if vehicle.speed < target_speed {
        vehicle.speed = (vehicle.speed + vehicle.acceleration_rate).min(target_speed);
    } else if vehicle.speed > target_speed {
        vehicle.speed = (vehicle.speed - vehicle.brake_rate).max(target_speed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vehicle::VehiclePars;
    use approx::assert_relative_eq;

    #[test]
    fn urgency_is_ordered() {
        assert!(Urgency::Critical > Urgency::High);
        assert!(Urgency::Low > Urgency::None);
    }

    #[test]
    fn cruise_brake_never_raises_speed() {
        let track = Track::default();
        let mut thief = Vehicle::new(&VehiclePars::default_thief(), &track);
        thief.speed = 2.0;
        apply_decision(&mut thief, Decision::new(1, SpeedAction::Brake), &track);
        assert_relative_eq!(thief.speed, 2.0);

        thief.speed = 8.0;
        apply_decision(&mut thief, Decision::new(1, SpeedAction::Brake), &track);
        assert_relative_eq!(thief.speed, 7.7, epsilon = 1e-9);
    }

    #[test]
    fn apply_decision_steers_toward_lane() {
        let track = Track::default();
        let mut thief = Vehicle::new(&VehiclePars::default_thief(), &track);
        thief.speed = 7.0;
        apply_decision(&mut thief, Decision::new(2, SpeedAction::Accelerate), &track);
        assert_relative_eq!(thief.x, track.lane_center_x(1) + 4.0);
        assert_relative_eq!(thief.speed, 7.2, epsilon = 1e-9);
    }

    #[test]
    fn approach_speed_uses_role_rates() {
        let track = Track::default();
        let mut police = Vehicle::new(&VehiclePars::default_police(), &track);
        approach_speed(&mut police, 8.0);
        assert_relative_eq!(police.speed, 0.22, epsilon = 1e-9);
        police.speed = 5.0;
        approach_speed(&mut police, 4.9);
        assert_relative_eq!(police.speed, 4.9, epsilon = 1e-9);
    }
}
