use crate::core::track::NO_LANES;
use crate::core::vehicle::{Role, Vehicle};
use crate::core::world::WorldSnapshot;
use crate::decision::{Decision, SpeedAction, SPEED_ACTIONS};
use serde::Deserialize;
use tracing::debug;

/// * `safety_box_distance` - (units) Longitudinal half-size of the box around the vehicle in
/// which a traffic car blocks a target lane
/// * `safety_box_lateral` - (units) Lateral half-size of that box
/// * `double_jump_speed` - (units/tick) Speed above which a two-lane jump is forbidden
/// * `powerup_window` - (units) Power-ups further ahead than this are ignored
/// * `clearance_window` - (units) Look-ahead window for the traffic clearance term
#[derive(Debug, Deserialize, Clone)]
pub struct CspPars {
    pub safety_box_distance: f64,
    pub safety_box_lateral: f64,
    pub double_jump_speed: f64,
    pub powerup_window: f64,
    pub clearance_window: f64,
}

impl Default for CspPars {
    fn default() -> Self {
        CspPars {
            safety_box_distance: 120.0,
            safety_box_lateral: 40.0,
            double_jump_speed: 6.0,
            powerup_window: 600.0,
            clearance_window: 400.0,
        }
    }
}

/// CspDecisionMaker filters the 9-action domain by hard constraints and returns the survivor with
/// the highest soft score.
#[derive(Debug, Clone, Default)]
pub struct CspDecisionMaker {
    pub pars: CspPars,
}

impl CspDecisionMaker {
    pub fn new(pars: CspPars) -> CspDecisionMaker {
        CspDecisionMaker { pars }
    }

    /// All (lane, speed action) combinations in a fixed order.
    pub fn domain() -> Vec<Decision> {
        (0..NO_LANES)
            .flat_map(|lane| {
                SPEED_ACTIONS
                    .iter()
                    .map(move |&speed_action| Decision::new(lane, speed_action))
            })
            .collect()
    }

    pub fn solve_lane_decision(&self, vehicle: &Vehicle, world: &WorldSnapshot) -> Decision {
        let current_lane = vehicle.lane(world.track);

        let mut best: Option<(Decision, f64)> = None;
        for action in CspDecisionMaker::domain() {
            if !self.satisfies_hard_constraints(action, vehicle, world) {
                continue;
            }
            let score = self.utility_score(action, vehicle, world);
            // first maximum wins on ties
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((action, score)),
            }
        }

        match best {
            Some((action, _)) => action,
            None => {
                debug!(
                    role = %vehicle.role,
                    distance = vehicle.distance,
                    "no action satisfies the hard constraints, braking in lane"
                );
                Decision::new(current_lane, SpeedAction::Brake)
            }
        }
    }

    pub fn satisfies_hard_constraints(
        &self,
        action: Decision,
        vehicle: &Vehicle,
        world: &WorldSnapshot,
    ) -> bool {
        let track = world.track;
        let lane_x = track.lane_center_x(action.lane);

        // occupied target lane
        if !world.ghost_mode {
            let blocked = world.cars_in_lane(action.lane).any(|car| {
                (car.distance - vehicle.distance).abs() < self.pars.safety_box_distance
                    && (car.x - lane_x).abs() < self.pars.safety_box_lateral
            });
            if blocked {
                return false;
            }
        }

        // road bounds
        let (x_min, x_max) = track.lateral_bounds();
        if lane_x < x_min || lane_x > x_max {
            return false;
        }

        // no two-lane jump at speed
        let current_lane = vehicle.lane(track);
        let lane_jump = (action.lane as i64 - current_lane as i64).abs();
        if lane_jump > 1 && vehicle.speed > self.pars.double_jump_speed {
            return false;
        }

        true
    }

    pub fn utility_score(&self, action: Decision, vehicle: &Vehicle, world: &WorldSnapshot) -> f64 {
        let role_score = match vehicle.role {
            Role::Police => self.score_police_pursuit(action, vehicle, world),
            Role::Thief => self.score_thief_escape(action, vehicle, world),
        };

        role_score
            + self.score_powerup_collection(action, vehicle, world)
            + self.score_traffic_clearance(action, vehicle, world)
            + score_speed(action, vehicle)
            + score_lane_preference(action, vehicle.lane(world.track))
    }

    fn score_police_pursuit(
        &self,
        action: Decision,
        vehicle: &Vehicle,
        world: &WorldSnapshot,
    ) -> f64 {
        let opponent = match world.opponent {
            Some(opponent) => opponent,
            None => return 0.0,
        };
        let mut score = 0.0;

        if action.lane == opponent.lane {
            score += 50.0;
        } else {
            score -= (action.lane as i64 - opponent.lane as i64).abs() as f64 * 15.0;
        }

        let gap = (opponent.distance - vehicle.distance).abs();
        match action.speed_action {
            SpeedAction::Accelerate if gap > 100.0 => score += 30.0,
            SpeedAction::Maintain if gap < 100.0 => score += 20.0,
            _ => {}
        }

        // intercept: sitting in the thief's lane behind it blocks the escape route
        if opponent.distance > vehicle.distance && action.lane == opponent.lane {
            score += 40.0;
        }

        score
    }

    fn score_thief_escape(
        &self,
        action: Decision,
        vehicle: &Vehicle,
        world: &WorldSnapshot,
    ) -> f64 {
        let opponent = match world.opponent {
            Some(opponent) => opponent,
            None => return 0.0,
        };
        let mut score = 0.0;

        if action.lane != opponent.lane {
            score += 35.0;
        } else {
            score -= 25.0;
        }

        let gap = (opponent.distance - vehicle.distance).abs();
        if gap > 200.0 && action.speed_action == SpeedAction::Accelerate {
            score += 25.0;
        } else if gap < 150.0 && action.lane != opponent.lane {
            score += 40.0;
        }

        if vehicle.distance > opponent.distance {
            score += 20.0;
        }

        score
    }

    fn score_powerup_collection(
        &self,
        action: Decision,
        vehicle: &Vehicle,
        world: &WorldSnapshot,
    ) -> f64 {
        world
            .powerups_for(vehicle.role)
            .filter(|powerup| powerup.lane == action.lane)
            .filter_map(|powerup| {
                let ahead = powerup.distance - vehicle.distance;
                if ahead > 0.0 && ahead < self.pars.powerup_window {
                    Some((50.0 - ahead / 10.0).max(0.0) + powerup.priority)
                } else {
                    None
                }
            })
            .sum()
    }

    fn score_traffic_clearance(
        &self,
        action: Decision,
        vehicle: &Vehicle,
        world: &WorldSnapshot,
    ) -> f64 {
        let window = self.pars.clearance_window;
        let clearance = world
            .gap_ahead(action.lane, vehicle.distance, window, 0.0)
            .min(1000.0);
        let no_cars_ahead = world.cars_ahead(action.lane, vehicle.distance, window);

        let clearance_score = if clearance > 300.0 {
            30.0
        } else if clearance > 200.0 {
            20.0
        } else if clearance > 100.0 {
            10.0
        } else {
            -20.0
        };

        clearance_score - no_cars_ahead as f64 * 8.0
    }
}

fn score_speed(action: Decision, vehicle: &Vehicle) -> f64 {
    let max_speed = vehicle.speed_limit();
    match action.speed_action {
        SpeedAction::Accelerate if vehicle.speed < max_speed * 0.9 => 15.0,
        SpeedAction::Maintain if vehicle.speed > max_speed * 0.7 => 10.0,
        SpeedAction::Brake => -5.0,
        _ => 0.0,
    }
}

fn score_lane_preference(action: Decision, current_lane: usize) -> f64 {
    let mut score = 0.0;
    if action.lane == crate::core::track::CENTER_LANE {
        score += 5.0;
    }
    if action.lane != current_lane {
        score -= 3.0;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::powerup::{PowerUp, PowerUpKind};
    use crate::core::track::Track;
    use crate::core::traffic::TrafficCar;
    use crate::core::vehicle::VehiclePars;
    use crate::core::world::OpponentView;
    use approx::assert_relative_eq;

    fn vehicle(
        pars: &VehiclePars,
        track: &Track,
        lane: usize,
        distance: f64,
        speed: f64,
    ) -> Vehicle {
        let mut vehicle = Vehicle::new(pars, track);
        vehicle.x = track.lane_center_x(lane);
        vehicle.distance = distance;
        vehicle.speed = speed;
        vehicle
    }

    #[test]
    fn domain_has_nine_actions() {
        let domain = CspDecisionMaker::domain();
        assert_eq!(domain.len(), 9);
        assert_eq!(domain[0], Decision::new(0, SpeedAction::Accelerate));
        assert_eq!(domain[8], Decision::new(2, SpeedAction::Brake));
    }

    #[test]
    fn occupied_lane_is_rejected_unless_ghost() {
        let track = Track::default();
        let thief = vehicle(&VehiclePars::default_thief(), &track, 1, 1000.0, 5.0);
        let traffic = vec![TrafficCar::new(0, 1080.0, 2.0, &track)];
        let csp = CspDecisionMaker::default();

        let world = WorldSnapshot::new(&track, &traffic, &[], None, false);
        assert!(!csp.satisfies_hard_constraints(
            Decision::new(0, SpeedAction::Maintain),
            &thief,
            &world
        ));
        assert!(csp.satisfies_hard_constraints(
            Decision::new(1, SpeedAction::Maintain),
            &thief,
            &world
        ));

        let ghost_world = WorldSnapshot::new(&track, &traffic, &[], None, true);
        assert!(csp.satisfies_hard_constraints(
            Decision::new(0, SpeedAction::Maintain),
            &thief,
            &ghost_world
        ));
    }

    #[test]
    fn double_lane_jump_is_speed_limited() {
        let track = Track::default();
        let csp = CspDecisionMaker::default();
        let world = WorldSnapshot::new(&track, &[], &[], None, false);
        let jump = Decision::new(2, SpeedAction::Maintain);

        let fast = vehicle(&VehiclePars::default_thief(), &track, 0, 0.0, 7.0);
        assert!(!csp.satisfies_hard_constraints(jump, &fast, &world));

        let slow = vehicle(&VehiclePars::default_thief(), &track, 0, 0.0, 5.0);
        assert!(csp.satisfies_hard_constraints(jump, &slow, &world));
    }

    #[test]
    fn all_lanes_blocked_falls_back_to_brake() {
        let track = Track::default();
        let thief = vehicle(&VehiclePars::default_thief(), &track, 2, 2000.0, 8.0);
        let traffic: Vec<TrafficCar> = (0..NO_LANES)
            .map(|lane| TrafficCar::new(lane, 2050.0, 3.0, &track))
            .collect();
        let world = WorldSnapshot::new(&track, &traffic, &[], None, false);

        let decision = CspDecisionMaker::default().solve_lane_decision(&thief, &world);
        assert_eq!(decision, Decision::new(2, SpeedAction::Brake));
    }

    #[test]
    fn police_follows_thief_lane() {
        let track = Track::default();
        let police = vehicle(&VehiclePars::default_police(), &track, 1, 0.0, 5.0);
        let thief = vehicle(&VehiclePars::default_thief(), &track, 0, 600.0, 6.0);
        let opponent = OpponentView::from_vehicle(&thief, &track);
        let world = WorldSnapshot::new(&track, &[], &[], Some(opponent), false);

        let decision = CspDecisionMaker::default().solve_lane_decision(&police, &world);
        assert_eq!(decision, Decision::new(0, SpeedAction::Accelerate));
    }

    #[test]
    fn thief_avoids_police_lane() {
        let track = Track::default();
        let thief = vehicle(&VehiclePars::default_thief(), &track, 1, 1000.0, 6.0);
        let police = vehicle(&VehiclePars::default_police(), &track, 1, 900.0, 7.0);
        let opponent = OpponentView::from_vehicle(&police, &track);
        let world = WorldSnapshot::new(&track, &[], &[], Some(opponent), false);

        let decision = CspDecisionMaker::default().solve_lane_decision(&thief, &world);
        assert_ne!(decision.lane, 1);
    }

    #[test]
    fn own_powerups_attract() {
        let track = Track::default();
        let thief = vehicle(&VehiclePars::default_thief(), &track, 1, 1000.0, 4.0);
        let powerups = vec![
            PowerUp::new(2, 1200.0, PowerUpKind::Freeze),
            PowerUp::new(0, 1100.0, PowerUpKind::Emp),
        ];
        let world = WorldSnapshot::new(&track, &[], &powerups, None, false);
        let csp = CspDecisionMaker::default();

        let score = |lane: usize| {
            csp.utility_score(Decision::new(lane, SpeedAction::Accelerate), &thief, &world)
        };
        let freeze_lane = score(2);
        let emp_lane = score(0);
        // proximity 30 plus priority 15
        assert_relative_eq!(freeze_lane - emp_lane, 45.0);
        assert_eq!(
            csp.solve_lane_decision(&thief, &world),
            Decision::new(2, SpeedAction::Accelerate)
        );
    }

    #[test]
    fn clearance_penalizes_crowded_lane() {
        let track = Track::default();
        let thief = vehicle(&VehiclePars::default_thief(), &track, 1, 0.0, 4.0);
        let traffic = vec![
            TrafficCar::new(0, 150.0, 2.0, &track),
            TrafficCar::new(0, 350.0, 2.0, &track),
        ];
        let world = WorldSnapshot::new(&track, &traffic, &[], None, false);
        let csp = CspDecisionMaker::default();

        let clearance = |lane: usize| {
            csp.score_traffic_clearance(Decision::new(lane, SpeedAction::Maintain), &thief, &world)
        };
        let crowded = clearance(0);
        let clear = clearance(2);
        assert_relative_eq!(crowded, 10.0 - 16.0);
        assert_relative_eq!(clear, 30.0);
    }
}
