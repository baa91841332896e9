use crate::core::track::{Track, NO_LANES};
use crate::core::vehicle::{Role, Vehicle};
use crate::core::world::WorldSnapshot;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use tracing::debug;

/// * `max_iterations` - Upper bound on node expansions per query
/// * `goal_tolerance` - (units) Longitudinal tolerance for reaching the goal cell
/// * `min_step` - (units) Smallest forward step of the adaptive grid
/// * `goal_ahead` - (units) Default goal distance ahead of the vehicle
/// * `powerup_search` - (units) Thief goals consider power-ups this far ahead
/// * `police_lookahead` - (ticks) The police aims at the thief's position this far in the future
/// * `slow_gap` - (units) A car this close ahead in the target lane halves the target speed
#[derive(Debug, Deserialize, Clone)]
pub struct AStarPars {
    pub max_iterations: usize,
    pub goal_tolerance: f64,
    pub min_step: f64,
    pub goal_ahead: f64,
    pub powerup_search: f64,
    pub police_lookahead: f64,
    pub slow_gap: f64,
}

impl Default for AStarPars {
    fn default() -> Self {
        AStarPars {
            max_iterations: 2000,
            goal_tolerance: 50.0,
            min_step: 25.0,
            goal_ahead: 600.0,
            powerup_search: 800.0,
            police_lookahead: 30.0,
            slow_gap: 150.0,
        }
    }
}

// safety envelopes
const SAME_LANE_MARGIN: f64 = 80.0;
const SAME_LANE_MARGIN_PER_SPEED: f64 = 10.0;
const ADJACENT_LANE_MARGIN: f64 = 40.0;
const OPPONENT_MARGIN: f64 = 40.0;

// edge cost terms
const LANE_CHANGE_COST: f64 = 30.0;
const LANE_CHANGE_COST_PER_SPEED: f64 = 10.0;
const JAM_COST: f64 = 300.0;
const CLEAR_ZONE: f64 = 600.0;
const CLEAR_ZONE_DISCOUNT: f64 = 0.2;
const POLICE_OVERTAKE_COST: f64 = 400.0;
const THIEF_LEAD_BONUS: f64 = 20.0;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Heuristic {
    Manhattan,
    Euclidean,
}

impl Heuristic {
    /// Manhattan suits the lane-discrete movement of the thief, Euclidean the direct pursuit of
    /// the police.
    pub fn for_role(role: Role) -> Heuristic {
        match role {
            Role::Thief => Heuristic::Manhattan,
            Role::Police => Heuristic::Euclidean,
        }
    }

    pub fn estimate(self, from: Waypoint, to: Waypoint, lane_width: f64) -> f64 {
        let d_lat = (from.lane as f64 - to.lane as f64).abs() * lane_width;
        let d_lon = (to.distance - from.distance).abs();
        match self {
            Heuristic::Manhattan => d_lat + d_lon,
            Heuristic::Euclidean => (d_lat * d_lat + d_lon * d_lon).sqrt(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub lane: usize,
    pub distance: f64,
}

impl Waypoint {
    pub fn new(lane: usize, distance: f64) -> Waypoint {
        Waypoint { lane, distance }
    }
}

/// Inputs of a single path query.
#[derive(Debug, Clone, Copy)]
pub struct PathQuery {
    pub start: Waypoint,
    pub goal: Waypoint,
    pub speed: f64,
    pub role: Role,
    pub heuristic: Heuristic,
}

#[derive(Debug, Clone)]
struct AStarNode {
    cell: Waypoint,
    g_cost: f64,
    h_cost: f64,
    parent: Option<usize>,
}

impl AStarNode {
    fn f_cost(&self) -> f64 {
        self.g_cost + self.h_cost
    }
}

/// Open set entry referencing a node in the arena.
#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    f_cost: f64,
    node: usize,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed for min-heap behavior, later nodes first on ties
        other
            .f_cost
            .partial_cmp(&self.f_cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Lane and speed target derived from a planned path.
#[derive(Debug, Clone)]
pub struct AStarDecision {
    pub target_lane: usize,
    pub target_speed: f64,
    pub path: Vec<Waypoint>,
}

#[derive(Debug, Clone, Default)]
pub struct AStarPlanner {
    pub pars: AStarPars,
    /// Nodes expanded during the last query.
    pub nodes_expanded: usize,
    /// Set if the last query ended with the direct fallback path.
    pub used_fallback: bool,
}

impl AStarPlanner {
    pub fn new(pars: AStarPars) -> AStarPlanner {
        AStarPlanner {
            pars,
            nodes_expanded: 0,
            used_fallback: false,
        }
    }

    /// Forward step of the adaptive grid, coarse far from the goal and fine near it.
    pub fn step_size(&self, remaining: f64) -> f64 {
        let step: f64 = if remaining > 1000.0 {
            200.0
        } else if remaining > 400.0 {
            100.0
        } else {
            50.0
        };
        step.min(remaining).max(self.pars.min_step)
    }

    /// The method searches a path from the query's start to its goal. It never fails: if the open
    /// set runs empty or the iteration bound is hit, the direct path [start, goal] is returned.
    pub fn find_path(&mut self, query: &PathQuery, world: &WorldSnapshot) -> Vec<Waypoint> {
        self.nodes_expanded = 0;
        self.used_fallback = false;

        let track = world.track;
        let goal = query.goal;
        let tolerance = self.pars.goal_tolerance;

        let mut nodes = vec![AStarNode {
            cell: query.start,
            g_cost: 0.0,
            h_cost: query.heuristic.estimate(query.start, goal, track.lane_width),
            parent: None,
        }];
        let mut open_set = BinaryHeap::new();
        let mut closed_set: HashSet<(usize, i64)> = HashSet::new();
        open_set.push(OpenEntry {
            f_cost: nodes[0].f_cost(),
            node: 0,
        });

        while let Some(OpenEntry { node: current, .. }) = open_set.pop() {
            if self.nodes_expanded >= self.pars.max_iterations {
                break;
            }
            let cell = nodes[current].cell;

            if cell.lane == goal.lane && (cell.distance - goal.distance).abs() <= tolerance {
                return reconstruct_path(&nodes, current);
            }

            if !closed_set.insert(cell_key(cell)) {
                continue;
            }
            self.nodes_expanded += 1;

            let step = self.step_size(goal.distance - cell.distance);
            let next_distance = cell.distance + step;
            if next_distance > goal.distance + tolerance {
                continue;
            }

            let lane = cell.lane as i64;
            for next_lane in (lane - 1)..=(lane + 1) {
                if !Track::is_valid_lane(next_lane) {
                    continue;
                }
                let next = Waypoint::new(next_lane as usize, next_distance);
                if closed_set.contains(&cell_key(next)) {
                    continue;
                }
                let is_goal = next.lane == goal.lane
                    && (next.distance - goal.distance).abs() <= tolerance;
                if !world.ghost_mode && !self.is_cell_safe(next, query, world, is_goal) {
                    continue;
                }

                let g_cost = nodes[current].g_cost + self.edge_cost(cell, next, query, world);
                let h_cost = query.heuristic.estimate(next, goal, track.lane_width);
                nodes.push(AStarNode {
                    cell: next,
                    g_cost,
                    h_cost,
                    parent: Some(current),
                });
                open_set.push(OpenEntry {
                    f_cost: g_cost + h_cost,
                    node: nodes.len() - 1,
                });
            }
        }

        self.used_fallback = true;
        debug!(
            nodes_expanded = self.nodes_expanded,
            goal_lane = goal.lane,
            goal_distance = goal.distance,
            "no path found, using direct fallback"
        );
        vec![query.start, goal]
    }

    /// Ticks until the vehicle reaches `distance` at its current speed.
    fn arrival_ticks(query: &PathQuery, distance: f64) -> f64 {
        (distance - query.start.distance).max(0.0) / query.speed.max(1.0)
    }

    fn is_cell_safe(
        &self,
        cell: Waypoint,
        query: &PathQuery,
        world: &WorldSnapshot,
        is_goal: bool,
    ) -> bool {
        let ticks = AStarPlanner::arrival_ticks(query, cell.distance);
        let same_lane_margin = SAME_LANE_MARGIN + SAME_LANE_MARGIN_PER_SPEED * query.speed;

        for car in world.traffic.iter() {
            let gap = (car.distance_after(ticks) - cell.distance).abs();
            let lane_diff = (car.lane as i64 - cell.lane as i64).abs();
            if (lane_diff == 0 && gap < same_lane_margin)
                || (lane_diff == 1 && gap < ADJACENT_LANE_MARGIN)
            {
                return false;
            }
        }

        if query.role == Role::Thief && !is_goal {
            if let Some(opponent) = world.opponent {
                let predicted = opponent.distance + opponent.speed * ticks;
                if opponent.lane == cell.lane
                    && (predicted - cell.distance).abs() < OPPONENT_MARGIN
                {
                    return false;
                }
            }
        }

        true
    }

    fn edge_cost(
        &self,
        from: Waypoint,
        to: Waypoint,
        query: &PathQuery,
        world: &WorldSnapshot,
    ) -> f64 {
        let step = to.distance - from.distance;
        let mut cost = step;

        if to.lane != from.lane {
            cost += LANE_CHANGE_COST + LANE_CHANGE_COST_PER_SPEED * query.speed;
        }

        // traffic ahead of the destination cell at arrival time
        let ticks = AStarPlanner::arrival_ticks(query, to.distance);
        let gaps: Vec<f64> = world
            .cars_in_lane(to.lane)
            .map(|car| car.distance_after(ticks) - to.distance)
            .filter(|gap| *gap >= 0.0)
            .collect();
        let nearest = gaps.iter().cloned().fold(f64::INFINITY, f64::min);

        cost += if nearest < 100.0 {
            500.0
        } else if nearest < 200.0 {
            200.0
        } else if nearest < 400.0 {
            60.0
        } else {
            0.0
        };
        if gaps.iter().filter(|gap| **gap < 400.0).count() >= 2 {
            cost += JAM_COST;
        }
        if nearest >= CLEAR_ZONE {
            cost -= CLEAR_ZONE_DISCOUNT * step;
        }

        if let Some(opponent) = world.opponent {
            let predicted = opponent.distance + opponent.speed * ticks;
            match query.role {
                Role::Police if to.distance > predicted => cost += POLICE_OVERTAKE_COST,
                Role::Thief if to.distance > predicted => cost -= THIEF_LEAD_BONUS,
                _ => {}
            }
        }

        cost.max(1.0)
    }

    /// The method picks the goal waypoint for the vehicle's role.
    pub fn select_goal(&self, vehicle: &Vehicle, world: &WorldSnapshot) -> Waypoint {
        let track = world.track;
        let lane = vehicle.lane(track);
        let cap = |distance: f64| distance.min(track.finish_distance);

        match vehicle.role {
            Role::Police => match world.opponent {
                Some(opponent) => Waypoint::new(
                    opponent.lane,
                    cap(opponent.distance + opponent.speed * self.pars.police_lookahead),
                ),
                None => Waypoint::new(lane, cap(vehicle.distance + self.pars.goal_ahead)),
            },
            Role::Thief => {
                let best_powerup = world
                    .powerups_for(Role::Thief)
                    .filter(|p| {
                        let ahead = p.distance - vehicle.distance;
                        ahead > 0.0 && ahead < self.pars.powerup_search
                    })
                    .map(|p| (p, p.priority / (1.0 + (p.distance - vehicle.distance) / 100.0)))
                    .fold(None, |best: Option<(Waypoint, f64)>, (p, score)| match best {
                        Some((_, best_score)) if best_score >= score => best,
                        _ => Some((Waypoint::new(p.lane, p.distance), score)),
                    });

                match best_powerup {
                    Some((goal, _)) => Waypoint::new(goal.lane, cap(goal.distance)),
                    None => {
                        let mut best_lane = lane;
                        let mut best_gap = world.gap_ahead(lane, vehicle.distance, 1500.0, 0.0);
                        for candidate in 0..NO_LANES {
                            let gap = world.gap_ahead(candidate, vehicle.distance, 1500.0, 0.0);
                            if gap > best_gap {
                                best_gap = gap;
                                best_lane = candidate;
                            }
                        }
                        Waypoint::new(best_lane, cap(vehicle.distance + self.pars.goal_ahead))
                    }
                }
            }
        }
    }

    /// The method plans a path for the vehicle and converts its next waypoints into a lane and
    /// speed target for the current tick.
    pub fn plan(&mut self, vehicle: &Vehicle, world: &WorldSnapshot) -> AStarDecision {
        let track = world.track;
        let current_lane = vehicle.lane(track);
        let query = PathQuery {
            start: Waypoint::new(current_lane, vehicle.distance),
            goal: self.select_goal(vehicle, world),
            speed: vehicle.speed,
            role: vehicle.role,
            heuristic: Heuristic::for_role(vehicle.role),
        };
        let path = self.find_path(&query, world);

        let next = path.get(1).copied().unwrap_or(query.start);
        let target_lane = if (next.lane as i64 - current_lane as i64).abs() > 1 {
            // the fallback path may jump lanes, move one lane at a time
            if next.lane > current_lane {
                current_lane + 1
            } else {
                current_lane - 1
            }
        } else {
            next.lane
        };

        let max_speed = vehicle.speed_limit();
        let mut target_speed = max_speed;
        if target_lane != current_lane && vehicle.speed > 6.0 {
            target_speed = 0.85 * max_speed;
        }
        if !world.ghost_mode
            && world.gap_ahead(target_lane, vehicle.distance, self.pars.slow_gap, 0.0)
                < self.pars.slow_gap
        {
            target_speed = 0.5 * max_speed;
        }

        AStarDecision {
            target_lane,
            target_speed,
            path,
        }
    }
}

fn cell_key(cell: Waypoint) -> (usize, i64) {
    (cell.lane, (cell.distance / 10.0).floor() as i64)
}

fn reconstruct_path(nodes: &[AStarNode], goal_node: usize) -> Vec<Waypoint> {
    let mut path = vec![nodes[goal_node].cell];
    let mut current = nodes[goal_node].parent;
    while let Some(index) = current {
        path.push(nodes[index].cell);
        current = nodes[index].parent;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::powerup::{PowerUp, PowerUpKind};
    use crate::core::traffic::TrafficCar;
    use crate::core::vehicle::VehiclePars;
    use crate::core::world::OpponentView;
    use approx::assert_relative_eq;

    fn query(start: Waypoint, goal: Waypoint, role: Role) -> PathQuery {
        PathQuery {
            start,
            goal,
            speed: 6.0,
            role,
            heuristic: Heuristic::for_role(role),
        }
    }

    #[test]
    fn heuristics_differ_by_metric() {
        let a = Waypoint::new(0, 0.0);
        let b = Waypoint::new(1, 300.0);
        assert_relative_eq!(Heuristic::Manhattan.estimate(a, b, 400.0), 700.0);
        assert_relative_eq!(Heuristic::Euclidean.estimate(a, b, 400.0), 500.0);
    }

    #[test]
    fn step_is_adaptive() {
        let planner = AStarPlanner::default();
        assert_relative_eq!(planner.step_size(5000.0), 200.0);
        assert_relative_eq!(planner.step_size(800.0), 100.0);
        assert_relative_eq!(planner.step_size(300.0), 50.0);
        assert_relative_eq!(planner.step_size(30.0), 30.0);
        assert_relative_eq!(planner.step_size(0.0), 25.0);
    }

    #[test]
    fn open_road_path_reaches_goal() {
        let track = Track::default();
        let world = WorldSnapshot::new(&track, &[], &[], None, false);
        let mut planner = AStarPlanner::default();

        for &(start_lane, goal_lane) in [(0, 2), (1, 1), (2, 0), (1, 0)].iter() {
            for &role in [Role::Thief, Role::Police].iter() {
                let q = query(
                    Waypoint::new(start_lane, 100.0),
                    Waypoint::new(goal_lane, 1350.0),
                    role,
                );
                let path = planner.find_path(&q, &world);

                let last = path[path.len() - 1];
                assert!(!planner.used_fallback);
                assert_eq!(path[0], q.start);
                assert_eq!(last.lane, goal_lane);
                assert!((last.distance - 1350.0).abs() <= planner.pars.goal_tolerance);
                for pair in path.windows(2) {
                    assert!(pair[1].distance > pair[0].distance);
                    assert!((pair[1].lane as i64 - pair[0].lane as i64).abs() <= 1);
                }
            }
        }
    }

    #[test]
    fn lane_change_at_goal_distance_is_reachable() {
        let track = Track::default();
        let world = WorldSnapshot::new(&track, &[], &[], None, false);
        let mut planner = AStarPlanner::default();

        let q = query(Waypoint::new(0, 500.0), Waypoint::new(1, 500.0), Role::Thief);
        let path = planner.find_path(&q, &world);

        assert_eq!(path.len(), 2);
        assert_eq!(path[1].lane, 1);
        assert_relative_eq!(path[1].distance, 525.0);
    }

    #[test]
    fn path_avoids_blocked_lane() {
        let track = Track::default();
        let traffic = vec![TrafficCar::new(1, 750.0, 0.0, &track)];
        let world = WorldSnapshot::new(&track, &traffic, &[], None, false);
        let mut planner = AStarPlanner::default();

        let q = query(Waypoint::new(1, 0.0), Waypoint::new(1, 1400.0), Role::Thief);
        let path = planner.find_path(&q, &world);

        assert!(!planner.used_fallback);
        assert!(path
            .iter()
            .filter(|w| w.lane == 1)
            .all(|w| (w.distance - 750.0).abs() >= 140.0));
        assert_eq!(path[path.len() - 1].lane, 1);
    }

    #[test]
    fn fully_blocked_road_returns_fallback() {
        let track = Track::default();
        let traffic: Vec<TrafficCar> = (0..NO_LANES)
            .map(|lane| TrafficCar::new(lane, 300.0, 0.0, &track))
            .collect();
        let world = WorldSnapshot::new(&track, &traffic, &[], None, false);
        let mut planner = AStarPlanner::default();

        let q = query(Waypoint::new(1, 0.0), Waypoint::new(1, 1000.0), Role::Police);
        let path = planner.find_path(&q, &world);

        assert!(planner.used_fallback);
        assert_eq!(path, vec![q.start, q.goal]);
    }

    #[test]
    fn thief_goal_prefers_powerups() {
        let track = Track::default();
        let thief = Vehicle::new(&VehiclePars::default_thief(), &track);
        let powerups = vec![
            PowerUp::new(2, 300.0, PowerUpKind::Shield),
            PowerUp::new(0, 200.0, PowerUpKind::Turbo),
        ];
        let world = WorldSnapshot::new(&track, &[], &powerups, None, false);

        let goal = AStarPlanner::default().select_goal(&thief, &world);
        assert_eq!(goal, Waypoint::new(2, 300.0));
    }

    #[test]
    fn police_goal_leads_the_thief() {
        let track = Track::default();
        let police = Vehicle::new(&VehiclePars::default_police(), &track);
        let mut thief = Vehicle::new(&VehiclePars::default_thief(), &track);
        thief.x = track.lane_center_x(2);
        thief.speed = 5.0;
        let world = WorldSnapshot::new(
            &track,
            &[],
            &[],
            Some(OpponentView::from_vehicle(&thief, &track)),
            false,
        );

        let goal = AStarPlanner::default().select_goal(&police, &world);
        assert_eq!(goal, Waypoint::new(2, 150.0));
    }

    #[test]
    fn plan_on_clear_road_targets_max_speed() {
        let track = Track::default();
        let thief = Vehicle::new(&VehiclePars::default_thief(), &track);
        let world = WorldSnapshot::new(&track, &[], &[], None, false);

        let decision = AStarPlanner::default().plan(&thief, &world);
        assert_eq!(decision.target_lane, 1);
        assert_relative_eq!(decision.target_speed, thief.speed_limit());
        assert!(decision.path.len() >= 2);
    }
}
