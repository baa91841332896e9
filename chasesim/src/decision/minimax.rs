use crate::core::powerup::PowerUpKind;
use crate::core::track::Track;
use crate::core::vehicle::{Role, Vehicle};
use crate::core::world::{is_capture, WorldSnapshot};
use crate::decision::{SpeedAction, SPEED_ACTIONS};
use serde::Deserialize;
use std::time::{Duration, Instant};

/// * `depth` - Number of plies searched (police and thief alternate, police moves first)
/// * `time_budget_us` - (us) Wall-clock budget per search, afterwards nodes are evaluated
/// statically. Only checked if no node budget is set
/// * `node_budget` - Number of nodes visited per search before nodes are evaluated statically
/// (OPTIONAL: keeps seeded chases reproducible, unset to bound by wall-clock time instead)
/// * `ply_ticks` - Ticks abstracted into one ply when advancing distance
/// * `accelerate_delta` / `brake_delta` - (units/tick) Speed change per ply
/// * `traffic_window` - (units) Traffic and power-ups outside [-window/4, window] around the
/// vehicles are dropped from the abstract state
#[derive(Debug, Deserialize, Clone)]
pub struct MinimaxPars {
    pub depth: u32,
    pub time_budget_us: u64,
    #[serde(default = "default_node_budget")]
    pub node_budget: Option<u64>,
    pub ply_ticks: f64,
    pub accelerate_delta: f64,
    pub brake_delta: f64,
    pub traffic_window: f64,
}

impl Default for MinimaxPars {
    fn default() -> Self {
        MinimaxPars {
            depth: 3,
            time_budget_us: 8000,
            node_budget: default_node_budget(),
            ply_ticks: 10.0,
            accelerate_delta: 0.5,
            brake_delta: 0.8,
            traffic_window: 1500.0,
        }
    }
}

fn default_node_budget() -> Option<u64> {
    Some(5000)
}

pub const CAPTURE_REWARD: f64 = 1.0e9;
pub const ESCAPE_REWARD: f64 = -1.0e9;

const ENDGAME_DISTANCE: f64 = 3000.0;
const TRAFFIC_RISK_DISTANCE: f64 = 150.0;
const POWERUP_REACH: f64 = 600.0;
const POWERUP_PICKUP_RADIUS: f64 = 47.0;

/// Abstract per-vehicle state of the adversarial search.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentState {
    pub lane: usize,
    pub distance: f64,
    pub speed: f64,
    pub max_speed: f64,
    /// Summed priority of power-ups picked up inside the search tree.
    pub collected_value: f64,
}

impl AgentState {
    fn from_vehicle(vehicle: &Vehicle, track: &Track) -> AgentState {
        AgentState {
            lane: vehicle.lane(track),
            distance: vehicle.distance,
            speed: vehicle.speed,
            max_speed: vehicle.speed_limit(),
            collected_value: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerUpEntry {
    pub lane: usize,
    pub distance: f64,
    pub kind: PowerUpKind,
    pub for_police: bool,
}

/// GameState is a value-type snapshot of the chase. Every node of the search tree owns its own
/// copy.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub police: AgentState,
    pub thief: AgentState,
    /// (lane, distance) of nearby traffic cars
    pub traffic: Vec<(usize, f64)>,
    pub powerups: Vec<PowerUpEntry>,
    pub finish_distance: f64,
}

impl GameState {
    /// The method builds the abstract state from the perspective of `vehicle`. Returns None if
    /// there is no opponent to play against.
    pub fn from_world(vehicle: &Vehicle, world: &WorldSnapshot, window: f64) -> Option<GameState> {
        let opponent = world.opponent?;
        let track = world.track;

        let own = AgentState::from_vehicle(vehicle, track);
        let other = AgentState {
            lane: opponent.lane,
            distance: opponent.distance,
            speed: opponent.speed,
            max_speed: opponent.speed_limit,
            collected_value: 0.0,
        };
        let (police, thief) = match vehicle.role {
            Role::Police => (own, other),
            Role::Thief => (other, own),
        };

        let lo = police.distance.min(thief.distance) - window / 4.0;
        let hi = police.distance.max(thief.distance) + window;
        let in_range = |distance: f64| distance > lo && distance < hi;

        let traffic = world
            .traffic
            .iter()
            .filter(|car| in_range(car.distance))
            .map(|car| (car.lane, car.distance))
            .collect();
        let powerups = world
            .powerups
            .iter()
            .filter(|powerup| !powerup.is_collected() && in_range(powerup.distance))
            .map(|powerup| PowerUpEntry {
                lane: powerup.lane,
                distance: powerup.distance,
                kind: powerup.kind,
                for_police: powerup.for_police(),
            })
            .collect();

        Some(GameState {
            police,
            thief,
            traffic,
            powerups,
            finish_distance: track.finish_distance,
        })
    }

    pub fn agent(&self, role: Role) -> &AgentState {
        match role {
            Role::Police => &self.police,
            Role::Thief => &self.thief,
        }
    }

    fn agent_mut(&mut self, role: Role) -> &mut AgentState {
        match role {
            Role::Police => &mut self.police,
            Role::Thief => &mut self.thief,
        }
    }

    pub fn is_capture(&self) -> bool {
        is_capture(self.police.distance, self.thief.distance)
    }

    pub fn thief_escaped(&self) -> bool {
        self.thief.distance >= self.finish_distance
    }

    pub fn is_terminal(&self) -> bool {
        self.is_capture() || self.thief_escaped()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimaxAction {
    pub lane: usize,
    pub speed_action: SpeedAction,
    pub seek_powerup: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct MinimaxDecision {
    pub lane: usize,
    pub speed_action: SpeedAction,
    pub score: f64,
}

/// MinimaxSearch plays the chase as a two-player zero-sum game in which the police maximizes
/// and the thief minimizes a shared evaluation.
#[derive(Debug, Clone, Default)]
pub struct MinimaxSearch {
    pub pars: MinimaxPars,
    /// Nodes visited during the last search.
    pub nodes_searched: u64,
    /// Set if the last search ran out of time.
    pub budget_exceeded: bool,
}

impl MinimaxSearch {
    pub fn new(pars: MinimaxPars) -> MinimaxSearch {
        MinimaxSearch {
            pars,
            nodes_searched: 0,
            budget_exceeded: false,
        }
    }

    /// The method returns the best immediate action for `vehicle`, or None if no opponent is
    /// present.
    pub fn best_action(
        &mut self,
        vehicle: &Vehicle,
        world: &WorldSnapshot,
    ) -> Option<MinimaxDecision> {
        let state = GameState::from_world(vehicle, world, self.pars.traffic_window)?;
        let deadline = Instant::now() + Duration::from_micros(self.pars.time_budget_us);
        Some(self.search_root(&state, vehicle.role, deadline))
    }

    /// The method searches the tree rooted at `state` with `role` moving first.
    pub fn search_root(
        &mut self,
        state: &GameState,
        role: Role,
        deadline: Instant,
    ) -> MinimaxDecision {
        self.nodes_searched = 0;
        self.budget_exceeded = false;

        let maximizing = role == Role::Police;
        let depth = self.pars.depth.max(1);
        let mut alpha = f64::NEG_INFINITY;
        let mut beta = f64::INFINITY;

        let mut best: Option<(MinimaxAction, f64)> = None;
        for action in generate_actions(state, role) {
            let child = self.simulate(state, role, action);
            let value = self.alpha_beta(&child, depth - 1, alpha, beta, !maximizing, deadline);

            let improves = match best {
                None => true,
                Some((_, best_value)) => {
                    if maximizing {
                        value > best_value
                    } else {
                        value < best_value
                    }
                }
            };
            if improves {
                best = Some((action, value));
            }

            if maximizing {
                alpha = alpha.max(value);
            } else {
                beta = beta.min(value);
            }
        }

        match best {
            Some((action, score)) => MinimaxDecision {
                lane: action.lane,
                speed_action: action.speed_action,
                score,
            },
            None => MinimaxDecision {
                lane: state.agent(role).lane,
                speed_action: SpeedAction::Maintain,
                score: self.evaluate(state),
            },
        }
    }

    fn alpha_beta(
        &mut self,
        state: &GameState,
        depth: u32,
        mut alpha: f64,
        mut beta: f64,
        maximizing: bool,
        deadline: Instant,
    ) -> f64 {
        self.nodes_searched += 1;

        if depth == 0 || state.is_terminal() {
            return self.evaluate(state);
        }
        if self.out_of_budget(deadline) {
            self.budget_exceeded = true;
            return self.evaluate(state);
        }

        let role = if maximizing { Role::Police } else { Role::Thief };

        if maximizing {
            let mut value = f64::NEG_INFINITY;
            for action in generate_actions(state, role) {
                let child = self.simulate(state, role, action);
                value = value.max(self.alpha_beta(&child, depth - 1, alpha, beta, false, deadline));
                alpha = alpha.max(value);
                if beta <= alpha {
                    break;
                }
            }
            value
        } else {
            let mut value = f64::INFINITY;
            for action in generate_actions(state, role) {
                let child = self.simulate(state, role, action);
                value = value.min(self.alpha_beta(&child, depth - 1, alpha, beta, true, deadline));
                beta = beta.min(value);
                if beta <= alpha {
                    break;
                }
            }
            value
        }
    }

    fn out_of_budget(&self, deadline: Instant) -> bool {
        match self.pars.node_budget {
            Some(node_budget) => self.nodes_searched > node_budget,
            None => Instant::now() >= deadline,
        }
    }

    /// The method applies one ply for `role`. It is a coarse planning step: the lane is taken
    /// directly and the distance advances by `speed * ply_ticks`.
    pub fn simulate(&self, state: &GameState, role: Role, action: MinimaxAction) -> GameState {
        let mut next = state.clone();
        let pars = &self.pars;

        let agent = next.agent_mut(role);
        let start_distance = agent.distance;
        agent.lane = action.lane;
        agent.speed = match action.speed_action {
            SpeedAction::Accelerate => agent.speed + pars.accelerate_delta,
            SpeedAction::Maintain => agent.speed,
            SpeedAction::Brake => agent.speed - pars.brake_delta,
        };
        agent.speed = agent.speed.max(0.0).min(agent.max_speed);
        agent.distance += agent.speed * pars.ply_ticks;

        let lane = agent.lane;
        let end_distance = agent.distance;
        let for_police = role == Role::Police;

        let mut picked = 0.0;
        next.powerups.retain(|powerup| {
            let passed = powerup.lane == lane
                && powerup.for_police == for_police
                && powerup.distance >= start_distance - POWERUP_PICKUP_RADIUS
                && powerup.distance <= end_distance + POWERUP_PICKUP_RADIUS;
            if passed {
                picked += powerup.kind.priority();
            }
            !passed
        });
        next.agent_mut(role).collected_value += picked;

        next
    }

    /// Static evaluation with police-favorable sign convention.
    pub fn evaluate(&self, state: &GameState) -> f64 {
        if state.is_capture() {
            return CAPTURE_REWARD;
        }
        if state.thief_escaped() {
            return ESCAPE_REWARD;
        }

        let police = &state.police;
        let thief = &state.thief;
        let mut score = 0.0;

        // gap bands
        let gap = thief.distance - police.distance;
        score += if gap < 100.0 {
            500.0
        } else if gap < 300.0 {
            250.0
        } else if gap < 600.0 {
            100.0
        } else if gap > 1000.0 {
            -200.0
        } else {
            0.0
        };
        score -= gap * 0.5;

        // lane alignment
        let lane_diff = (police.lane as i64 - thief.lane as i64).abs();
        if lane_diff == 0 {
            score += 60.0;
        } else {
            score -= 20.0 * lane_diff as f64;
        }

        score += (police.speed - thief.speed) * 25.0;

        // traffic risk, the police fears its own crashes and welcomes boxed-in thieves
        score -= 400.0 * traffic_risk(state, police);
        score += 150.0 * traffic_risk(state, thief);

        score += powerup_value(state, police, true) - powerup_value(state, thief, false);

        let remaining = state.finish_distance - thief.distance;
        if remaining < ENDGAME_DISTANCE {
            score -= (ENDGAME_DISTANCE - remaining) * 0.2;
        }

        score
    }
}

/// generate_actions lists stay/±1 lanes times the three speed actions, plus power-up pickup
/// attempts for reachable own-role power-ups in neighboring lanes.
pub fn generate_actions(state: &GameState, role: Role) -> Vec<MinimaxAction> {
    let agent = state.agent(role);
    let lane = agent.lane as i64;
    let mut actions = Vec::with_capacity(12);

    for candidate in (lane - 1)..=(lane + 1) {
        if !Track::is_valid_lane(candidate) {
            continue;
        }
        for &speed_action in SPEED_ACTIONS.iter() {
            actions.push(MinimaxAction {
                lane: candidate as usize,
                speed_action,
                seek_powerup: false,
            });
        }
    }

    let for_police = role == Role::Police;
    let reach = agent.max_speed * 10.0 + POWERUP_PICKUP_RADIUS;
    for powerup in state.powerups.iter() {
        let ahead = powerup.distance - agent.distance;
        if powerup.for_police == for_police
            && ahead > 0.0
            && ahead < reach
            && (powerup.lane as i64 - lane).abs() <= 1
        {
            let action = MinimaxAction {
                lane: powerup.lane,
                speed_action: SpeedAction::Accelerate,
                seek_powerup: true,
            };
            if !actions.contains(&action) {
                actions.push(action);
            }
        }
    }

    actions
}

/// traffic_risk returns a value in [0, 1] that grows as the nearest car ahead in the agent's lane
/// gets closer than the risk distance.
fn traffic_risk(state: &GameState, agent: &AgentState) -> f64 {
    state
        .traffic
        .iter()
        .filter(|(lane, _)| *lane == agent.lane)
        .map(|(_, distance)| distance - agent.distance)
        .filter(|gap| *gap >= 0.0 && *gap < TRAFFIC_RISK_DISTANCE)
        .map(|gap| 1.0 - gap / TRAFFIC_RISK_DISTANCE)
        .fold(0.0, f64::max)
}

/// powerup_value weighs power-ups already collected inside the tree and those still reachable
/// ahead in the agent's lane.
fn powerup_value(state: &GameState, agent: &AgentState, for_police: bool) -> f64 {
    let reachable: f64 = state
        .powerups
        .iter()
        .filter(|p| p.for_police == for_police && p.lane == agent.lane)
        .map(|p| (p.kind.priority(), p.distance - agent.distance))
        .filter(|(_, ahead)| *ahead > 0.0 && *ahead < POWERUP_REACH)
        .map(|(priority, ahead)| priority * (1.0 - ahead / POWERUP_REACH))
        .sum();

    agent.collected_value * 10.0 + reachable * 2.0
}
