use crate::core::vehicle::{ControllerMode, Vehicle};
use crate::core::world::WorldSnapshot;
use crate::decision::astar::{AStarPars, AStarPlanner};
use crate::decision::csp::{CspDecisionMaker, CspPars};
use crate::decision::fuzzy::{speed_delta, FuzzyController, FuzzyPars};
use crate::decision::minimax::{MinimaxPars, MinimaxSearch};
use crate::decision::safety::{SafetyAnalysis, SafetyLayer, SafetyPars};
use crate::decision::{
    apply_decision, approach_speed, steering_rate, Controller, Decision, SpeedAction, Urgency,
    LANE_ARRIVAL_TOLERANCE,
};
use helpers::general::argmax;
use serde::Deserialize;
use tracing::trace;

/// * `nudge_rate` - (px/tick) Lateral bias toward the best power-up below high urgency
/// * `nudge_range` - (units) Power-ups further ahead than this do not attract the nudge
/// * `close_range` - (units) Opponent distance below which the fuzzy controller dominates
/// * `medium_range` - (units) Opponent distance below which minimax dominates, A* beyond
/// * `override_brake_factor` - Multiple of the brake rate applied by the critical override
#[derive(Debug, Deserialize, Clone)]
pub struct ArbiterPars {
    pub nudge_rate: f64,
    pub nudge_range: f64,
    pub close_range: f64,
    pub medium_range: f64,
    pub override_brake_factor: f64,
}

impl Default for ArbiterPars {
    fn default() -> Self {
        ArbiterPars {
            nudge_rate: 1.0,
            nudge_range: 600.0,
            close_range: 300.0,
            medium_range: 1000.0,
            override_brake_factor: 2.0,
        }
    }
}

/// Parameters of all decision algorithms, grouped as they appear in the parameter file.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DecisionPars {
    pub safety: SafetyPars,
    pub csp: CspPars,
    pub fuzzy: FuzzyPars,
    pub minimax: MinimaxPars,
    pub astar: AStarPars,
    pub arbiter: ArbiterPars,
}

/// Situational weights over the four arbitrated algorithms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlgorithmWeights {
    pub safety: f64,
    pub fuzzy: f64,
    pub minimax: f64,
    pub astar: f64,
}

impl AlgorithmWeights {
    pub fn new(safety: f64, fuzzy: f64, minimax: f64, astar: f64) -> AlgorithmWeights {
        AlgorithmWeights {
            safety,
            fuzzy,
            minimax,
            astar,
        }
        .normalized()
    }

    fn normalized(self) -> AlgorithmWeights {
        let total = self.safety + self.fuzzy + self.minimax + self.astar;
        if total <= 0.0 {
            return AlgorithmWeights {
                safety: 1.0,
                fuzzy: 0.0,
                minimax: 0.0,
                astar: 0.0,
            };
        }
        AlgorithmWeights {
            safety: self.safety / total,
            fuzzy: self.fuzzy / total,
            minimax: self.minimax / total,
            astar: self.astar / total,
        }
    }

    /// The method returns the highest-weighted controller. Ties resolve in the order safety,
    /// fuzzy, minimax, A*.
    pub fn primary(&self) -> Controller {
        let controllers = [
            Controller::Safety,
            Controller::Fuzzy,
            Controller::Minimax,
            Controller::AStar,
        ];
        controllers[argmax(&[self.safety, self.fuzzy, self.minimax, self.astar])]
    }
}

/// Outcome of one arbitrated tick.
#[derive(Debug, Clone)]
pub struct TickDecision {
    pub controller: Controller,
    pub analysis: Option<SafetyAnalysis>,
    pub weights: Option<AlgorithmWeights>,
    pub target_lane: usize,
}

impl TickDecision {
    pub fn urgency(&self) -> Urgency {
        self.analysis
            .as_ref()
            .map(|analysis| analysis.urgency())
            .unwrap_or(Urgency::None)
    }
}

/// DecisionArbiter owns one instance of every decision algorithm, constructed once at chase
/// setup, and dispatches to them every tick.
#[derive(Debug, Clone, Default)]
pub struct DecisionArbiter {
    pub safety: SafetyLayer,
    pub csp: CspDecisionMaker,
    pub fuzzy: FuzzyController,
    pub minimax: MinimaxSearch,
    pub astar: AStarPlanner,
    pub pars: ArbiterPars,
}

impl DecisionArbiter {
    pub fn new(
        safety: SafetyLayer,
        csp: CspDecisionMaker,
        fuzzy: FuzzyController,
        minimax: MinimaxSearch,
        astar: AStarPlanner,
        pars: ArbiterPars,
    ) -> DecisionArbiter {
        DecisionArbiter {
            safety,
            csp,
            fuzzy,
            minimax,
            astar,
            pars,
        }
    }

    pub fn from_pars(decision_pars: &DecisionPars) -> DecisionArbiter {
        DecisionArbiter::new(
            SafetyLayer::new(decision_pars.safety.to_owned()),
            CspDecisionMaker::new(decision_pars.csp.to_owned()),
            FuzzyController::new(decision_pars.fuzzy.to_owned()),
            MinimaxSearch::new(decision_pars.minimax.to_owned()),
            AStarPlanner::new(decision_pars.astar.to_owned()),
            decision_pars.arbiter.to_owned(),
        )
    }

    /// The method computes the situational weights from the danger level and the distance to the
    /// opponent.
    pub fn compute_weights(
        &self,
        urgency: Urgency,
        opponent_distance: Option<f64>,
    ) -> AlgorithmWeights {
        match urgency {
            Urgency::Critical | Urgency::High => AlgorithmWeights::new(0.55, 0.25, 0.1, 0.1),
            Urgency::Moderate => AlgorithmWeights::new(0.3, 0.4, 0.15, 0.15),
            Urgency::Low | Urgency::None => match opponent_distance {
                Some(d) if d < self.pars.close_range => {
                    AlgorithmWeights::new(0.1, 0.5, 0.25, 0.15)
                }
                Some(d) if d < self.pars.medium_range => {
                    AlgorithmWeights::new(0.1, 0.2, 0.5, 0.2)
                }
                _ => AlgorithmWeights::new(0.1, 0.2, 0.15, 0.55),
            },
        }
    }

    /// The method runs the full decision pipeline for one vehicle and one tick and mutates the
    /// vehicle's lateral position and speed. Both are clamped to their bounds before returning.
    pub fn decide(&mut self, vehicle: &mut Vehicle, world: &WorldSnapshot) -> TickDecision {
        let track = world.track;
        let current_lane = vehicle.lane(track);

        if vehicle.crashed {
            vehicle.clamp_state(track);
            return TickDecision {
                controller: Controller::Idle,
                analysis: None,
                weights: None,
                target_lane: current_lane,
            };
        }

        if vehicle.controller_mode == ControllerMode::Csp {
            let decision = self.csp.solve_lane_decision(vehicle, world);
            apply_decision(vehicle, decision, track);
            return TickDecision {
                controller: Controller::Csp,
                analysis: None,
                weights: None,
                target_lane: decision.lane,
            };
        }

        let analysis = self.safety.analyze(vehicle, world);

        if analysis.urgency() == Urgency::Critical {
            let target_lane = self.safety_override(vehicle, world, &analysis);
            trace!(
                role = %vehicle.role,
                distance = vehicle.distance,
                min_ttc = analysis.min_ttc,
                "critical safety override"
            );
            return TickDecision {
                controller: Controller::SafetyOverride,
                analysis: Some(analysis),
                weights: None,
                target_lane,
            };
        }

        if analysis.urgency() < Urgency::High {
            self.powerup_nudge(vehicle, world, &analysis);
        }

        let opponent_distance = world
            .opponent_gap(vehicle.distance)
            .map(|gap| gap.abs());
        let weights = self.compute_weights(analysis.urgency(), opponent_distance);
        let mut controller = weights.primary();

        let target_lane = match controller {
            Controller::Fuzzy => self.execute_fuzzy(vehicle, world, &analysis),
            Controller::Minimax => match self.execute_minimax(vehicle, world, &analysis) {
                Some(lane) => lane,
                None => {
                    controller = Controller::Safety;
                    self.execute_safety(vehicle, world, &analysis)
                }
            },
            Controller::AStar => self.execute_astar(vehicle, world, &analysis),
            _ => self.execute_safety(vehicle, world, &analysis),
        };

        vehicle.clamp_state(track);

        TickDecision {
            controller,
            analysis: Some(analysis),
            weights: Some(weights),
            target_lane,
        }
    }

    /// Maximum braking and a lane change toward the nearest safe lane at maximum steering rate.
    fn safety_override(
        &self,
        vehicle: &mut Vehicle,
        world: &WorldSnapshot,
        analysis: &SafetyAnalysis,
    ) -> usize {
        let track = world.track;
        let intensity = analysis.action.brake_intensity.max(0.0).min(1.0);
        vehicle.speed -= vehicle.brake_rate * self.pars.override_brake_factor * intensity;

        let target_lane = analysis.action.target_lane;
        let target_x = track.lane_center_x(target_lane);
        if (target_x - vehicle.x).abs() > LANE_ARRIVAL_TOLERANCE {
            let rate = vehicle.max_steering_rate;
            vehicle.steer_towards(target_x, rate);
        }

        vehicle.clamp_state(track);
        target_lane
    }

    /// Small lateral bias toward the best same-role power-up ahead.
    fn powerup_nudge(
        &self,
        vehicle: &mut Vehicle,
        world: &WorldSnapshot,
        analysis: &SafetyAnalysis,
    ) {
        let mut best: Option<(usize, f64)> = None;
        for powerup in world.powerups_for(vehicle.role) {
            let ahead = powerup.distance - vehicle.distance;
            if ahead <= 0.0 || ahead >= self.pars.nudge_range {
                continue;
            }
            let mut score = powerup.priority / (1.0 + ahead / 100.0);
            if !analysis.is_lane_safe(powerup.lane) {
                score *= 0.3;
            }
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((powerup.lane, score));
            }
        }

        if let Some((lane, _)) = best {
            let target_x = world.track.lane_center_x(lane);
            vehicle.steer_towards(target_x, self.pars.nudge_rate);
        }
    }

    /// The method replaces a target lane the safety layer considers unsafe by its recommended
    /// lane.
    fn checked_lane(lane: usize, analysis: &SafetyAnalysis) -> usize {
        if analysis.is_lane_safe(lane) {
            lane
        } else {
            analysis.action.target_lane
        }
    }

    /// Tiered braking on top of a controller's own speed command.
    fn safety_brake(vehicle: &mut Vehicle, analysis: &SafetyAnalysis) {
        if analysis.urgency() >= Urgency::High {
            vehicle.brake(analysis.action.brake_intensity);
        }
    }

    fn steer_to_lane(vehicle: &mut Vehicle, world: &WorldSnapshot, lane: usize) {
        let target_x = world.track.lane_center_x(lane);
        if (target_x - vehicle.x).abs() > LANE_ARRIVAL_TOLERANCE {
            let rate = steering_rate(vehicle);
            vehicle.steer_towards(target_x, rate);
        }
    }

    /// Constraint solver output, corrected to the safe lane set and braked with the recommended
    /// intensity.
    fn execute_safety(
        &self,
        vehicle: &mut Vehicle,
        world: &WorldSnapshot,
        analysis: &SafetyAnalysis,
    ) -> usize {
        let mut decision = self.csp.solve_lane_decision(vehicle, world);
        decision.lane = DecisionArbiter::checked_lane(decision.lane, analysis);
        if analysis.action.brake_intensity > 0.0
            && decision.speed_action == SpeedAction::Accelerate
        {
            decision.speed_action = SpeedAction::Maintain;
        }

        apply_decision(vehicle, decision, world.track);
        vehicle.brake(analysis.action.brake_intensity);
        decision.lane
    }

    fn execute_fuzzy(
        &self,
        vehicle: &mut Vehicle,
        world: &WorldSnapshot,
        analysis: &SafetyAnalysis,
    ) -> usize {
        let output = self.fuzzy.evaluate(vehicle, world, analysis);
        let target_lane = DecisionArbiter::checked_lane(output.target_lane, analysis);

        vehicle.speed += speed_delta(output.acceleration, vehicle);
        DecisionArbiter::safety_brake(vehicle, analysis);
        DecisionArbiter::steer_to_lane(vehicle, world, target_lane);
        target_lane
    }

    fn execute_minimax(
        &mut self,
        vehicle: &mut Vehicle,
        world: &WorldSnapshot,
        analysis: &SafetyAnalysis,
    ) -> Option<usize> {
        let result = self.minimax.best_action(vehicle, world)?;
        trace!(
            role = %vehicle.role,
            nodes = self.minimax.nodes_searched,
            budget_exceeded = self.minimax.budget_exceeded,
            score = result.score,
            "minimax search finished"
        );

        let decision = Decision::new(
            DecisionArbiter::checked_lane(result.lane, analysis),
            result.speed_action,
        );
        apply_decision(vehicle, decision, world.track);
        DecisionArbiter::safety_brake(vehicle, analysis);
        Some(decision.lane)
    }

    fn execute_astar(
        &mut self,
        vehicle: &mut Vehicle,
        world: &WorldSnapshot,
        analysis: &SafetyAnalysis,
    ) -> usize {
        let plan = self.astar.plan(vehicle, world);
        let target_lane = DecisionArbiter::checked_lane(plan.target_lane, analysis);

        approach_speed(vehicle, plan.target_speed);
        DecisionArbiter::safety_brake(vehicle, analysis);
        DecisionArbiter::steer_to_lane(vehicle, world, target_lane);
        target_lane
    }
}
