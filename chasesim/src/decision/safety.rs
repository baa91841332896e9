use crate::core::track::NO_LANES;
use crate::core::vehicle::Vehicle;
use crate::core::world::WorldSnapshot;
use crate::decision::Urgency;
use helpers::general::{argmin, argsort, SortOrder};
use serde::Deserialize;

/// * `horizon_base` - (ticks) Prediction horizon at standstill
/// * `horizon_per_speed` - (ticks per unit/tick) Horizon growth with speed
/// * `scan_base` - (units) Look-ahead window at standstill
/// * `scan_per_speed` - (units per unit/tick) Look-ahead window growth with speed
/// * `side_guard` - (units) Longitudinal window around the vehicle in which a car in a lane that
/// is crossed during a lane change counts as a side-swipe threat
/// * `overlap` - (units) Cars up to this far behind the vehicle still count as touching it
/// * `critical_ttc` / `high_ttc` / `moderate_ttc` - (ticks) Time-to-collision urgency thresholds
/// * `critical_distance` / `high_distance` / `moderate_distance` - (units) Raw proximity urgency
/// thresholds
#[derive(Debug, Deserialize, Clone)]
pub struct SafetyPars {
    pub horizon_base: f64,
    pub horizon_per_speed: f64,
    pub scan_base: f64,
    pub scan_per_speed: f64,
    pub side_guard: f64,
    pub overlap: f64,
    pub critical_ttc: f64,
    pub high_ttc: f64,
    pub moderate_ttc: f64,
    pub critical_distance: f64,
    pub high_distance: f64,
    pub moderate_distance: f64,
}

impl Default for SafetyPars {
    fn default() -> Self {
        SafetyPars {
            horizon_base: 15.0,
            horizon_per_speed: 3.0,
            scan_base: 300.0,
            scan_per_speed: 80.0,
            side_guard: 100.0,
            overlap: 60.0,
            critical_ttc: 12.0,
            high_ttc: 24.0,
            moderate_ttc: 40.0,
            critical_distance: 120.0,
            high_distance: 200.0,
            moderate_distance: 300.0,
        }
    }
}

// predicted gap tiers at the end of the horizon
const GAP_SEVERE: f64 = 100.0;
const GAP_HIGH: f64 = 200.0;
const GAP_MODERATE: f64 = 300.0;
const PENALTY_GAP_SEVERE: f64 = 1000.0;
const PENALTY_GAP_HIGH: f64 = 500.0;
const PENALTY_GAP_MODERATE: f64 = 200.0;

// raw proximity tiers
const PENALTY_PROX_CRITICAL: f64 = 1500.0;
const PENALTY_PROX_HIGH: f64 = 600.0;
const PENALTY_PROX_MODERATE: f64 = 250.0;
const PROX_WATCH: f64 = 450.0;
const PENALTY_PROX_WATCH: f64 = 50.0;

const PENALTY_SIDE_SWIPE: f64 = 800.0;

/// Risk at or above this value means a flagged danger tier was triggered.
pub const UNSAFE_RISK: f64 = PENALTY_GAP_MODERATE;

/// Per-lane result of the safety scan.
#[derive(Debug, Clone, Copy)]
pub struct LaneAssessment {
    pub risk: f64,
    pub min_distance: f64,
    pub min_ttc: f64,
    pub closing: bool,
    pub side_swipe: bool,
}

impl LaneAssessment {
    fn clear() -> LaneAssessment {
        LaneAssessment {
            risk: 0.0,
            min_distance: f64::INFINITY,
            min_ttc: f64::INFINITY,
            closing: false,
            side_swipe: false,
        }
    }

    pub fn is_safe(&self) -> bool {
        self.risk < UNSAFE_RISK
    }
}

/// Emergency recommendation derived from the current lane's assessment.
#[derive(Debug, Clone)]
pub struct RecommendedAction {
    pub urgency: Urgency,
    pub brake_intensity: f64,
    pub lane_change_needed: bool,
    pub target_lane: usize,
}

/// SafetyAnalysis is recomputed every tick and never persisted.
#[derive(Debug, Clone)]
pub struct SafetyAnalysis {
    pub current_lane: usize,
    pub horizon_ticks: f64,
    pub lanes: [LaneAssessment; NO_LANES],
    pub danger_detected: bool,
    pub min_ttc: f64,
    /// Safe lanes ordered by ascending risk. Never empty: if no lane is clean it holds the
    /// least risky lane.
    pub safe_lanes: Vec<usize>,
    pub action: RecommendedAction,
}

impl SafetyAnalysis {
    pub fn urgency(&self) -> Urgency {
        self.action.urgency
    }

    pub fn is_lane_safe(&self, lane: usize) -> bool {
        lane < NO_LANES && self.lanes[lane].is_safe()
    }

    /// Analysis of a world in which nothing can hit the vehicle (ghost mode).
    fn all_clear(current_lane: usize, horizon_ticks: f64) -> SafetyAnalysis {
        SafetyAnalysis {
            current_lane,
            horizon_ticks,
            lanes: [LaneAssessment::clear(); NO_LANES],
            danger_detected: false,
            min_ttc: f64::INFINITY,
            safe_lanes: (0..NO_LANES).collect(),
            action: RecommendedAction {
                urgency: Urgency::None,
                brake_intensity: 0.0,
                lane_change_needed: false,
                target_lane: current_lane,
            },
        }
    }
}

/// SafetyLayer forward-simulates the relative motion of the vehicle and the traffic in every
/// lane. It is read-only and deterministic given its inputs.
#[derive(Debug, Clone, Default)]
pub struct SafetyLayer {
    pub pars: SafetyPars,
}

impl SafetyLayer {
    pub fn new(pars: SafetyPars) -> SafetyLayer {
        SafetyLayer { pars }
    }

    /// The prediction horizon in ticks grows linearly with speed.
    pub fn horizon_ticks(&self, speed: f64) -> f64 {
        self.pars.horizon_base + self.pars.horizon_per_speed * speed.max(0.0)
    }

    pub fn scan_window(&self, speed: f64) -> f64 {
        self.pars.scan_base + self.pars.scan_per_speed * speed.max(0.0)
    }

    pub fn analyze(&self, vehicle: &Vehicle, world: &WorldSnapshot) -> SafetyAnalysis {
        let track = world.track;
        let current_lane = vehicle.lane(track);
        let horizon = self.horizon_ticks(vehicle.speed);

        if world.ghost_mode {
            return SafetyAnalysis::all_clear(current_lane, horizon);
        }

        let mut lanes = [LaneAssessment::clear(); NO_LANES];
        for (lane, assessment) in lanes.iter_mut().enumerate() {
            *assessment = self.assess_lane(vehicle, world, lane, horizon);
        }

        // side-swipe guard: every lane crossed on the way to a target lane must be clear for the
        // whole duration of the lateral move
        for target in 0..NO_LANES {
            if target == current_lane {
                continue;
            }
            let t_change = (track.lane_center_x(target) - vehicle.x).abs()
                / vehicle.max_steering_rate.max(1.0);
            let swept = lanes_between(current_lane, target);

            if swept
                .iter()
                .any(|&lane| self.side_swipe_threat(vehicle, world, lane, t_change))
            {
                lanes[target].risk += PENALTY_SIDE_SWIPE;
                lanes[target].side_swipe = true;
            }
        }

        let risks: Vec<f64> = lanes.iter().map(|l| l.risk).collect();
        let mut safe_lanes: Vec<usize> = argsort(&risks, SortOrder::Ascending)
            .into_iter()
            .filter(|&lane| lanes[lane].is_safe())
            .collect();
        if safe_lanes.is_empty() {
            safe_lanes.push(argmin(&risks));
        }

        let cur = lanes[current_lane];
        let urgency = self.classify_urgency(&cur);
        let target_lane = select_target_lane(current_lane, &lanes, &safe_lanes);
        let lane_change_needed = target_lane != current_lane && !cur.is_safe();

        let mut brake_intensity = match urgency {
            Urgency::Critical => 1.0,
            Urgency::High => 0.7,
            Urgency::Moderate => 0.4,
            Urgency::Low => 0.15,
            Urgency::None => 0.0,
        };
        // escaping sideways halves the need to brake unless a crash is imminent
        if lane_change_needed && urgency < Urgency::Critical {
            brake_intensity *= 0.5;
        }

        SafetyAnalysis {
            current_lane,
            horizon_ticks: horizon,
            lanes,
            danger_detected: !cur.is_safe() || urgency >= Urgency::Moderate,
            min_ttc: cur.min_ttc,
            safe_lanes,
            action: RecommendedAction {
                urgency,
                brake_intensity,
                lane_change_needed,
                target_lane,
            },
        }
    }

    fn assess_lane(
        &self,
        vehicle: &Vehicle,
        world: &WorldSnapshot,
        lane: usize,
        horizon: f64,
    ) -> LaneAssessment {
        let window = self.scan_window(vehicle.speed);
        let mut assessment = LaneAssessment::clear();

        for car in world.cars_in_lane(lane) {
            let rel_dist = car.distance - vehicle.distance;
            if rel_dist <= -self.pars.overlap || rel_dist > window {
                continue;
            }
            let gap = rel_dist.max(0.0);
            let rel_speed = vehicle.speed - car.velocity();

            // a car overlapping from behind is being left behind, not closed in on
            if rel_dist > 0.0 && rel_speed > 0.0 {
                let ttc = gap / rel_speed;
                if gap < assessment.min_distance {
                    assessment.closing = true;
                }
                assessment.min_ttc = assessment.min_ttc.min(ttc);

                // encounters within twice the horizon are projected to the horizon end
                if ttc <= 2.0 * horizon {
                    let predicted_gap = gap - rel_speed * horizon;
                    assessment.risk += if predicted_gap < GAP_SEVERE {
                        PENALTY_GAP_SEVERE
                    } else if predicted_gap < GAP_HIGH {
                        PENALTY_GAP_HIGH
                    } else if predicted_gap < GAP_MODERATE {
                        PENALTY_GAP_MODERATE
                    } else {
                        0.0
                    };
                }
            } else if gap < assessment.min_distance {
                assessment.closing = false;
            }
            assessment.min_distance = assessment.min_distance.min(gap);

            assessment.risk += if gap < self.pars.critical_distance {
                PENALTY_PROX_CRITICAL
            } else if gap < self.pars.high_distance {
                PENALTY_PROX_HIGH
            } else if gap < self.pars.moderate_distance {
                PENALTY_PROX_MODERATE
            } else if gap < PROX_WATCH {
                PENALTY_PROX_WATCH
            } else {
                0.0
            };
        }

        assessment
    }

    /// The method checks if any car in `lane` comes within the side guard of the vehicle during
    /// the next `t_change` ticks.
    fn side_swipe_threat(
        &self,
        vehicle: &Vehicle,
        world: &WorldSnapshot,
        lane: usize,
        t_change: f64,
    ) -> bool {
        world.cars_in_lane(lane).any(|car| {
            let rel_start = car.distance - vehicle.distance;
            let rel_speed = vehicle.speed - car.velocity();
            let rel_end = rel_start - rel_speed * t_change;

            let min_abs = if rel_start.signum() != rel_end.signum() {
                0.0
            } else {
                rel_start.abs().min(rel_end.abs())
            };
            min_abs < self.pars.side_guard
        })
    }

    fn classify_urgency(&self, lane: &LaneAssessment) -> Urgency {
        let p = &self.pars;
        let ttc = lane.min_ttc;
        let dist = lane.min_distance;

        if ttc < p.critical_ttc || (lane.closing && dist < p.critical_distance) {
            Urgency::Critical
        } else if ttc < p.high_ttc || (lane.closing && dist < p.high_distance) {
            Urgency::High
        } else if ttc < p.moderate_ttc || (lane.closing && dist < p.moderate_distance) {
            Urgency::Moderate
        } else if !lane.is_safe() {
            Urgency::Low
        } else {
            Urgency::None
        }
    }
}

/// lanes_between returns the lanes swept when moving from `from` to `to`, excluding `from`.
fn lanes_between(from: usize, to: usize) -> Vec<usize> {
    if to > from {
        (from + 1..=to).collect()
    } else {
        (to..from).rev().collect()
    }
}

/// select_target_lane keeps the current lane if it is safe, otherwise picks the nearest safe
/// lane, preferring lower risk among equally near lanes.
fn select_target_lane(
    current_lane: usize,
    lanes: &[LaneAssessment; NO_LANES],
    safe_lanes: &[usize],
) -> usize {
    if lanes[current_lane].is_safe() {
        return current_lane;
    }

    let mut best = safe_lanes[0];
    for &lane in safe_lanes.iter() {
        let d_lane = (lane as i64 - current_lane as i64).abs();
        let d_best = (best as i64 - current_lane as i64).abs();
        if d_lane < d_best || (d_lane == d_best && lanes[lane].risk < lanes[best].risk) {
            best = lane;
        }
    }
    best
}
