use crate::core::track::NO_LANES;
use crate::core::vehicle::{Role, Vehicle};
use crate::core::world::WorldSnapshot;
use crate::decision::safety::SafetyAnalysis;
use crate::decision::Urgency;
use helpers::general::lin_interp;
use serde::Deserialize;

/// Membership function shapes. Shoulders saturate at 1 beyond their full point.
#[derive(Debug, Clone, Copy)]
pub enum Membership {
    LeftShoulder { full: f64, zero: f64 },
    Triangle { left: f64, peak: f64, right: f64 },
    Trapezoid { a: f64, b: f64, c: f64, d: f64 },
    RightShoulder { zero: f64, full: f64 },
}

impl Membership {
    pub fn degree(&self, x: f64) -> f64 {
        match *self {
            Membership::LeftShoulder { full, zero } => lin_interp(x, &[full, zero], &[1.0, 0.0]),
            Membership::Triangle { left, peak, right } => {
                lin_interp(x, &[left, peak, right], &[0.0, 1.0, 0.0])
            }
            Membership::Trapezoid { a, b, c, d } => {
                lin_interp(x, &[a, b, c, d], &[0.0, 1.0, 1.0, 0.0])
            }
            Membership::RightShoulder { zero, full } => lin_interp(x, &[zero, full], &[0.0, 1.0]),
        }
    }

    /// The method returns a copy with all breakpoints multiplied by the given factor.
    pub fn scaled(&self, factor: f64) -> Membership {
        match *self {
            Membership::LeftShoulder { full, zero } => Membership::LeftShoulder {
                full: full * factor,
                zero: zero * factor,
            },
            Membership::Triangle { left, peak, right } => Membership::Triangle {
                left: left * factor,
                peak: peak * factor,
                right: right * factor,
            },
            Membership::Trapezoid { a, b, c, d } => Membership::Trapezoid {
                a: a * factor,
                b: b * factor,
                c: c * factor,
                d: d * factor,
            },
            Membership::RightShoulder { zero, full } => Membership::RightShoulder {
                zero: zero * factor,
                full: full * factor,
            },
        }
    }
}

fn fuzzify<const N: usize>(x: f64, sets: &[Membership; N], scale: f64) -> [f64; N] {
    let mut degrees = [0.0; N];
    for (degree, set) in degrees.iter_mut().zip(sets.iter()) {
        *degree = set.scaled(scale).degree(x);
    }
    degrees
}

// ---- LINGUISTIC VARIABLES ----
// Indices into the membership arrays. Distances are given for a vehicle at standstill and are
// stretched with speed so the controller reacts well before a collision becomes unavoidable.

const VERY_CLOSE: usize = 0;
const CLOSE: usize = 1;
const MEDIUM: usize = 2;
const FAR: usize = 3;
const VERY_FAR: usize = 4;

const TRAFFIC_DISTANCE: [Membership; 5] = [
    Membership::LeftShoulder { full: 60.0, zero: 120.0 },
    Membership::Triangle { left: 80.0, peak: 150.0, right: 250.0 },
    Membership::Triangle { left: 180.0, peak: 300.0, right: 450.0 },
    Membership::Trapezoid { a: 350.0, b: 550.0, c: 650.0, d: 850.0 },
    Membership::RightShoulder { zero: 650.0, full: 900.0 },
];

const EXTREMELY_CLOSE: usize = 0;
const OPP_VERY_CLOSE: usize = 1;
const OPP_CLOSE: usize = 2;
const OPP_MEDIUM: usize = 3;
const OPP_FAR: usize = 4;
const OPP_VERY_FAR: usize = 5;

const OPPONENT_PROXIMITY: [Membership; 6] = [
    Membership::LeftShoulder { full: 50.0, zero: 100.0 },
    Membership::Triangle { left: 60.0, peak: 125.0, right: 200.0 },
    Membership::Triangle { left: 150.0, peak: 250.0, right: 400.0 },
    Membership::Triangle { left: 300.0, peak: 500.0, right: 800.0 },
    Membership::Triangle { left: 600.0, peak: 1000.0, right: 1500.0 },
    Membership::RightShoulder { zero: 1200.0, full: 1800.0 },
];

const VERY_SLOW: usize = 0;
const SLOW: usize = 1;
const MEDIUM_SPEED: usize = 2;
const FAST: usize = 3;
const VERY_FAST: usize = 4;

const SPEED_RATIO: [Membership; 5] = [
    Membership::LeftShoulder { full: 0.1, zero: 0.25 },
    Membership::Triangle { left: 0.1, peak: 0.3, right: 0.5 },
    Membership::Triangle { left: 0.35, peak: 0.55, right: 0.75 },
    Membership::Triangle { left: 0.6, peak: 0.8, right: 0.95 },
    Membership::RightShoulder { zero: 0.85, full: 1.0 },
];

const BLOCKED: usize = 0;
const PARTIAL: usize = 1;
const CLEAR: usize = 2;

const LANE_CLEARANCE: [Membership; 3] = [
    Membership::LeftShoulder { full: 100.0, zero: 200.0 },
    Membership::Triangle { left: 120.0, peak: 300.0, right: 500.0 },
    Membership::RightShoulder { zero: 350.0, full: 600.0 },
];

const URG_LOW: usize = 0;
const URG_MEDIUM: usize = 1;
const URG_HIGH: usize = 2;
const URG_CRITICAL: usize = 3;

const LANE_CHANGE_URGENCY: [Membership; 4] = [
    Membership::LeftShoulder { full: 0.1, zero: 0.3 },
    Membership::Triangle { left: 0.15, peak: 0.35, right: 0.55 },
    Membership::Triangle { left: 0.4, peak: 0.6, right: 0.8 },
    Membership::RightShoulder { zero: 0.7, full: 0.9 },
];

const DANGEROUS: usize = 0;
const RISKY: usize = 1;
const SAFE: usize = 2;
const VERY_SAFE: usize = 3;

const LANE_SAFETY: [Membership; 4] = [
    Membership::LeftShoulder { full: 0.3, zero: 0.5 },
    Membership::Triangle { left: 0.35, peak: 0.55, right: 0.75 },
    Membership::Triangle { left: 0.6, peak: 0.8, right: 0.95 },
    Membership::RightShoulder { zero: 0.85, full: 1.0 },
];

const EMPTY: usize = 0;
const LIGHT: usize = 1;
const MODERATE: usize = 2;
const HEAVY: usize = 3;
const CONGESTED: usize = 4;

const TRAFFIC_DENSITY: [Membership; 5] = [
    Membership::LeftShoulder { full: 0.0, zero: 1.0 },
    Membership::Triangle { left: 0.0, peak: 1.5, right: 3.0 },
    Membership::Triangle { left: 2.0, peak: 3.5, right: 5.0 },
    Membership::Triangle { left: 4.0, peak: 5.5, right: 7.0 },
    Membership::RightShoulder { zero: 6.0, full: 8.0 },
];

// output buckets
const STRONG_BRAKE: usize = 0;
const BRAKE: usize = 1;
const MAINTAIN: usize = 2;
const ACCELERATE: usize = 3;
const STRONG_ACCELERATE: usize = 4;

const ACCELERATION_CENTROIDS: [f64; 5] = [-0.7, -0.35, 0.0, 0.3, 0.6];

const VERY_LOW: usize = 0;
const LOW: usize = 1;
const MID: usize = 2;
const HIGH: usize = 3;
const VERY_HIGH: usize = 4;

const CONFIDENCE_CENTROIDS: [f64; 5] = [10.0, 30.0, 50.0, 75.0, 95.0];

/// Risk value at which a lane counts as fully dangerous for fuzzification.
const RISK_SATURATION: f64 = 2000.0;

/// Risk value at which the current lane demands a lane change with full urgency.
const URGENCY_SATURATION: f64 = 3000.0;

/// * `extreme_gap` - (units) Gap ahead below which braking is forced to `extreme_brake`
/// * `extreme_brake` - Acceleration ceiling applied in the extreme zone
/// * `side_window` - (units) A car this close longitudinally in a candidate lane vetoes the change
/// * `change_threshold` - (%) Confidence above which a lane change is executed
/// * `scan_window` - (units) Look-ahead window for traffic gaps
/// * `density_window` - (units) Half-width of the window traffic density is counted in
/// * `speed_scale` - (units/tick) Speed at which distance thresholds are doubled
#[derive(Debug, Deserialize, Clone)]
pub struct FuzzyPars {
    pub extreme_gap: f64,
    pub extreme_brake: f64,
    pub side_window: f64,
    pub change_threshold: f64,
    pub scan_window: f64,
    pub density_window: f64,
    pub speed_scale: f64,
}

impl Default for FuzzyPars {
    fn default() -> Self {
        FuzzyPars {
            extreme_gap: 80.0,
            extreme_brake: -0.9,
            side_window: 100.0,
            change_threshold: 60.0,
            scan_window: 1500.0,
            density_window: 600.0,
            speed_scale: 8.0,
        }
    }
}

/// Crisp controller output.
/// * `acceleration` - Normalized command in [-1, 1], negative values brake
/// * `lane_change_confidence` - (%) Confidence in [0, 100] for the best candidate lane
/// * `target_lane` - The candidate lane if its confidence exceeds the threshold, otherwise the
/// current lane
#[derive(Debug, Clone, Copy)]
pub struct FuzzyOutput {
    pub acceleration: f64,
    pub lane_change_confidence: f64,
    pub target_lane: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FuzzyController {
    pub pars: FuzzyPars,
}

impl FuzzyController {
    pub fn new(pars: FuzzyPars) -> FuzzyController {
        FuzzyController { pars }
    }

    fn distance_scale(&self, speed: f64) -> f64 {
        1.0 + speed.max(0.0) / self.pars.speed_scale
    }

    pub fn evaluate(
        &self,
        vehicle: &Vehicle,
        world: &WorldSnapshot,
        analysis: &SafetyAnalysis,
    ) -> FuzzyOutput {
        let track = world.track;
        let current_lane = vehicle.lane(track);
        let scale = self.distance_scale(vehicle.speed);
        let gap = world.gap_ahead(current_lane, vehicle.distance, self.pars.scan_window, 0.0);

        // acceleration
        let mut acceleration = self.infer_acceleration(vehicle, world, analysis, gap, scale);
        if gap < self.pars.extreme_gap * scale.min(1.5) && !world.ghost_mode {
            acceleration = acceleration.min(self.pars.extreme_brake);
        }
        let acceleration = acceleration.max(-1.0).min(1.0);

        // lane change
        let mut best_lane = current_lane;
        let mut best_confidence = 0.0;
        for lane in track.neighbor_lanes(current_lane) {
            if lane == current_lane {
                continue;
            }
            let mut confidence = self.infer_lane_change(vehicle, world, analysis, lane, scale);
            if !world.ghost_mode && self.side_collision_window(vehicle, world, lane, analysis) {
                confidence = 0.0;
            }
            let confidence = confidence.max(0.0).min(100.0);
            if confidence > best_confidence {
                best_confidence = confidence;
                best_lane = lane;
            }
        }

        let target_lane = if best_confidence > self.pars.change_threshold {
            best_lane
        } else {
            current_lane
        };

        FuzzyOutput {
            acceleration,
            lane_change_confidence: best_confidence,
            target_lane,
        }
    }

    fn infer_acceleration(
        &self,
        vehicle: &Vehicle,
        world: &WorldSnapshot,
        analysis: &SafetyAnalysis,
        gap: f64,
        scale: f64,
    ) -> f64 {
        let traffic = fuzzify(gap, &TRAFFIC_DISTANCE, scale);
        let speed = fuzzify(vehicle.speed_ratio(), &SPEED_RATIO, 1.0);
        let density_count = world.traffic_density(
            vehicle.distance,
            self.pars.density_window,
            self.pars.density_window,
        ) as f64;
        let density = fuzzify(density_count, &TRAFFIC_DENSITY, 1.0);

        let mut out = [0.0; 5];
        let mut fire = |bucket: usize, strength: f64| out[bucket] = f64::max(out[bucket], strength);

        fire(STRONG_BRAKE, traffic[VERY_CLOSE]);
        fire(STRONG_BRAKE, traffic[CLOSE].min(speed[FAST].max(speed[VERY_FAST])));
        fire(
            BRAKE,
            traffic[CLOSE].min(speed[MEDIUM_SPEED].max(speed[SLOW]).max(speed[VERY_SLOW])),
        );
        fire(BRAKE, traffic[MEDIUM].min(speed[VERY_FAST]));
        fire(MAINTAIN, traffic[MEDIUM].min(speed[FAST].max(speed[MEDIUM_SPEED])));
        fire(ACCELERATE, traffic[MEDIUM].min(speed[SLOW].max(speed[VERY_SLOW])));
        fire(ACCELERATE, traffic[FAR].min(1.0 - speed[VERY_FAST]));
        fire(MAINTAIN, traffic[FAR].min(speed[VERY_FAST]));
        fire(STRONG_ACCELERATE, traffic[VERY_FAR].min(density[EMPTY].max(density[LIGHT])));
        fire(
            ACCELERATE,
            traffic[VERY_FAR].min(density[MODERATE].max(density[HEAVY])),
        );
        fire(MAINTAIN, traffic[VERY_FAR].min(density[CONGESTED]));

        // safety layer danger feeds straight into the braking buckets
        match analysis.urgency() {
            Urgency::Critical => fire(STRONG_BRAKE, 1.0),
            Urgency::High => fire(BRAKE, 1.0),
            _ => {}
        }

        // role rules
        if let Some(opponent) = world.opponent {
            let signed_gap = opponent.distance - vehicle.distance;
            let proximity = fuzzify(signed_gap.abs(), &OPPONENT_PROXIMITY, 1.0);
            let road_open = traffic[FAR].max(traffic[VERY_FAR]);

            match vehicle.role {
                Role::Police => {
                    if signed_gap >= 0.0 {
                        // chase down a distant thief, match speed once alongside
                        fire(
                            STRONG_ACCELERATE,
                            road_open.min(
                                proximity[OPP_MEDIUM]
                                    .max(proximity[OPP_FAR])
                                    .max(proximity[OPP_VERY_FAR]),
                            ),
                        );
                        fire(
                            ACCELERATE,
                            (1.0 - traffic[VERY_CLOSE]).min(proximity[OPP_CLOSE]),
                        );
                        fire(
                            MAINTAIN,
                            proximity[EXTREMELY_CLOSE].max(proximity[OPP_VERY_CLOSE]),
                        );
                    } else {
                        fire(BRAKE, proximity[OPP_VERY_CLOSE].max(proximity[OPP_CLOSE]));
                    }
                }
                Role::Thief => {
                    if signed_gap <= 0.0 {
                        fire(
                            STRONG_ACCELERATE,
                            (1.0 - traffic[VERY_CLOSE]).min(
                                proximity[EXTREMELY_CLOSE]
                                    .max(proximity[OPP_VERY_CLOSE])
                                    .max(proximity[OPP_CLOSE]),
                            ),
                        );
                    }
                }
            }
        }

        defuzzify(&out, &ACCELERATION_CENTROIDS, 0.0)
    }

    fn infer_lane_change(
        &self,
        vehicle: &Vehicle,
        world: &WorldSnapshot,
        analysis: &SafetyAnalysis,
        lane: usize,
        scale: f64,
    ) -> f64 {
        let current_lane = analysis.current_lane;
        let urgency = fuzzify(
            analysis.lanes[current_lane].risk / URGENCY_SATURATION,
            &LANE_CHANGE_URGENCY,
            1.0,
        );
        let current_safety = fuzzify(lane_safety(analysis, current_lane), &LANE_SAFETY, 1.0);
        let target_safety = fuzzify(lane_safety(analysis, lane), &LANE_SAFETY, 1.0);
        let clearance = fuzzify(
            world.gap_ahead(lane, vehicle.distance, self.pars.scan_window, 0.0),
            &LANE_CLEARANCE,
            scale,
        );
        let lane_density = world
            .cars_in_lane(lane)
            .filter(|car| (car.distance - vehicle.distance).abs() < self.pars.density_window)
            .count() as f64;
        let density = fuzzify(lane_density, &TRAFFIC_DENSITY, 1.0);

        let target_ok = target_safety[SAFE].max(target_safety[VERY_SAFE]);
        let not_congested = 1.0 - density[HEAVY].max(density[CONGESTED]);

        let mut out = [0.0; 5];
        let mut fire = |bucket: usize, strength: f64| out[bucket] = f64::max(out[bucket], strength);

        fire(VERY_HIGH, urgency[URG_CRITICAL].min(target_ok));
        fire(HIGH, urgency[URG_HIGH].min(target_ok));
        fire(
            VERY_HIGH,
            current_safety[DANGEROUS].min(clearance[CLEAR]).min(not_congested),
        );
        fire(HIGH, current_safety[RISKY].min(clearance[CLEAR]).min(not_congested));
        fire(MID, urgency[URG_MEDIUM].min(clearance[PARTIAL]));
        fire(
            LOW,
            current_safety[SAFE].max(current_safety[VERY_SAFE]).min(clearance[CLEAR]),
        );
        fire(VERY_LOW, urgency[URG_LOW].min(current_safety[VERY_SAFE]));
        fire(VERY_LOW, target_safety[DANGEROUS]);
        fire(VERY_LOW, clearance[BLOCKED]);
        fire(LOW, density[HEAVY].max(density[CONGESTED]));

        if let Some(opponent) = world.opponent {
            let proximity = fuzzify(
                (opponent.distance - vehicle.distance).abs(),
                &OPPONENT_PROXIMITY,
                1.0,
            );
            match vehicle.role {
                Role::Police if lane == opponent.lane => {
                    // match the thief's lane
                    fire(
                        HIGH,
                        (1.0 - clearance[BLOCKED]).min(target_ok).min(
                            proximity[OPP_CLOSE]
                                .max(proximity[OPP_MEDIUM])
                                .max(proximity[OPP_FAR]),
                        ),
                    );
                }
                Role::Thief if current_lane == opponent.lane && lane != opponent.lane => {
                    // evade the police lane
                    fire(
                        HIGH,
                        clearance[CLEAR].min(target_ok).min(
                            proximity[EXTREMELY_CLOSE]
                                .max(proximity[OPP_VERY_CLOSE])
                                .max(proximity[OPP_CLOSE]),
                        ),
                    );
                }
                _ => {}
            }
        }

        defuzzify(&out, &CONFIDENCE_CENTROIDS, 0.0)
    }

    /// The method checks if a car in the candidate lane is alongside the vehicle, or if the safety
    /// layer flagged a side swipe on the way there.
    fn side_collision_window(
        &self,
        vehicle: &Vehicle,
        world: &WorldSnapshot,
        lane: usize,
        analysis: &SafetyAnalysis,
    ) -> bool {
        analysis.lanes[lane].side_swipe
            || world
                .cars_in_lane(lane)
                .any(|car| (car.distance - vehicle.distance).abs() < self.pars.side_window)
    }
}

/// Crisp lane safety in [0, 1] derived from the safety layer's risk score.
fn lane_safety(analysis: &SafetyAnalysis, lane: usize) -> f64 {
    if lane >= NO_LANES {
        return 0.0;
    }
    1.0 - (analysis.lanes[lane].risk / RISK_SATURATION).min(1.0)
}

/// defuzzify returns the weighted centroid of the output buckets, or `neutral` if no rule fired.
pub fn defuzzify(strengths: &[f64], centroids: &[f64], neutral: f64) -> f64 {
    let total: f64 = strengths.iter().sum();
    if total <= f64::EPSILON {
        return neutral;
    }
    strengths
        .iter()
        .zip(centroids.iter())
        .map(|(s, c)| s * c)
        .sum::<f64>()
        / total
}

/// speed_delta converts a normalized acceleration command into a speed change using the
/// vehicle's role-specific rates. The strongest centroids map to the full rates.
pub fn speed_delta(acceleration: f64, vehicle: &Vehicle) -> f64 {
    if acceleration > 0.0 {
        acceleration / ACCELERATION_CENTROIDS[STRONG_ACCELERATE] * vehicle.acceleration_rate
    } else {
        acceleration / ACCELERATION_CENTROIDS[STRONG_BRAKE].abs() * vehicle.brake_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::track::Track;
    use crate::core::traffic::TrafficCar;
    use crate::core::vehicle::VehiclePars;
    use crate::core::world::OpponentView;
    use crate::decision::safety::SafetyLayer;
    use approx::assert_relative_eq;

    fn run(vehicle: &Vehicle, world: &WorldSnapshot) -> FuzzyOutput {
        let analysis = SafetyLayer::default().analyze(vehicle, world);
        FuzzyController::default().evaluate(vehicle, world, &analysis)
    }

    #[test]
    fn memberships_saturate_at_shoulders() {
        let left = TRAFFIC_DISTANCE[VERY_CLOSE];
        assert_relative_eq!(left.degree(0.0), 1.0);
        assert_relative_eq!(left.degree(90.0), 0.5);
        assert_relative_eq!(left.degree(f64::INFINITY), 0.0);

        let right = TRAFFIC_DISTANCE[VERY_FAR];
        assert_relative_eq!(right.degree(f64::INFINITY), 1.0);
        assert_relative_eq!(right.scaled(2.0).degree(900.0), 0.0);
    }

    #[test]
    fn defuzzify_without_firing_is_neutral() {
        assert_relative_eq!(defuzzify(&[0.0; 5], &ACCELERATION_CENTROIDS, 0.0), 0.0);
        assert_relative_eq!(
            defuzzify(&[0.0, 0.0, 0.0, 0.0, 1.0], &ACCELERATION_CENTROIDS, 0.0),
            0.6
        );
    }

    #[test]
    fn clear_road_accelerates() {
        let track = Track::default();
        let thief = Vehicle::new(&VehiclePars::default_thief(), &track);
        let world = WorldSnapshot::new(&track, &[], &[], None, false);

        let output = run(&thief, &world);

        assert_relative_eq!(output.acceleration, 0.6);
        assert_eq!(output.target_lane, 1);
        assert_relative_eq!(speed_delta(output.acceleration, &thief), thief.acceleration_rate);
    }

    #[test]
    fn extremely_close_obstacle_forces_hard_braking() {
        let track = Track::default();
        let mut thief = Vehicle::new(&VehiclePars::default_thief(), &track);
        thief.speed = 6.0;
        let traffic = vec![TrafficCar::new(1, 40.0, 2.0, &track)];
        let world = WorldSnapshot::new(&track, &traffic, &[], None, false);

        let output = run(&thief, &world);

        assert!(output.acceleration <= -0.9);
        assert!(speed_delta(output.acceleration, &thief) < 0.0);
    }

    #[test]
    fn blocked_lane_triggers_lane_change() {
        let track = Track::default();
        let mut thief = Vehicle::new(&VehiclePars::default_thief(), &track);
        thief.speed = 4.0;
        thief.x = track.lane_center_x(0);
        let traffic = vec![TrafficCar::new(0, 200.0, 3.0, &track)];
        let world = WorldSnapshot::new(&track, &traffic, &[], None, false);

        let output = run(&thief, &world);

        assert!(output.lane_change_confidence > 60.0);
        assert_eq!(output.target_lane, 1);
    }

    #[test]
    fn side_collision_vetoes_lane_change() {
        let track = Track::default();
        let mut thief = Vehicle::new(&VehiclePars::default_thief(), &track);
        thief.speed = 4.0;
        thief.x = track.lane_center_x(0);
        let traffic = vec![
            TrafficCar::new(0, 200.0, 3.0, &track),
            TrafficCar::new(1, 30.0, 3.0, &track),
        ];
        let world = WorldSnapshot::new(&track, &traffic, &[], None, false);

        let output = run(&thief, &world);

        assert_relative_eq!(output.lane_change_confidence, 0.0);
        assert_eq!(output.target_lane, 0);
    }

    #[test]
    fn outputs_stay_bounded() {
        let track = Track::default();
        let pars = VehiclePars::default_police();
        let thief = Vehicle::new(&VehiclePars::default_thief(), &track);
        let opponent = OpponentView::from_vehicle(&thief, &track);

        for &speed in [0.0, 2.5, 5.0, 8.0].iter() {
            for &gap in [10.0, 90.0, 250.0, 700.0, 2000.0].iter() {
                let mut police = Vehicle::new(&pars, &track);
                police.speed = speed;
                let traffic = vec![
                    TrafficCar::new(1, police.distance + gap, 2.0, &track),
                    TrafficCar::new(0, police.distance + gap / 2.0, 3.0, &track),
                ];
                let world = WorldSnapshot::new(&track, &traffic, &[], Some(opponent), false);
                let output = run(&police, &world);

                assert!(output.acceleration >= -1.0 && output.acceleration <= 1.0);
                assert!(output.lane_change_confidence >= 0.0);
                assert!(output.lane_change_confidence <= 100.0);
            }
        }
    }
}
