use crate::core::track::{Track, NO_LANES};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::Deserialize;

/// * `no_cars` - Number of traffic cars kept alive on the track
/// * `speed_min` - (units/tick) Lower bound of the traffic speed distribution
/// * `speed_max` - (units/tick) Upper bound of the traffic speed distribution
/// * `initial_margin` - (units) Distance kept free behind the start and before the finish when
/// placing the initial population
/// * `respawn_ahead` - (units) [min, max] distance ahead of the thief where new cars appear
/// * `cull_behind` - (units) Cars further than this behind the thief are removed
/// * `colors` - CSS hex colors picked at random for new cars
#[derive(Debug, Deserialize, Clone)]
pub struct TrafficPars {
    pub no_cars: usize,
    pub speed_min: f64,
    pub speed_max: f64,
    pub initial_margin: f64,
    pub respawn_ahead: [f64; 2],
    pub cull_behind: f64,
    pub colors: Vec<String>,
}

impl Default for TrafficPars {
    fn default() -> Self {
        TrafficPars {
            no_cars: 50,
            speed_min: 2.0,
            speed_max: 4.0,
            initial_margin: 500.0,
            respawn_ahead: [1000.0, 2000.0],
            cull_behind: 500.0,
            colors: vec![
                String::from("#dc143c"),
                String::from("#1e90ff"),
                String::from("#228b22"),
                String::from("#ff8c00"),
                String::from("#8a2be2"),
                String::from("#ffd700"),
                String::from("#dcdcdc"),
            ],
        }
    }
}

/// TrafficCar is a lane-bound obstacle. Its speed is a magnitude; traffic moves toward
/// decreasing distance, i.e. against the direction of the chase.
#[derive(Debug, Clone)]
pub struct TrafficCar {
    pub lane: usize,
    pub x: f64,
    pub distance: f64,
    pub speed: f64,
    pub color: String,
}

impl TrafficCar {
    pub fn new(lane: usize, distance: f64, speed: f64, track: &Track) -> TrafficCar {
        TrafficCar {
            lane,
            x: track.lane_center_x(lane),
            distance,
            speed,
            color: String::from("#dcdcdc"),
        }
    }

    /// Signed longitudinal velocity along the track coordinate.
    pub fn velocity(&self) -> f64 {
        -self.speed
    }

    /// Projected longitudinal position after the given number of ticks.
    pub fn distance_after(&self, ticks: f64) -> f64 {
        self.distance + self.velocity() * ticks.max(0.0)
    }

    pub fn update(&mut self) {
        self.distance += self.velocity();
    }
}

fn spawn_car<R: Rng>(
    rng: &mut R,
    distance: f64,
    traffic_pars: &TrafficPars,
    track: &Track,
) -> TrafficCar {
    let lane = rng.gen_range(0..NO_LANES);
    let speed = if traffic_pars.speed_max > traffic_pars.speed_min {
        Uniform::new(traffic_pars.speed_min, traffic_pars.speed_max).sample(rng)
    } else {
        traffic_pars.speed_min
    };

    let mut car = TrafficCar::new(lane, distance, speed, track);
    if !traffic_pars.colors.is_empty() {
        car.color = traffic_pars.colors[rng.gen_range(0..traffic_pars.colors.len())].to_owned();
    }
    car
}

/// spawn_initial_traffic scatters the configured population over the whole track.
pub fn spawn_initial_traffic<R: Rng>(
    rng: &mut R,
    traffic_pars: &TrafficPars,
    track: &Track,
) -> Vec<TrafficCar> {
    let lo = traffic_pars.initial_margin;
    let hi = track.finish_distance - traffic_pars.initial_margin;

    (0..traffic_pars.no_cars)
        .map(|_| {
            let distance = if hi > lo { rng.gen_range(lo..hi) } else { lo };
            spawn_car(rng, distance, traffic_pars, track)
        })
        .collect()
}

/// refresh_traffic removes cars far behind the reference position and tops the population up
/// with cars spawned ahead of it. Spawning stops as soon as a car would land beyond the finish.
/// Returns the number of spawned cars.
pub fn refresh_traffic<R: Rng>(
    rng: &mut R,
    traffic: &mut Vec<TrafficCar>,
    reference_distance: f64,
    traffic_pars: &TrafficPars,
    track: &Track,
) -> usize {
    traffic.retain(|car| car.distance > reference_distance - traffic_pars.cull_behind);

    let [ahead_min, ahead_max] = traffic_pars.respawn_ahead;
    let mut no_spawned = 0;

    while traffic.len() < traffic_pars.no_cars {
        let offset = if ahead_max > ahead_min {
            rng.gen_range(ahead_min..ahead_max)
        } else {
            ahead_min
        };
        let distance = reference_distance + offset;

        if distance >= track.finish_distance {
            break;
        }

        traffic.push(spawn_car(rng, distance, traffic_pars, track));
        no_spawned += 1;
    }

    no_spawned
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn traffic_moves_against_chase_direction() {
        let track = Track::default();
        let mut car = TrafficCar::new(2, 1000.0, 3.0, &track);
        car.update();
        assert_relative_eq!(car.distance, 997.0);
        assert_relative_eq!(car.distance_after(10.0), 967.0);
        assert_relative_eq!(car.x, track.lane_center_x(2));
    }

    #[test]
    fn initial_traffic_respects_margins() {
        let track = Track::default();
        let pars = TrafficPars::default();
        let mut rng = StdRng::seed_from_u64(7);
        let traffic = spawn_initial_traffic(&mut rng, &pars, &track);

        assert_eq!(traffic.len(), pars.no_cars);
        for car in traffic.iter() {
            assert!(car.distance >= 500.0 && car.distance < track.finish_distance - 500.0);
            assert!(car.speed >= 2.0 && car.speed < 4.0);
            assert!(car.lane < NO_LANES);
        }
    }

    #[test]
    fn refresh_culls_and_respawns() {
        let track = Track::default();
        let pars = TrafficPars::default();
        let mut rng = StdRng::seed_from_u64(11);
        let mut traffic = vec![
            TrafficCar::new(0, 100.0, 2.0, &track),
            TrafficCar::new(1, 5000.0, 2.0, &track),
        ];

        let spawned = refresh_traffic(&mut rng, &mut traffic, 1000.0, &pars, &track);

        assert_eq!(traffic.len(), pars.no_cars);
        assert_eq!(spawned, pars.no_cars - 1);
        assert!(traffic.iter().all(|car| car.distance > 500.0));
    }

    #[test]
    fn refresh_stops_at_finish() {
        let track = Track::default();
        let pars = TrafficPars::default();
        let mut rng = StdRng::seed_from_u64(3);
        let mut traffic = Vec::new();

        let spawned = refresh_traffic(
            &mut rng,
            &mut traffic,
            track.finish_distance - 500.0,
            &pars,
            &track,
        );

        assert_eq!(spawned, 0);
        assert!(traffic.is_empty());
    }
}
