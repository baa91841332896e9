use crate::core::powerup::PowerUp;
use crate::core::track::Track;
use crate::core::traffic::TrafficCar;
use crate::core::vehicle::{Role, Vehicle};

/// (units) The police catches the thief once it is closer than this behind it, or ahead of it.
pub const CAPTURE_MARGIN: f64 = 30.0;

/// is_capture is the single capture predicate shared by the chase loop and the adversarial
/// search. Overtaking the thief counts as a capture as well.
pub fn is_capture(police_distance: f64, thief_distance: f64) -> bool {
    police_distance >= thief_distance - CAPTURE_MARGIN
}

/// Kinematic view of the opposing vehicle, copied once per tick.
#[derive(Debug, Clone, Copy)]
pub struct OpponentView {
    pub role: Role,
    pub x: f64,
    pub lane: usize,
    pub distance: f64,
    pub speed: f64,
    /// Current speed limit including active power-up multipliers.
    pub speed_limit: f64,
    pub crashed: bool,
}

impl OpponentView {
    pub fn from_vehicle(vehicle: &Vehicle, track: &Track) -> OpponentView {
        OpponentView {
            role: vehicle.role,
            x: vehicle.x,
            lane: vehicle.lane(track),
            distance: vehicle.distance,
            speed: vehicle.speed,
            speed_limit: vehicle.speed_limit(),
            crashed: vehicle.crashed,
        }
    }
}

/// WorldSnapshot is the read-only view of one tick that every decision algorithm receives.
#[derive(Debug, Clone, Copy)]
pub struct WorldSnapshot<'a> {
    pub track: &'a Track,
    pub traffic: &'a [TrafficCar],
    pub powerups: &'a [PowerUp],
    pub opponent: Option<OpponentView>,
    pub ghost_mode: bool,
}

impl<'a> WorldSnapshot<'a> {
    pub fn new(
        track: &'a Track,
        traffic: &'a [TrafficCar],
        powerups: &'a [PowerUp],
        opponent: Option<OpponentView>,
        ghost_mode: bool,
    ) -> WorldSnapshot<'a> {
        WorldSnapshot {
            track,
            traffic,
            powerups,
            opponent,
            ghost_mode,
        }
    }

    pub fn cars_in_lane(&self, lane: usize) -> impl Iterator<Item = &'a TrafficCar> {
        let traffic: &'a [TrafficCar] = self.traffic;
        traffic.iter().filter(move |car| car.lane == lane)
    }

    /// The method returns the smallest gap to a traffic car ahead of `distance` in the given
    /// lane within `window`, or infinity if the lane is clear. Cars overlapping the reference
    /// position (gap down to -`overlap`) count as gap 0.
    pub fn gap_ahead(&self, lane: usize, distance: f64, window: f64, overlap: f64) -> f64 {
        self.cars_in_lane(lane)
            .map(|car| car.distance - distance)
            .filter(|&gap| gap > -overlap && gap < window)
            .fold(f64::INFINITY, |min_gap, gap| min_gap.min(gap.max(0.0)))
    }

    /// The method counts traffic cars ahead of `distance` in the given lane within `window`.
    pub fn cars_ahead(&self, lane: usize, distance: f64, window: f64) -> usize {
        self.cars_in_lane(lane)
            .filter(|car| {
                let gap = car.distance - distance;
                gap > 0.0 && gap < window
            })
            .count()
    }

    /// The method counts traffic cars in all lanes within [distance - behind, distance + ahead].
    pub fn traffic_density(&self, distance: f64, behind: f64, ahead: f64) -> usize {
        self.traffic
            .iter()
            .filter(|car| {
                let gap = car.distance - distance;
                gap > -behind && gap < ahead
            })
            .count()
    }

    /// The method iterates over power-ups still available for the given role.
    pub fn powerups_for(&self, role: Role) -> impl Iterator<Item = &'a PowerUp> {
        let powerups: &'a [PowerUp] = self.powerups;
        powerups
            .iter()
            .filter(move |powerup| powerup.available_for(role))
    }

    /// Signed longitudinal gap to the opponent (positive if the opponent is ahead).
    pub fn opponent_gap(&self, distance: f64) -> Option<f64> {
        self.opponent.map(|opp| opp.distance - distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::powerup::PowerUpKind;
    use approx::assert_relative_eq;

    #[test]
    fn gap_ahead_ignores_other_lanes_and_cars_behind() {
        let track = Track::default();
        let traffic = vec![
            TrafficCar::new(1, 400.0, 2.0, &track),
            TrafficCar::new(1, 250.0, 2.0, &track),
            TrafficCar::new(1, 50.0, 2.0, &track),
            TrafficCar::new(0, 120.0, 2.0, &track),
        ];
        let world = WorldSnapshot::new(&track, &traffic, &[], None, false);

        assert_relative_eq!(world.gap_ahead(1, 100.0, 1000.0, 0.0), 150.0);
        assert_relative_eq!(world.gap_ahead(1, 60.0, 1000.0, 20.0), 0.0);
        assert!(world.gap_ahead(2, 100.0, 1000.0, 0.0).is_infinite());
        assert_eq!(world.cars_ahead(1, 100.0, 400.0), 2);
        assert_eq!(world.traffic_density(100.0, 100.0, 200.0), 3);
    }

    #[test]
    fn capture_covers_proximity_and_overtake() {
        assert!(is_capture(970.0, 1000.0));
        assert!(is_capture(1200.0, 1000.0));
        assert!(!is_capture(969.0, 1000.0));
    }

    #[test]
    fn powerups_are_filtered_by_role() {
        let track = Track::default();
        let mut powerups = vec![
            PowerUp::new(0, 500.0, PowerUpKind::Boost),
            PowerUp::new(1, 700.0, PowerUpKind::Emp),
            PowerUp::new(2, 900.0, PowerUpKind::Freeze),
        ];
        powerups[2].collect();
        let world = WorldSnapshot::new(&track, &[], &powerups, None, false);

        assert_eq!(world.powerups_for(Role::Thief).count(), 1);
        assert_eq!(world.powerups_for(Role::Police).count(), 1);
        assert!(world.opponent_gap(0.0).is_none());
    }
}
