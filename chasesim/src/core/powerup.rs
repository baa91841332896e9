use crate::core::track::{Track, NO_LANES};
use crate::core::vehicle::Role;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Power-up kinds. The first four are thief-only, the remaining five police-only.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PowerUpKind {
    Freeze,
    Boost,
    Shield,
    Ghost,
    Spike,
    Emp,
    Turbo,
    Roadblock,
    Magnet,
}

pub const THIEF_KINDS: [PowerUpKind; 4] = [
    PowerUpKind::Freeze,
    PowerUpKind::Boost,
    PowerUpKind::Shield,
    PowerUpKind::Ghost,
];

pub const POLICE_KINDS: [PowerUpKind; 5] = [
    PowerUpKind::Spike,
    PowerUpKind::Emp,
    PowerUpKind::Turbo,
    PowerUpKind::Roadblock,
    PowerUpKind::Magnet,
];

impl PowerUpKind {
    /// The role that is allowed to collect this kind.
    pub fn owner(self) -> Role {
        match self {
            PowerUpKind::Freeze | PowerUpKind::Boost | PowerUpKind::Shield | PowerUpKind::Ghost => {
                Role::Thief
            }
            _ => Role::Police,
        }
    }

    /// Desirability weight shared by all decision algorithms.
    pub fn priority(self) -> f64 {
        match self {
            PowerUpKind::Freeze => 15.0,
            PowerUpKind::Shield => 12.0,
            PowerUpKind::Ghost => 11.0,
            PowerUpKind::Boost => 10.0,
            PowerUpKind::Emp => 18.0,
            PowerUpKind::Turbo => 15.0,
            PowerUpKind::Magnet => 14.0,
            PowerUpKind::Spike => 12.0,
            PowerUpKind::Roadblock => 10.0,
        }
    }

    /// Effect duration in ticks (60 ticks per second).
    pub fn duration_ticks(self) -> u32 {
        match self {
            PowerUpKind::Freeze => 180,
            PowerUpKind::Boost => 240,
            PowerUpKind::Shield => 360,
            PowerUpKind::Ghost => 300,
            PowerUpKind::Spike => 240,
            PowerUpKind::Emp => 180,
            PowerUpKind::Turbo => 300,
            PowerUpKind::Roadblock => 420,
            PowerUpKind::Magnet => 240,
        }
    }
}

impl fmt::Display for PowerUpKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            PowerUpKind::Freeze => "freeze",
            PowerUpKind::Boost => "boost",
            PowerUpKind::Shield => "shield",
            PowerUpKind::Ghost => "ghost",
            PowerUpKind::Spike => "spike",
            PowerUpKind::Emp => "emp",
            PowerUpKind::Turbo => "turbo",
            PowerUpKind::Roadblock => "roadblock",
            PowerUpKind::Magnet => "magnet",
        };
        write!(f, "{}", name)
    }
}

/// * `no_thief_powerups` - Number of thief-only power-ups placed at chase start
/// * `no_police_powerups` - Number of police-only power-ups placed at chase start
/// * `spawn_margin` - (units) Distance kept free behind the start and before the finish
/// * `pickup_radius` - (units) Distance between vehicle and power-up centers for a pickup
#[derive(Debug, Deserialize, Clone)]
pub struct PowerUpPars {
    pub no_thief_powerups: usize,
    pub no_police_powerups: usize,
    pub spawn_margin: f64,
    pub pickup_radius: f64,
}

impl Default for PowerUpPars {
    fn default() -> Self {
        PowerUpPars {
            no_thief_powerups: 35,
            no_police_powerups: 25,
            spawn_margin: 1000.0,
            pickup_radius: 47.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PowerUp {
    pub lane: usize,
    pub distance: f64,
    pub kind: PowerUpKind,
    pub priority: f64,
    collected: bool,
}

impl PowerUp {
    pub fn new(lane: usize, distance: f64, kind: PowerUpKind) -> PowerUp {
        PowerUp {
            lane,
            distance,
            kind,
            priority: kind.priority(),
            collected: false,
        }
    }

    pub fn for_police(&self) -> bool {
        self.kind.owner() == Role::Police
    }

    pub fn is_collected(&self) -> bool {
        self.collected
    }

    /// The method checks if the power-up is still available for the given role.
    pub fn available_for(&self, role: Role) -> bool {
        !self.collected && self.kind.owner() == role
    }

    /// One-way transition to collected. Returns false if it was already collected.
    pub fn collect(&mut self) -> bool {
        if self.collected {
            return false;
        }
        self.collected = true;
        true
    }

    /// The method checks if a vehicle at (x, distance) touches this power-up.
    pub fn touches(&self, x: f64, distance: f64, pickup_radius: f64, track: &Track) -> bool {
        let dx = x - track.lane_center_x(self.lane);
        let dd = distance - self.distance;
        (dx * dx + dd * dd).sqrt() < pickup_radius
    }
}

/// spawn_powerups places the configured role-specific power-ups uniformly over the track.
pub fn spawn_powerups<R: Rng>(
    rng: &mut R,
    powerup_pars: &PowerUpPars,
    track: &Track,
) -> Vec<PowerUp> {
    let lo = powerup_pars.spawn_margin;
    let hi = track.finish_distance - powerup_pars.spawn_margin;
    let mut powerups =
        Vec::with_capacity(powerup_pars.no_thief_powerups + powerup_pars.no_police_powerups);

    let place = |rng: &mut R, kinds: &[PowerUpKind]| {
        let lane = rng.gen_range(0..NO_LANES);
        let distance = if hi > lo { rng.gen_range(lo..hi) } else { lo };
        let kind = kinds[rng.gen_range(0..kinds.len())];
        PowerUp::new(lane, distance, kind)
    };

    for _ in 0..powerup_pars.no_thief_powerups {
        powerups.push(place(&mut *rng, &THIEF_KINDS));
    }
    for _ in 0..powerup_pars.no_police_powerups {
        powerups.push(place(&mut *rng, &POLICE_KINDS));
    }

    powerups
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn kinds_are_role_restricted() {
        assert!(THIEF_KINDS.iter().all(|k| k.owner() == Role::Thief));
        assert!(POLICE_KINDS.iter().all(|k| k.owner() == Role::Police));
    }

    #[test]
    fn collect_is_one_way() {
        let mut powerup = PowerUp::new(0, 1500.0, PowerUpKind::Emp);
        assert!(powerup.available_for(Role::Police));
        assert!(!powerup.available_for(Role::Thief));
        assert!(powerup.collect());
        assert!(!powerup.collect());
        assert!(!powerup.available_for(Role::Police));
    }

    #[test]
    fn pickup_uses_radius() {
        let track = Track::default();
        let powerup = PowerUp::new(2, 1000.0, PowerUpKind::Boost);
        assert!(powerup.touches(track.lane_center_x(2), 1030.0, 47.0, &track));
        assert!(!powerup.touches(track.lane_center_x(1), 1000.0, 47.0, &track));
    }

    #[test]
    fn spawn_places_both_roles() {
        let track = Track::default();
        let pars = PowerUpPars::default();
        let mut rng = StdRng::seed_from_u64(5);
        let powerups = spawn_powerups(&mut rng, &pars, &track);

        assert_eq!(powerups.len(), 60);
        assert_eq!(powerups.iter().filter(|p| p.for_police()).count(), 25);
        assert!(powerups
            .iter()
            .all(|p| p.distance >= 1000.0 && p.distance < track.finish_distance - 1000.0));
    }
}
