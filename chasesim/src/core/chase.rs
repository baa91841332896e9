use crate::core::powerup::{spawn_powerups, PowerUp, PowerUpKind, PowerUpPars};
use crate::core::track::{Track, TrackPars};
use crate::core::traffic::{refresh_traffic, spawn_initial_traffic, TrafficCar, TrafficPars};
use crate::core::vehicle::{Role, Vehicle, VehiclePars};
use crate::core::world::{is_capture, OpponentView, WorldSnapshot};
use crate::decision::arbiter::{DecisionArbiter, DecisionPars};
use crate::decision::Controller;
use crate::post::chase_result::{
    ChaseEvent, ChaseEventKind, ChaseResult, RoleStats, TickRecord, Winner,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

/// Fixed tick rate of the simulation.
pub const TICKS_PER_SECOND: u32 = 60;

/// (units) A vehicle crashes if its center is closer than this to a traffic car's center.
pub const COLLISION_RADIUS: f64 = 55.0;

/// (units) A roadblock is placed this far ahead of the thief when the police collects it.
const ROADBLOCK_AHEAD: f64 = 300.0;

/// (units) Longitudinal half-length of a roadblock.
const ROADBLOCK_HALF_LENGTH: f64 = 100.0;

const BOOST_FACTOR: f64 = 1.5;
const EMP_FACTOR: f64 = 0.5;
const TURBO_FACTOR: f64 = 1.5;

/// Spike decays the thief's speed by this amount per tick down to the given fraction of its
/// speed limit.
const SPIKE_DECAY: f64 = 0.1;
const SPIKE_FLOOR: f64 = 0.6;

/// (px/tick) Lateral pull of the magnet and the lateral offset below which it stops pulling.
const MAGNET_PULL: f64 = 2.0;
const MAGNET_DEADBAND: f64 = 10.0;

const NO_KINDS: usize = 9;

/// EffectTimers holds the remaining duration (ticks) of every power-up effect.
#[derive(Debug, Clone, Default)]
pub struct EffectTimers {
    remaining: [u32; NO_KINDS],
}

impl EffectTimers {
    /// The method (re)starts the effect with its full duration.
    pub fn activate(&mut self, kind: PowerUpKind) {
        self.remaining[kind as usize] = kind.duration_ticks();
    }

    pub fn is_active(&self, kind: PowerUpKind) -> bool {
        self.remaining[kind as usize] > 0
    }

    pub fn remaining(&self, kind: PowerUpKind) -> u32 {
        self.remaining[kind as usize]
    }

    /// The method counts all running effects down by one tick.
    pub fn tick(&mut self) {
        for remaining in self.remaining.iter_mut() {
            *remaining = remaining.saturating_sub(1);
        }
    }

    /// Returns the active effects together with their remaining ticks.
    pub fn active(&self) -> Vec<(PowerUpKind, u32)> {
        ALL_KINDS
            .iter()
            .filter(|&&kind| self.is_active(kind))
            .map(|&kind| (kind, self.remaining(kind)))
            .collect()
    }
}

const ALL_KINDS: [PowerUpKind; NO_KINDS] = [
    PowerUpKind::Freeze,
    PowerUpKind::Boost,
    PowerUpKind::Shield,
    PowerUpKind::Ghost,
    PowerUpKind::Spike,
    PowerUpKind::Emp,
    PowerUpKind::Turbo,
    PowerUpKind::Roadblock,
    PowerUpKind::Magnet,
];

/// Roadblock placed by the police. It blocks one lane around a fixed distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roadblock {
    pub lane: usize,
    pub distance: f64,
}

impl Roadblock {
    pub fn blocks(&self, lane: usize, distance: f64) -> bool {
        lane == self.lane && (distance - self.distance).abs() < ROADBLOCK_HALF_LENGTH
    }
}

#[derive(Debug)]
pub struct Chase {
    pub seed: u64,
    pub cur_tick: u64,
    pub max_ticks: Option<u64>,
    pub record_trace: bool,
    pub track: Track,
    pub thief: Vehicle,
    pub police: Vehicle,
    pub traffic: Vec<TrafficCar>,
    pub powerups: Vec<PowerUp>,
    pub effects: EffectTimers,
    pub roadblock: Option<Roadblock>,
    pub last_controllers: (Controller, Controller),
    traffic_pars: TrafficPars,
    powerup_pars: PowerUpPars,
    thief_arbiter: DecisionArbiter,
    police_arbiter: DecisionArbiter,
    rng: StdRng,
    events: Vec<ChaseEvent>,
    thief_stats: RoleStats,
    police_stats: RoleStats,
    trace: Vec<TickRecord>,
    winner: Option<Winner>,
    finished: bool,
}

impl Chase {
    pub fn new(
        track_pars: &TrackPars,
        thief_pars: &VehiclePars,
        police_pars: &VehiclePars,
        traffic_pars: &TrafficPars,
        powerup_pars: &PowerUpPars,
        decision_pars: &DecisionPars,
        seed: u64,
    ) -> Chase {
        let track = Track::new(track_pars);
        let mut rng = StdRng::seed_from_u64(seed);

        let traffic = spawn_initial_traffic(&mut rng, traffic_pars, &track);
        let powerups = spawn_powerups(&mut rng, powerup_pars, &track);

        Chase {
            seed,
            cur_tick: 0,
            max_ticks: None,
            record_trace: false,
            thief: Vehicle::new(thief_pars, &track),
            police: Vehicle::new(police_pars, &track),
            track,
            traffic,
            powerups,
            effects: EffectTimers::default(),
            roadblock: None,
            last_controllers: (Controller::Idle, Controller::Idle),
            traffic_pars: traffic_pars.to_owned(),
            powerup_pars: powerup_pars.to_owned(),
            thief_arbiter: DecisionArbiter::from_pars(decision_pars),
            police_arbiter: DecisionArbiter::from_pars(decision_pars),
            rng,
            events: vec![],
            thief_stats: RoleStats::default(),
            police_stats: RoleStats::default(),
            trace: vec![],
            winner: None,
            finished: false,
        }
    }

    // ---------------------------------------------------------------------------------------------
    // MAIN METHOD ---------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// The method simulates one tick of the chase.
    pub fn simulate_timestep(&mut self) {
        if self.finished {
            return;
        }
        self.cur_tick += 1;

        // effects and speed caps
        self.effects.tick();
        if !self.effects.is_active(PowerUpKind::Roadblock) {
            self.roadblock = None;
        }
        self.apply_speed_caps();

        // thief decides and moves
        let thief_controller = self.decide_thief();
        self.thief.advance();

        // police decides (unless frozen) and moves
        let police_controller = if self.effects.is_active(PowerUpKind::Freeze) {
            self.police.speed = 0.0;
            Controller::Idle
        } else {
            self.decide_police()
        };
        self.police.advance();

        self.thief_stats.record_controller(thief_controller);
        self.police_stats.record_controller(police_controller);
        self.last_controllers = (thief_controller, police_controller);

        // power-up pickups
        self.collect_powerups(Role::Thief);
        self.collect_powerups(Role::Police);
        self.apply_police_effects();

        // traffic
        for car in self.traffic.iter_mut() {
            car.update();
        }
        self.check_roadblock();
        self.check_traffic_collision(Role::Thief);
        self.check_traffic_collision(Role::Police);
        self.thief.update_crash();
        self.police.update_crash();

        let no_spawned = refresh_traffic(
            &mut self.rng,
            &mut self.traffic,
            self.thief.distance,
            &self.traffic_pars,
            &self.track,
        );
        if no_spawned > 0 {
            debug!(tick = self.cur_tick, no_spawned, "spawned traffic cars");
        }

        if self.record_trace {
            self.trace.push(TickRecord {
                tick: self.cur_tick,
                thief_x: self.thief.x,
                thief_distance: self.thief.distance,
                thief_speed: self.thief.speed,
                thief_controller,
                police_x: self.police.x,
                police_distance: self.police.distance,
                police_speed: self.police.speed,
                police_controller,
            });
        }

        self.check_chase_end();
    }

    // ---------------------------------------------------------------------------------------------
    // DECISIONS -----------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    fn decide_thief(&mut self) -> Controller {
        let opponent = OpponentView::from_vehicle(&self.police, &self.track);
        let world = WorldSnapshot::new(
            &self.track,
            &self.traffic,
            &self.powerups,
            Some(opponent),
            self.thief.ghost_active,
        );
        self.thief_arbiter.decide(&mut self.thief, &world).controller
    }

    fn decide_police(&mut self) -> Controller {
        let opponent = OpponentView::from_vehicle(&self.thief, &self.track);
        let world = WorldSnapshot::new(
            &self.track,
            &self.traffic,
            &self.powerups,
            Some(opponent),
            false,
        );
        self.police_arbiter.decide(&mut self.police, &world).controller
    }

    // ---------------------------------------------------------------------------------------------
    // EFFECTS -------------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// The method updates the speed limits and the effect flags of both vehicles from the active
    /// effects.
    fn apply_speed_caps(&mut self) {
        let mut thief_multiplier = 1.0;
        if self.effects.is_active(PowerUpKind::Boost) {
            thief_multiplier *= BOOST_FACTOR;
        }
        if self.effects.is_active(PowerUpKind::Emp) {
            thief_multiplier *= EMP_FACTOR;
        }
        self.thief.set_speed_multiplier(thief_multiplier);
        self.thief.shield_active = self.effects.is_active(PowerUpKind::Shield);
        self.thief.ghost_active = self.effects.is_active(PowerUpKind::Ghost);
        self.thief.clamp_state(&self.track);

        let police_multiplier = if self.effects.is_active(PowerUpKind::Turbo) {
            TURBO_FACTOR
        } else {
            1.0
        };
        self.police.set_speed_multiplier(police_multiplier);
        self.police.clamp_state(&self.track);
    }

    fn collect_powerups(&mut self, role: Role) {
        let (x, distance) = match role {
            Role::Thief => (self.thief.x, self.thief.distance),
            Role::Police => (self.police.x, self.police.distance),
        };
        let pickup_radius = self.powerup_pars.pickup_radius;

        let mut collected = vec![];
        for powerup in self.powerups.iter_mut() {
            if powerup.available_for(role)
                && powerup.touches(x, distance, pickup_radius, &self.track)
                && powerup.collect()
            {
                collected.push(powerup.kind);
            }
        }

        for kind in collected {
            self.activate_effect(role, kind, distance);
        }
    }

    fn activate_effect(&mut self, role: Role, kind: PowerUpKind, distance: f64) {
        self.effects.activate(kind);

        match kind {
            PowerUpKind::Roadblock => {
                self.roadblock = Some(Roadblock {
                    lane: self.thief.lane(&self.track),
                    distance: self.thief.distance + ROADBLOCK_AHEAD,
                });
            }
            PowerUpKind::Freeze => self.police.speed = 0.0,
            _ => {}
        }
        self.apply_speed_caps();

        self.stats_mut(role).powerups_collected += 1;
        self.push_event(Some(role), ChaseEventKind::PowerUpCollected(kind), distance);
        info!(tick = self.cur_tick, %role, %kind, distance, "power-up collected");
    }

    /// Magnet pulls the thief toward the police, spike slows it down.
    fn apply_police_effects(&mut self) {
        if self.effects.is_active(PowerUpKind::Magnet) {
            let dx = self.police.x - self.thief.x;
            if dx.abs() > MAGNET_DEADBAND {
                self.thief.x += MAGNET_PULL * dx.signum();
            }
        }

        if self.effects.is_active(PowerUpKind::Spike) {
            let floor = SPIKE_FLOOR * self.thief.speed_limit();
            if self.thief.speed > floor {
                self.thief.speed = (self.thief.speed - SPIKE_DECAY).max(floor);
            }
        }

        self.thief.clamp_state(&self.track);
    }

    // ---------------------------------------------------------------------------------------------
    // COLLISIONS ----------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    fn check_roadblock(&mut self) {
        let roadblock = match self.roadblock {
            Some(roadblock) => roadblock,
            None => return,
        };
        if self.thief.crashed || self.thief.ghost_active {
            return;
        }

        if roadblock.blocks(self.thief.lane(&self.track), self.thief.distance) {
            self.thief.crash();
            self.thief_stats.crashes += 1;
            self.roadblock = None;
            self.push_event(Some(Role::Thief), ChaseEventKind::Roadblock, self.thief.distance);
            info!(tick = self.cur_tick, distance = self.thief.distance, "thief hit the roadblock");
        }
    }

    fn check_traffic_collision(&mut self, role: Role) {
        let vehicle = match role {
            Role::Thief => &self.thief,
            Role::Police => &self.police,
        };
        if vehicle.crashed || vehicle.ghost_active {
            return;
        }

        let (x, distance) = (vehicle.x, vehicle.distance);
        let hit = self.traffic.iter().any(|car| {
            let dx = car.x - x;
            let dd = car.distance - distance;
            (dx * dx + dd * dd).sqrt() < COLLISION_RADIUS
        });
        if !hit {
            return;
        }

        if vehicle.shield_active {
            debug!(tick = self.cur_tick, %role, distance, "shield absorbed a traffic collision");
            return;
        }

        match role {
            Role::Thief => self.thief.crash(),
            Role::Police => self.police.crash(),
        }
        self.stats_mut(role).crashes += 1;
        self.push_event(Some(role), ChaseEventKind::Crash, distance);
        info!(tick = self.cur_tick, %role, distance, "crash with traffic");
    }

    // ---------------------------------------------------------------------------------------------
    // CHASE END -----------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    fn check_chase_end(&mut self) {
        if is_capture(self.police.distance, self.thief.distance) {
            self.winner = Some(Winner::Police);
            self.finished = true;
            self.push_event(Some(Role::Police), ChaseEventKind::Capture, self.police.distance);
            info!(
                tick = self.cur_tick,
                thief_distance = self.thief.distance,
                police_distance = self.police.distance,
                "thief captured"
            );
        } else if self.thief.distance >= self.track.finish_distance {
            self.winner = Some(Winner::Thief);
            self.finished = true;
            self.push_event(Some(Role::Thief), ChaseEventKind::Finish, self.thief.distance);
            info!(tick = self.cur_tick, "thief reached the finish");
        } else if self.max_ticks.map_or(false, |max_ticks| self.cur_tick >= max_ticks) {
            self.finished = true;
            self.push_event(None, ChaseEventKind::TickLimit, self.thief.distance);
            info!(tick = self.cur_tick, "tick limit reached without a winner");
        }
    }

    fn push_event(&mut self, role: Option<Role>, kind: ChaseEventKind, distance: f64) {
        self.events.push(ChaseEvent {
            tick: self.cur_tick,
            role,
            kind,
            distance,
        });
    }

    fn stats_mut(&mut self, role: Role) -> &mut RoleStats {
        match role {
            Role::Thief => &mut self.thief_stats,
            Role::Police => &mut self.police_stats,
        }
    }

    // ---------------------------------------------------------------------------------------------
    // METHODS (GETTERS) ---------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    pub fn get_finished(&self) -> bool {
        self.finished
    }

    pub fn get_winner(&self) -> Option<Winner> {
        self.winner
    }

    pub fn get_events(&self) -> &[ChaseEvent] {
        &self.events
    }

    pub fn get_chase_result(&self) -> ChaseResult {
        ChaseResult {
            seed: self.seed,
            winner: self.winner,
            ticks: self.cur_tick,
            thief_distance: self.thief.distance,
            police_distance: self.police.distance,
            finish_distance: self.track.finish_distance,
            thief: self.thief_stats.to_owned(),
            police: self.police_stats.to_owned(),
            events: self.events.to_owned(),
            trace: self.trace.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn empty_chase() -> Chase {
        let traffic_pars = TrafficPars {
            no_cars: 0,
            ..TrafficPars::default()
        };
        let powerup_pars = PowerUpPars {
            no_thief_powerups: 0,
            no_police_powerups: 0,
            ..PowerUpPars::default()
        };
        Chase::new(
            &TrackPars::default(),
            &VehiclePars::default_thief(),
            &VehiclePars::default_police(),
            &traffic_pars,
            &powerup_pars,
            &DecisionPars::default(),
            1,
        )
    }

    #[test]
    fn effect_timers_count_down() {
        let mut effects = EffectTimers::default();
        effects.activate(PowerUpKind::Freeze);
        assert_eq!(effects.remaining(PowerUpKind::Freeze), 180);
        effects.tick();
        assert_eq!(effects.remaining(PowerUpKind::Freeze), 179);
        assert_eq!(effects.active(), vec![(PowerUpKind::Freeze, 179)]);

        for _ in 0..179 {
            effects.tick();
        }
        assert!(!effects.is_active(PowerUpKind::Freeze));
        assert!(effects.active().is_empty());
    }

    #[test]
    fn boost_and_emp_scale_thief_limit() {
        let mut chase = empty_chase();
        chase.effects.activate(PowerUpKind::Boost);
        chase.apply_speed_caps();
        assert_relative_eq!(chase.thief.speed_limit(), 12.0);

        chase.effects.activate(PowerUpKind::Emp);
        chase.apply_speed_caps();
        assert_relative_eq!(chase.thief.speed_limit(), 6.0);
        assert_relative_eq!(chase.police.speed_limit(), 8.0);
    }

    #[test]
    fn spike_never_raises_speed() {
        let mut chase = empty_chase();
        chase.effects.activate(PowerUpKind::Spike);
        chase.thief.speed = 8.0;
        chase.apply_police_effects();
        assert_relative_eq!(chase.thief.speed, 7.9, epsilon = 1e-9);

        chase.thief.speed = 2.0;
        chase.apply_police_effects();
        assert_relative_eq!(chase.thief.speed, 2.0);
    }

    #[test]
    fn magnet_pulls_thief_toward_police() {
        let mut chase = empty_chase();
        chase.effects.activate(PowerUpKind::Magnet);
        chase.police.x = chase.track.lane_center_x(0);
        let x_before = chase.thief.x;
        chase.apply_police_effects();
        assert_relative_eq!(chase.thief.x, x_before - 2.0);
    }

    #[test]
    fn freeze_keeps_police_standing() {
        let mut chase = empty_chase();
        chase.effects.activate(PowerUpKind::Freeze);
        for _ in 0..10 {
            chase.simulate_timestep();
        }
        assert_relative_eq!(chase.police.speed, 0.0);
        assert_relative_eq!(chase.police.distance, -300.0);
        assert_eq!(chase.last_controllers.1, Controller::Idle);
    }

    #[test]
    fn traffic_collision_crashes_unless_shielded() {
        let mut chase = empty_chase();
        chase.thief.speed = 5.0;
        chase.traffic.push(TrafficCar::new(1, 20.0, 2.0, &chase.track));

        chase.effects.activate(PowerUpKind::Shield);
        chase.apply_speed_caps();
        chase.check_traffic_collision(Role::Thief);
        assert!(!chase.thief.crashed);

        chase.effects = EffectTimers::default();
        chase.apply_speed_caps();
        chase.check_traffic_collision(Role::Thief);
        assert!(chase.thief.crashed);
        assert_relative_eq!(chase.thief.speed, 1.5, epsilon = 1e-9);
        assert_eq!(chase.get_chase_result().thief.crashes, 1);
    }

    #[test]
    fn roadblock_crashes_thief_in_blocked_lane() {
        let mut chase = empty_chase();
        chase.activate_effect(Role::Police, PowerUpKind::Roadblock, -300.0);
        let roadblock = chase.roadblock.unwrap();
        assert_eq!(roadblock.lane, 1);
        assert_relative_eq!(roadblock.distance, 300.0);

        chase.thief.distance = 250.0;
        chase.check_roadblock();
        assert!(chase.thief.crashed);
        assert!(chase.roadblock.is_none());
        assert_eq!(chase.get_events().last().unwrap().kind, ChaseEventKind::Roadblock);
    }

    #[test]
    fn pickup_collects_once_and_activates_effect() {
        let mut chase = empty_chase();
        chase.powerups.push(PowerUp::new(1, 0.0, PowerUpKind::Boost));
        chase.powerups.push(PowerUp::new(1, 10.0, PowerUpKind::Emp));

        chase.collect_powerups(Role::Thief);
        chase.collect_powerups(Role::Thief);

        assert!(chase.effects.is_active(PowerUpKind::Boost));
        assert!(!chase.effects.is_active(PowerUpKind::Emp));
        assert_eq!(chase.get_chase_result().thief.powerups_collected, 1);
    }

    #[test]
    fn capture_ends_chase() {
        let mut chase = empty_chase();
        chase.police.distance = chase.thief.distance - 10.0;
        chase.simulate_timestep();
        assert!(chase.get_finished());
        assert_eq!(chase.get_winner(), Some(Winner::Police));

        let tick = chase.cur_tick;
        chase.simulate_timestep();
        assert_eq!(chase.cur_tick, tick);
    }

    #[test]
    fn tick_limit_ends_without_winner() {
        let mut chase = empty_chase();
        chase.max_ticks = Some(5);
        while !chase.get_finished() {
            chase.simulate_timestep();
        }
        assert_eq!(chase.cur_tick, 5);
        assert_eq!(chase.get_winner(), None);
        assert_eq!(chase.get_events().last().unwrap().kind, ChaseEventKind::TickLimit);
    }
}
