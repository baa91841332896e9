use crate::core::powerup::PowerUpKind;
use crate::core::vehicle::Role;
use crate::decision::Controller;
use crate::post::chase_result::ChaseResult;

pub const MAX_OBSERVER_UPDATE_FREQUENCY: f64 = 20.0;

#[derive(Debug, Clone, Default)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Clone)]
pub struct VehicleState {
    pub role: Role,
    pub color: RgbColor,
    pub x: f64,
    pub distance: f64,
    pub speed: f64,
    pub crashed: bool,
    pub controller: Controller,
}

#[derive(Debug, Clone, Default)]
pub struct ChaseState {
    pub tick: u64,
    pub vehicle_states: Vec<VehicleState>,

    // effects with their remaining ticks
    pub active_effects: Vec<(PowerUpKind, u32)>,
    pub no_traffic_cars: usize,

    // final results payload (sent once when the chase ends)
    pub final_result: Option<ChaseResult>,
}
