use crate::core::chase::{Chase, TICKS_PER_SECOND};
use crate::core::vehicle::Vehicle;
use crate::decision::Controller;
use crate::interfaces::observer_interface::{
    ChaseState, RgbColor, VehicleState, MAX_OBSERVER_UPDATE_FREQUENCY,
};
use crate::post::chase_result::ChaseResult;
use crate::pre::read_sim_pars::SimPars;
use anyhow::Context;
use css_color_parser;
use flume::Sender;
use std::thread::sleep;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// handle_chase creates and simulates a chase on the basis of the inserted parameters, and
/// returns the result for post-processing. If a sender is inserted, the chase runs in real-time
/// and streams its state to the observer on the other end of the channel.
pub fn handle_chase(
    sim_pars: &SimPars,
    seed: u64,
    max_ticks: Option<u64>,
    print_debug: bool,
    record_trace: bool,
    tx: Option<&Sender<ChaseState>>,
    realtime_factor: f64,
) -> anyhow::Result<ChaseResult> {
    // paced chases bound the search by wall-clock time
    let mut decision_pars = sim_pars.decision_pars.to_owned();
    if tx.is_some() {
        decision_pars.minimax.node_budget = None;
    }

    let mut chase = Chase::new(
        &sim_pars.track_pars,
        &sim_pars.thief_pars,
        &sim_pars.police_pars,
        &sim_pars.traffic_pars,
        &sim_pars.powerup_pars,
        &decision_pars,
        seed,
    );
    chase.max_ticks = max_ticks;
    chase.record_trace = record_trace;

    let tx = match tx {
        Some(tx) => tx,
        None => {
            while !chase.get_finished() {
                chase.simulate_timestep();
                if print_debug && chase.cur_tick % TICKS_PER_SECOND as u64 == 0 {
                    log_progress(&chase);
                }
            }
            return Ok(chase.get_chase_result());
        }
    };

    // real-time simulation for an observer
    let timestep_ms = 1000.0 / TICKS_PER_SECOND as f64;
    let ticks_per_update =
        ((TICKS_PER_SECOND as f64 / MAX_OBSERVER_UPDATE_FREQUENCY).round() as u64).max(1);

    while !chase.get_finished() {
        let t_start = Instant::now();
        chase.simulate_timestep();

        if chase.cur_tick % TICKS_PER_SECOND as u64 == 0 {
            log_progress(&chase);
        }

        if chase.cur_tick % ticks_per_update == 0 {
            let chase_state = ChaseState {
                tick: chase.cur_tick,
                vehicle_states: vec![
                    vehicle_state(&chase.thief, chase.last_controllers.0)?,
                    vehicle_state(&chase.police, chase.last_controllers.1)?,
                ],
                active_effects: chase.effects.active(),
                no_traffic_cars: chase.traffic.len(),
                final_result: None,
            };

            tx.send(chase_state)
                .context("Failed to send chase state to observer!")?;
        }

        // sleep until the tick is finished in real-time as well (calculation in ms)
        let t_sleep = (timestep_ms / realtime_factor) as i64 - t_start.elapsed().as_millis() as i64;

        if t_sleep > 0 {
            sleep(Duration::from_millis(t_sleep as u64));
        } else {
            warn!(tick = chase.cur_tick, "could not keep up with real-time");
        }
    }

    // after the real-time loop finishes, send the final result once
    let result = chase.get_chase_result();
    let final_msg = ChaseState {
        tick: chase.cur_tick,
        vehicle_states: vec![],
        active_effects: vec![],
        no_traffic_cars: chase.traffic.len(),
        final_result: Some(result.to_owned()),
    };
    tx.send(final_msg)
        .context("Failed to send final chase result to observer!")?;

    Ok(result)
}

fn vehicle_state(vehicle: &Vehicle, controller: Controller) -> anyhow::Result<VehicleState> {
    let tmp_color = vehicle
        .color
        .parse::<css_color_parser::Color>()
        .context(format!("Could not parse hex color {}!", vehicle.color))?;

    Ok(VehicleState {
        role: vehicle.role,
        color: RgbColor {
            r: tmp_color.r,
            g: tmp_color.g,
            b: tmp_color.b,
        },
        x: vehicle.x,
        distance: vehicle.distance,
        speed: vehicle.speed,
        crashed: vehicle.crashed,
        controller,
    })
}

fn log_progress(chase: &Chase) {
    debug!(
        tick = chase.cur_tick,
        thief_distance = chase.thief.distance,
        police_distance = chase.police.distance,
        gap = chase.thief.distance - chase.police.distance,
        thief_controller = %chase.last_controllers.0,
        police_controller = %chase.last_controllers.1,
        "simulating..."
    );
}
