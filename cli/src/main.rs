use chasesim::core::handle_chase::handle_chase;
use chasesim::interfaces::observer_interface::ChaseState;
use chasesim::post::chase_result::{ChaseResult, Winner};
use chasesim::pre::read_sim_pars::{read_sim_pars, SimPars};
use chasesim::pre::sim_opts::SimOpts;
use clap::Parser;
use rayon::prelude::*;
use std::thread;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// observe_chase logs the states streamed by the real-time chase until the final result arrives.
fn observe_chase(rx: flume::Receiver<ChaseState>) -> Option<ChaseResult> {
    for chase_state in rx.iter() {
        if let Some(result) = chase_state.final_result {
            return Some(result);
        }

        let effects: Vec<String> = chase_state
            .active_effects
            .iter()
            .map(|(kind, remaining)| format!("{}({})", kind, remaining))
            .collect();

        for vehicle_state in chase_state.vehicle_states.iter() {
            info!(
                tick = chase_state.tick,
                role = %vehicle_state.role,
                x = vehicle_state.x,
                distance = vehicle_state.distance,
                speed = vehicle_state.speed,
                crashed = vehicle_state.crashed,
                controller = %vehicle_state.controller,
                color = %format!(
                    "#{:02x}{:02x}{:02x}",
                    vehicle_state.color.r, vehicle_state.color.g, vehicle_state.color.b
                ),
                "vehicle state"
            );
        }
        if !effects.is_empty() {
            info!(tick = chase_state.tick, effects = %effects.join(", "), "active effects");
        }
    }

    None
}

fn main() -> anyhow::Result<()> {
    // PRE-PROCESSING ------------------------------------------------------------------------------
    // get simulation options from the command line arguments
    let sim_opts: SimOpts = SimOpts::parse();

    // RUST_LOG takes precedence over the debug flag
    let default_level = if sim_opts.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if sim_opts.no_sim_runs == 0 {
        anyhow::bail!("Number of simulation runs must be at least 1!");
    }

    // get simulation parameters
    let sim_pars = if let Some(parfile_path) = &sim_opts.parfile_path {
        info!("Reading simulation parameters from {}", parfile_path.display());
        read_sim_pars(parfile_path)?
    } else {
        info!("No parameter file given, using the default chase");
        SimPars::default()
    };
    sim_pars.validate()?;

    info!(
        finish_distance = sim_pars.track_pars.finish_distance,
        no_traffic_cars = sim_pars.traffic_pars.no_cars,
        seed = sim_opts.seed,
        "Simulating chase"
    );

    // EXECUTION -----------------------------------------------------------------------------------
    if sim_opts.realtime {
        info!("Running chase in real-time...");
        let (tx, rx) = flume::unbounded();

        let sim_opts_thread = sim_opts.clone();
        let sim_pars_thread = sim_pars.clone();

        let handle = thread::spawn(move || {
            handle_chase(
                &sim_pars_thread,
                sim_opts_thread.seed,
                sim_opts_thread.max_ticks,
                false,
                false,
                Some(&tx),
                sim_opts_thread.realtime_factor,
            )
        });

        let observed = observe_chase(rx);
        let chase_result = match handle.join() {
            Ok(result) => result?,
            Err(_) => anyhow::bail!("Chase thread panicked!"),
        };
        if observed.is_none() {
            warn!("Observer did not receive the final chase result");
        }
        chase_result.print_summary()?;
    } else if sim_opts.no_sim_runs == 1 {
        let t_start = Instant::now();

        let chase_result = handle_chase(
            &sim_pars,
            sim_opts.seed,
            sim_opts.max_ticks,
            sim_opts.debug,
            sim_opts.trace_path.is_some(),
            None,
            1.0,
        )?;

        info!("Execution time: {}ms", t_start.elapsed().as_millis());

        chase_result.print_summary()?;
        if let Some(summary_path) = &sim_opts.summary_path {
            chase_result.write_summary_to_file(summary_path)?;
            info!("Summary written to {}", summary_path.display());
        }
        if let Some(trace_path) = &sim_opts.trace_path {
            chase_result.write_trace_to_csv(trace_path)?;
            info!("Trace written to {}", trace_path.display());
        }
    } else {
        let t_start = Instant::now();

        let chase_results: Vec<ChaseResult> = (0..sim_opts.no_sim_runs as u64)
            .into_par_iter()
            .map(|i| {
                handle_chase(
                    &sim_pars,
                    sim_opts.seed + i,
                    sim_opts.max_ticks,
                    false,
                    false,
                    None,
                    1.0,
                )
            })
            .collect::<anyhow::Result<Vec<ChaseResult>>>()?;

        info!(
            "Execution time: {}ms for {} runs",
            t_start.elapsed().as_millis(),
            sim_opts.no_sim_runs
        );

        let no_runs = chase_results.len() as f64;
        let no_police_wins = chase_results
            .iter()
            .filter(|result| result.winner == Some(Winner::Police))
            .count();
        let no_thief_wins = chase_results
            .iter()
            .filter(|result| result.winner == Some(Winner::Thief))
            .count();
        let avg_ticks = chase_results
            .iter()
            .map(|result| result.ticks as f64)
            .sum::<f64>()
            / no_runs;

        println!("RESULT: Win ratio over {} runs", chase_results.len());
        println!("police: {:5.1}%", no_police_wins as f64 / no_runs * 100.0);
        println!("thief:  {:5.1}%", no_thief_wins as f64 / no_runs * 100.0);
        println!(
            "none:   {:5.1}%",
            (chase_results.len() - no_police_wins - no_thief_wins) as f64 / no_runs * 100.0
        );
        println!("average chase length: {:.0} ticks", avg_ticks);
    }

    Ok(())
}
