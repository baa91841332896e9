use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(
    version = "0.1.0",
    name = "chasesim",
    about = "A fixed-tick police chase simulator with a heuristic vehicle decision engine"
)]
pub struct SimOpts {
    // FLAGS ---------------------------------------------------------------------------------------
    /// Activate debug logging of the chase progress (only for non-real-time mode)
    #[clap(short, long)]
    pub debug: bool,

    /// Activate real-time mode - the chase is paced to 60 ticks per second and streamed to an
    /// observer
    #[clap(long)]
    pub realtime: bool,

    // OPTIONS -------------------------------------------------------------------------------------
    /// Set number of simulation runs (only for non-real-time mode), runs are seeded seed,
    /// seed+1, ...
    #[clap(short, long, default_value = "1")]
    pub no_sim_runs: u32,

    /// Set path to the simulation parameter file (OPTIONAL: if not set, uses the default chase)
    #[clap(short, long)]
    pub parfile_path: Option<PathBuf>,

    /// Set real-time factor (only relevant in real-time mode)
    #[clap(short, long, default_value = "1.0")]
    pub realtime_factor: f64,

    /// Set the seed of the random number generator
    #[clap(short, long, default_value = "0")]
    pub seed: u64,

    /// Set the maximum number of ticks, the chase ends without winner afterwards (OPTIONAL)
    #[clap(short, long)]
    pub max_ticks: Option<u64>,

    /// Set path of a CSV file the per-tick trace of a single run is written to (OPTIONAL)
    #[clap(short, long)]
    pub trace_path: Option<PathBuf>,

    /// Set path of a text file the summary of a single run is written to (OPTIONAL)
    #[clap(long)]
    pub summary_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_parse_with_defaults() {
        let opts = SimOpts::parse_from(&["chasesim"]);
        assert!(!opts.debug && !opts.realtime);
        assert_eq!(opts.no_sim_runs, 1);
        assert_eq!(opts.seed, 0);
        assert!(opts.max_ticks.is_none());

        let opts = SimOpts::parse_from(&[
            "chasesim",
            "--realtime",
            "--seed",
            "9",
            "--max-ticks",
            "600",
            "--trace-path",
            "out/trace.csv",
        ]);
        assert!(opts.realtime);
        assert_eq!(opts.seed, 9);
        assert_eq!(opts.max_ticks, Some(600));
        assert_eq!(opts.trace_path, Some(PathBuf::from("out/trace.csv")));
    }
}
