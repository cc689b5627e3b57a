use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::Context;
use color_eyre::Result;
use env_logger::Env;
use log::info;

use slpsim::config_loader::{self, CliOverrides};
use slpsim::metrics::FieldTable;
use slpsim::simulation;

/// Replay simulator event logs through reactive attackers and record run metrics
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the run configuration YAML file
    #[arg(short, long)]
    config: PathBuf,

    /// Event logs to replay, one per repeat
    #[arg(required_unless_present = "dump_config", num_args = 1..)]
    logs: Vec<PathBuf>,

    /// Result file to write
    #[arg(short, long, default_value = "results.txt")]
    output: PathBuf,

    /// Override the seed of the first repeat
    #[arg(long)]
    seed: Option<u64>,

    /// Override the safety period (e.g. "90s", "2m")
    #[arg(long, value_parser = parse_duration)]
    safety_period: Option<Duration>,

    /// Override the attackers, e.g. "SeqNosReactiveAttacker()" (repeatable)
    #[arg(long = "attacker")]
    attackers: Vec<String>,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of parallel replays (0 = auto-detect)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse command-line arguments
    let args = Args::parse();

    // Initialize logging with the requested default filter level
    env_logger::Builder::from_env(Env::default().default_filter_or(&args.log_level)).init();

    // Load configuration and apply CLI overrides on top of it
    let mut config = config_loader::load_config(&args.config)?;
    let overrides = CliOverrides {
        seed: args.seed,
        safety_period: args.safety_period,
        attackers: args.attackers.clone(),
    };
    config_loader::apply_overrides(&mut config, &overrides)?;

    // Print the resolved configuration if requested
    if args.dump_config {
        let json = serde_json::to_string_pretty(&config).context("Failed to serialize configuration")?;
        println!("{}", json);
        return Ok(());
    }

    // Size the replay thread pool (0 leaves rayon's default)
    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    // Build the network and attackers once, shared by every repeat
    let network = config.network()?;
    let specs = config.attacker_specs()?;
    info!(
        "Algorithm {} on {} nodes with {} attacker(s)",
        config.general.algorithm,
        network.size(),
        specs.len()
    );

    // Replay each event log as one repeat
    let outcomes = simulation::replay_all(&config, &args.logs)?;

    // Write all repeats to the result file
    let fields = FieldTable::with_extensions(&config.general.algorithm.extensions());
    let opts = simulation::result_options(&config, &network, &specs);
    simulation::write_result_file(&args.output, &opts, &fields, &outcomes)?;

    let captured = outcomes.iter().filter(|o| o.captured).count();
    info!(
        "Captured in {} of {} repeats, results written to {}",
        captured,
        outcomes.len(),
        args.output.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from([
            "slpsim",
            "--config", "run.yaml",
            "seed-1.log", "seed-2.log",
        ]);

        assert_eq!(args.config, PathBuf::from("run.yaml"));
        assert_eq!(args.logs.len(), 2);
        assert_eq!(args.output, PathBuf::from("results.txt"));
        assert_eq!(args.threads, 0);
    }

    #[test]
    fn test_override_args() {
        let args = Args::parse_from([
            "slpsim",
            "-c", "run.yaml",
            "--seed", "9",
            "--safety-period", "90s",
            "--attacker", "BasicReactiveAttacker()",
            "--attacker", "SeqNoReactiveAttacker(start=3)",
            "run.log",
        ]);

        assert_eq!(args.seed, Some(9));
        assert_eq!(args.safety_period, Some(Duration::from_secs(90)));
        assert_eq!(args.attackers.len(), 2);
    }

    #[test]
    fn test_logs_required() {
        assert!(Args::try_parse_from(["slpsim", "-c", "run.yaml"]).is_err());
        assert!(Args::try_parse_from(["slpsim", "-c", "run.yaml", "--dump-config"]).is_ok());
    }
}
