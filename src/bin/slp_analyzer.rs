//! Result-file analysis CLI.
//!
//! Summarises a directory of run-result files into one `|` separated
//! summary table, or prints the statistics of a single result file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, Context, Result};

use slpsim::analysis::{Analyse, AnalysisResults, BatchAnalyzer, SummaryProfile};
use slpsim::metrics::Algorithm;

#[derive(Parser)]
#[command(name = "slp-analyzer")]
#[command(about = "Summarise source location privacy run results")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Algorithm whose summary columns are used
    #[arg(short, long, default_value = "protectionless")]
    algorithm: Algorithm,

    /// Heading patterns to skip, matched against whole names (repeatable)
    #[arg(long = "skip-header")]
    skip_headers: Vec<String>,

    /// Keep runs that reached the simulation upper time bound
    #[arg(long)]
    keep_upper_bound: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of parallel workers (0 = auto-detect)
    #[arg(short = 'j', long, default_value = "0")]
    jobs: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise every result file in a directory
    Summary {
        /// Directory containing result files (*.txt)
        results_dir: PathBuf,

        /// Summary file to write
        #[arg(short, long, default_value = "summary.csv")]
        output: PathBuf,

        /// Ignore cached per-file results
        #[arg(long)]
        flush: bool,

        /// Also write the summary as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Print the statistics of one result file
    File {
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize error handling and parse arguments
    color_eyre::install()?;
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    if cli.jobs > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.jobs)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    // Summary columns and parse options come from the algorithm profile
    let profile = SummaryProfile::for_algorithm(cli.algorithm);
    let options = profile.analyse_options(cli.skip_headers.clone(), cli.keep_upper_bound);

    match cli.command {
        Commands::Summary { results_dir, output, flush, json } => {
            if !results_dir.is_dir() {
                bail!("{} is not a directory", results_dir.display());
            }

            let analyzer = BatchAnalyzer::new(profile, options);
            let report = analyzer.run(&results_dir, &output, flush, json.as_deref())?;

            log::info!(
                "Summarised {} files ({} empty, {} failed)",
                report.written,
                report.empty,
                report.failed
            );
        }
        Commands::File { path } => {
            let analysis = Analyse::from_path(&path, &options)
                .with_context(|| format!("Failed to analyse {}", path.display()))?;
            let results = AnalysisResults::new(&analysis);
            print_results(&results);
        }
    }

    Ok(())
}

fn print_results(results: &AnalysisResults) {
    println!("{}", "=".repeat(80));
    println!(
        "Repeats: {} (rejected {}, no sink delivery {}, upper bound {}, duplicates {})",
        results.number_of_repeats,
        results.rejected_rows,
        results.dropped_no_sink_delivery,
        results.dropped_hit_upper_bound,
        results.dropped_duplicates
    );
    println!("Nodes: {}", results.num_nodes);
    println!("{}", "=".repeat(80));

    for (name, average) in &results.average_of {
        let variance = results
            .variance_of
            .get(name)
            .map(|v| format!("  var {}", v))
            .unwrap_or_default();
        let median = results
            .median_of
            .get(name)
            .map(|m| format!("  median {}", m))
            .unwrap_or_default();
        println!("{:<50} {}{}{}", name, average, variance, median);
    }
}
