use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{error, info};

use omb_harness::analyze::{analyze_benchmark, benchmarks_with_results, print_summary, warn_on_missing_runs, write_csv};
use omb_harness::plot::render_charts;
use omb_harness::util::{pretty_print_plan, verify_paths};
use omb_harness::wrapper::{run_benchmarks, ProfileOptions, RunOptions};
use omb_harness::{HarnessConfig, HarnessError};

#[derive(Parser)]
#[command(about = "Compare Open MPI shared-memory transports with the OSU Micro-Benchmarks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Print tables without colors
    #[arg(long, default_value_t = false, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmarks under every variant
    Run {
        /// Path to the OMB benchmarks build
        #[arg(short, long, env = "OMB_PATH")]
        omb_path: PathBuf,
        /// Number of runs to do
        #[arg(short, long)]
        count: usize,
        /// Path to the results dir
        #[arg(short, long, env = "OMB_RESULTS_DIR")]
        results_path: PathBuf,
        /// Comma-separated benchmarks to run (default: all)
        #[arg(short, long)]
        benchmarks: Option<String>,
        /// Wrap one rank of every run in flamegraph
        #[arg(short, long, default_value_t = false)]
        flamegraph: bool,
        /// Rank to profile with --flamegraph
        #[arg(long, default_value_t = 0)]
        rank: u32,
        /// MPI launcher
        #[arg(long, default_value = "mpirun")]
        launcher: String,
        /// Only print the commands
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Aggregate results, print overheads and draw charts
    Graph {
        /// Path to the results dir
        #[arg(short, long, env = "OMB_RESULTS_DIR")]
        results_path: PathBuf,
        /// Number of runs
        #[arg(short, long)]
        count: usize,
        /// Title
        #[arg(short, long, default_value = "")]
        title: String,
        /// Comma-separated benchmarks to analyze (default: all with results)
        #[arg(short, long)]
        benchmarks: Option<String>,
        /// Also write `{benchmark}.summary.csv`
        #[arg(long, default_value_t = false)]
        csv: bool,
        /// Where to put the charts (default: the results dir)
        #[arg(long)]
        plot_dir: Option<PathBuf>,
    },
}

fn run(cli: Cli) -> Result<(), HarnessError> {
    let config = HarnessConfig::default();
    let color = !cli.no_color;

    match cli.command {
        Commands::Run {
            omb_path,
            count,
            results_path,
            benchmarks,
            flamegraph,
            rank,
            launcher,
            dry_run,
        } => {
            // Unknown names fail before anything runs
            let selected = config.select(benchmarks.as_deref())?;
            let bin_dir = verify_paths(&omb_path, &results_path, &selected)?;

            pretty_print_plan(&selected, &config.variants, count, color);

            let opts = RunOptions {
                bin_dir,
                results_path,
                count,
                launcher,
                profile: flamegraph.then_some(ProfileOptions { rank }),
                dry_run,
            };
            let records = run_benchmarks(&selected, &config.variants, &opts)?;
            let failed = records
                .iter()
                .filter(|r| matches!(r.status, Some(code) if code != 0))
                .count();
            info!("Finished {} run(s), {} with a non-zero exit status", records.len(), failed);
        }
        Commands::Graph {
            results_path,
            count,
            title,
            benchmarks,
            csv,
            plot_dir,
        } => {
            if count == 0 {
                return Err(HarnessError::Config("run count must be at least 1".to_string()));
            }
            let selected = match benchmarks {
                Some(_) => config.select(benchmarks.as_deref())?,
                None => benchmarks_with_results(&results_path, &config.benchmarks, &config.variants)?,
            };
            if selected.is_empty() {
                return Err(HarnessError::Config(format!(
                    "no results found in {}",
                    results_path.display()
                )));
            }
            let plot_dir = plot_dir.unwrap_or_else(|| results_path.clone());

            for bench in selected {
                warn_on_missing_runs(&results_path, bench, &config.variants, count)?;
                let analysis = analyze_benchmark(&results_path, bench, &config.variants, count)?;
                print_summary(&analysis, color);
                if csv {
                    write_csv(&analysis, &results_path)?;
                }
                render_charts(&analysis, bench.kind.metrics(), &plot_dir, &title)?;
            }
        }
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => Ok(()),
        Err(HarnessError::UnknownBenchmarks(names)) => {
            eprintln!("Benchmarks {} were not found", names.join(","));
            std::process::exit(1);
        }
        Err(e) => {
            error!("{}", e);
            Err(e.into())
        }
    }
}
