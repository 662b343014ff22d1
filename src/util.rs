use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use termion::color;

use crate::error::{HarnessError, Result};

/// Location of the point-to-point benchmarks inside an OMB build
pub const PT2PT_SUBDIR: &str = "c/mpi/pt2pt/standard";

/// Arguments every stock benchmark is run with (message sizes 2..256, 16384 iterations)
const DEFAULT_ARGS: &str = "-m 2:256 -i 16384";

/// Output layout of a benchmark, which also decides which metrics it reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchmarkKind {
    /// `size latency`
    Latency,
    /// `size bandwidth`
    Bandwidth,
    /// `size bandwidth message-rate`
    BandwidthMessageRate,
}

impl BenchmarkKind {
    pub fn metrics(&self) -> &'static [Metric] {
        match self {
            BenchmarkKind::Latency => &[Metric::Latency],
            BenchmarkKind::Bandwidth => &[Metric::Bandwidth],
            BenchmarkKind::BandwidthMessageRate => &[Metric::Bandwidth, Metric::MessageRate],
        }
    }

    /// Number of value columns following the size column
    pub fn value_columns(&self) -> usize {
        self.metrics().len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Latency,
    Bandwidth,
    MessageRate,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Latency => "latency",
            Metric::Bandwidth => "bandwidth",
            Metric::MessageRate => "message_rate",
        }
    }

    pub fn axis_label(&self) -> &'static str {
        match self {
            Metric::Latency => "Latency (μs)",
            Metric::Bandwidth => "Bandwidth (MB/s)",
            Metric::MessageRate => "Messages/s",
        }
    }

    /// Throughput metrics are compared against the first variant, latency against the second.
    pub fn higher_is_better(&self) -> bool {
        !matches!(self, Metric::Latency)
    }
}

/// A benchmark binary plus the fixed arguments it is run with
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkSpec {
    pub name: String,
    pub args: Vec<String>,
    pub kind: BenchmarkKind,
}

impl BenchmarkSpec {
    pub fn new(name: &str, args: &str, kind: BenchmarkKind) -> Self {
        BenchmarkSpec {
            name: name.to_string(),
            args: args.split_whitespace().map(str::to_string).collect(),
            kind,
        }
    }
}

/// A transport variant: a label and the environment overrides that select it
#[derive(Debug, Clone, PartialEq)]
pub struct VariantEnv {
    pub label: String,
    pub env: BTreeMap<String, String>,
}

impl VariantEnv {
    pub fn new(label: &str, env: &[(&str, &str)]) -> Self {
        VariantEnv {
            label: label.to_string(),
            env: env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Benchmark and variant tables. The first variant is the baseline.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub benchmarks: Vec<BenchmarkSpec>,
    pub variants: Vec<VariantEnv>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            benchmarks: vec![
                BenchmarkSpec::new("osu_latency", DEFAULT_ARGS, BenchmarkKind::Latency),
                BenchmarkSpec::new("osu_mbw_mr", DEFAULT_ARGS, BenchmarkKind::BandwidthMessageRate),
                BenchmarkSpec::new("osu_bw", DEFAULT_ARGS, BenchmarkKind::Bandwidth),
            ],
            variants: vec![
                VariantEnv::new(
                    "sm",
                    &[
                        ("OMPI_MCA_pml", "ob1"),
                        ("OMPI_MCA_btl", "sm,self"),
                        ("OMPI_MCA_btl_sm_fbox_max", "0"),
                    ],
                ),
                VariantEnv::new("rsm", &[("OMPI_MCA_pml", "ob1"), ("OMPI_MCA_btl", "rsm,self")]),
            ],
        }
    }
}

impl HarnessConfig {
    pub fn benchmark(&self, name: &str) -> Option<&BenchmarkSpec> {
        self.benchmarks.iter().find(|b| b.name == name)
    }

    /// Resolve a comma-separated benchmark subset, or every benchmark when none is given.
    ///
    /// Every unknown name is reported at once so nothing runs on a typo.
    pub fn select(&self, subset: Option<&str>) -> Result<Vec<&BenchmarkSpec>> {
        let names = match subset {
            None => return Ok(self.benchmarks.iter().collect()),
            Some(s) => s
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .collect::<Vec<&str>>(),
        };

        let not_found: Vec<String> = names
            .iter()
            .filter(|n| self.benchmark(n).is_none())
            .map(|n| n.to_string())
            .collect();
        if !not_found.is_empty() {
            return Err(HarnessError::UnknownBenchmarks(not_found));
        }

        Ok(names.iter().filter_map(|n| self.benchmark(n)).collect())
    }
}

/// Name of the file holding the raw output of one run
pub fn result_filename(benchmark: &str, run: usize, variant: &str) -> String {
    format!("{}.{}.{}.out", benchmark, run, variant)
}

/// Name of the flamegraph written next to a result file
pub fn profile_filename(benchmark: &str, run: usize, variant: &str) -> String {
    format!("{}.{}.{}.svg", benchmark, run, variant)
}

/// Check the OMB build and results directory before anything runs.
///
/// Returns the directory holding the benchmark binaries. The results directory is
/// created if it doesn't exist yet.
pub fn verify_paths(
    omb_path: &Path,
    results_path: &Path,
    benchmarks: &[&BenchmarkSpec],
) -> Result<PathBuf> {
    let bin_dir = omb_path.join(PT2PT_SUBDIR);

    if !cfg!(feature = "no_check_paths") {
        if !omb_path.exists() {
            return Err(HarnessError::Config(format!(
                "OMB build not found at: {}",
                omb_path.display()
            )));
        }
        for bench in benchmarks {
            let bin = bin_dir.join(&bench.name);
            if !bin.exists() {
                return Err(HarnessError::Config(format!(
                    "benchmark binary not found at: {}",
                    bin.display()
                )));
            }
        }
    }

    // Note: The results directory will be created if it doesn't exist
    if !results_path.exists() {
        debug!("Creating results directory {}", results_path.display());
        std::fs::create_dir_all(results_path).map_err(|e| HarnessError::io(results_path, e))?;
    }

    Ok(bin_dir)
}

/// Pretty print the run plan as a table.
///
/// # Arguments
/// * `benchmarks` - Benchmarks that will run, in order
/// * `variants` - Variants each benchmark is run under
/// * `count` - Runs per (benchmark, variant)
pub fn pretty_print_plan(
    benchmarks: &[&BenchmarkSpec],
    variants: &[VariantEnv],
    count: usize,
    color: bool,
) {
    println!("|------------------+----------+-------+--------------------------------------------------|");
    println!("|    benchmark     | variant  | runs  |                     args                         |");
    println!("|------------------+----------+-------+--------------------------------------------------|");
    for bench in benchmarks {
        for variant in variants {
            let args = bench.args.join(" ");
            if color {
                println!(
                    "| {}{:<16}{} | {}{:^8}{} | {}{:>5}{} | {}{:<48}{} |",
                    color::Fg(color::Yellow),
                    bench.name,
                    color::Fg(color::Reset),
                    color::Fg(color::Magenta),
                    variant.label,
                    color::Fg(color::Reset),
                    color::Fg(color::LightGreen),
                    count,
                    color::Fg(color::Reset),
                    color::Fg(color::LightCyan),
                    args,
                    color::Fg(color::Reset),
                );
            } else {
                println!(
                    "| {:<16} | {:^8} | {:>5} | {:<48} |",
                    bench.name, variant.label, count, args
                );
            }
        }
    }
    println!("|------------------------------------------------------------------------------------------|");
}
