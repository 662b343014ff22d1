use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, info, warn};

use crate::error::{HarnessError, Result};
use crate::util::{profile_filename, result_filename, BenchmarkSpec, VariantEnv};

/// Every benchmark is a two-rank point-to-point test
pub const NUM_PROCS: u32 = 2;

/// Wrap one rank of each run in `flamegraph`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileOptions {
    pub rank: u32,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory holding the benchmark binaries
    pub bin_dir: PathBuf,
    pub results_path: PathBuf,
    pub count: usize,
    /// MPI launcher, normally `mpirun`
    pub launcher: String,
    pub profile: Option<ProfileOptions>,
    pub dry_run: bool,
}

/// What happened to one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub benchmark: String,
    pub variant: String,
    pub run: usize,
    pub output: PathBuf,
    /// Exit code, `None` for dry runs or when killed by a signal
    pub status: Option<i32>,
}

/// Build the launcher command line for one run.
///
/// Without profiling this is `mpirun -np 2 <bin> <args>`. With profiling every rank
/// gets its own MPMD app context and the selected rank is wrapped in `flamegraph`,
/// writing to `profile_output`.
pub fn benchmark_argv(
    opts: &RunOptions,
    bench: &BenchmarkSpec,
    profile_output: Option<&Path>,
) -> Result<Vec<String>> {
    let bin_path = opts.bin_dir.join(&bench.name).to_string_lossy().to_string();
    let mut bench_cmd = vec![bin_path];
    bench_cmd.extend(bench.args.iter().cloned());

    let mut argv = vec![opts.launcher.clone()];
    match (opts.profile, profile_output) {
        (Some(profile), Some(svg)) => {
            if profile.rank >= NUM_PROCS {
                return Err(HarnessError::Config(format!(
                    "cannot profile rank {} of a {} rank run",
                    profile.rank, NUM_PROCS
                )));
            }
            for rank in 0..NUM_PROCS {
                if rank > 0 {
                    argv.push(":".to_string());
                }
                argv.extend(["-np".to_string(), "1".to_string()]);
                if rank == profile.rank {
                    argv.extend([
                        "flamegraph".to_string(),
                        "-o".to_string(),
                        svg.to_string_lossy().to_string(),
                        "--".to_string(),
                    ]);
                }
                argv.extend(bench_cmd.iter().cloned());
            }
        }
        _ => {
            argv.extend(["-np".to_string(), NUM_PROCS.to_string()]);
            argv.extend(bench_cmd);
        }
    }

    Ok(argv)
}

/// Run one benchmark once under one variant, with stdout going straight into `output`.
///
/// The variant's variables are layered over the inherited environment. A non-zero
/// exit is only logged: whatever the benchmark printed stays in the file and will
/// surface when the file is parsed.
fn run_once(argv: &[String], variant: &VariantEnv, output: &Path) -> Result<Option<i32>> {
    let out_file = File::create(output).map_err(|e| HarnessError::io(output, e))?;

    let status = Command::new(&argv[0])
        .args(&argv[1..])
        .envs(&variant.env)
        .stdout(Stdio::from(out_file))
        .status()
        .map_err(|e| HarnessError::io(&argv[0], e))?;

    if !status.success() {
        match status.code() {
            Some(code) => warn!("{} exited with code {}, output kept in {}", argv[0], code, output.display()),
            None => warn!("{} was terminated by a signal, output kept in {}", argv[0], output.display()),
        }
    }

    Ok(status.code())
}

/// Run every benchmark under every variant `opts.count` times, one process at a time.
pub fn run_benchmarks(
    benchmarks: &[&BenchmarkSpec],
    variants: &[VariantEnv],
    opts: &RunOptions,
) -> Result<Vec<RunRecord>> {
    if opts.count == 0 {
        return Err(HarnessError::Config("run count must be at least 1".to_string()));
    }
    if opts.dry_run {
        info!("🌵 ONLY PRINTING OUT THE COMMANDS BECAUSE THIS IS A DRY RUN! 🌵");
    }

    let mut records = Vec::new();
    for bench in benchmarks {
        info!("Running {}", bench.name);
        for variant in variants {
            info!("=> Testing version {}", variant.label);
            debug!("Environment overrides: {:?}", variant.env);

            for run in 0..opts.count {
                let output = opts
                    .results_path
                    .join(result_filename(&bench.name, run, &variant.label));
                let svg = opts
                    .profile
                    .map(|_| opts.results_path.join(profile_filename(&bench.name, run, &variant.label)));
                let argv = benchmark_argv(opts, bench, svg.as_deref())?;
                if run == 0 {
                    info!("==> Running {} test(s) with args {:?}", opts.count, argv);
                }

                let status = if opts.dry_run {
                    info!("[dry run] {} > {}", argv.join(" "), output.display());
                    None
                } else {
                    debug!("Run {} of {} -> {}", run + 1, opts.count, output.display());
                    run_once(&argv, variant, &output)?
                };

                records.push(RunRecord {
                    benchmark: bench.name.clone(),
                    variant: variant.label.clone(),
                    run,
                    output,
                    status,
                });
            }
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::HarnessConfig;

    fn options(dir: &Path) -> RunOptions {
        RunOptions {
            bin_dir: PathBuf::from("/omb/c/mpi/pt2pt/standard"),
            results_path: dir.to_path_buf(),
            count: 2,
            launcher: "mpirun".to_string(),
            profile: None,
            dry_run: true,
        }
    }

    #[test]
    fn plain_argv() {
        let config = HarnessConfig::default();
        let opts = options(Path::new("/results"));
        let argv = benchmark_argv(&opts, config.benchmark("osu_latency").unwrap(), None).unwrap();
        assert_eq!(
            argv,
            vec![
                "mpirun",
                "-np",
                "2",
                "/omb/c/mpi/pt2pt/standard/osu_latency",
                "-m",
                "2:256",
                "-i",
                "16384"
            ]
        );
    }

    #[test]
    fn profiled_argv_wraps_selected_rank() {
        let config = HarnessConfig::default();
        let mut opts = options(Path::new("/results"));
        opts.profile = Some(ProfileOptions { rank: 1 });
        let bench = config.benchmark("osu_bw").unwrap();
        let argv = benchmark_argv(&opts, bench, Some(Path::new("/results/osu_bw.0.sm.svg"))).unwrap();
        let bin = "/omb/c/mpi/pt2pt/standard/osu_bw";
        assert_eq!(
            argv,
            vec![
                "mpirun", "-np", "1", bin, "-m", "2:256", "-i", "16384", ":", "-np", "1",
                "flamegraph", "-o", "/results/osu_bw.0.sm.svg", "--", bin, "-m", "2:256", "-i",
                "16384"
            ]
        );
    }

    #[test]
    fn profiling_a_missing_rank_fails() {
        let config = HarnessConfig::default();
        let mut opts = options(Path::new("/results"));
        opts.profile = Some(ProfileOptions { rank: 2 });
        let err = benchmark_argv(&opts, config.benchmark("osu_bw").unwrap(), Some(Path::new("x.svg")));
        assert!(matches!(err, Err(HarnessError::Config(_))));
    }

    #[test]
    fn dry_run_visits_every_combination_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::default();
        let selected = config.select(Some("osu_latency,osu_mbw_mr")).unwrap();
        let records = run_benchmarks(&selected, &config.variants, &options(dir.path())).unwrap();

        assert_eq!(records.len(), 2 * 2 * 2);
        let order: Vec<(String, String, usize)> = records
            .iter()
            .map(|r| (r.benchmark.clone(), r.variant.clone(), r.run))
            .collect();
        assert_eq!(order[0], ("osu_latency".to_string(), "sm".to_string(), 0));
        assert_eq!(order[1], ("osu_latency".to_string(), "sm".to_string(), 1));
        assert_eq!(order[2], ("osu_latency".to_string(), "rsm".to_string(), 0));
        assert_eq!(order[7], ("osu_mbw_mr".to_string(), "rsm".to_string(), 1));
        assert_eq!(records[2].output, dir.path().join("osu_latency.0.rsm.out"));

        // Nothing is written on a dry run
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn zero_count_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::default();
        let mut opts = options(dir.path());
        opts.count = 0;
        let selected = config.select(None).unwrap();
        assert!(matches!(
            run_benchmarks(&selected, &config.variants, &opts),
            Err(HarnessError::Config(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn every_run_writes_its_file_and_failures_continue() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let launcher = dir.path().join("fake-mpirun");
        std::fs::write(
            &launcher,
            "#!/bin/sh\necho \"# btl=$OMPI_MCA_btl args=$*\"\necho 2 0.19\nexit 3\n",
        )
        .unwrap();
        std::fs::set_permissions(&launcher, std::fs::Permissions::from_mode(0o755)).unwrap();

        let results = dir.path().join("results");
        std::fs::create_dir(&results).unwrap();
        let mut opts = options(&results);
        opts.launcher = launcher.to_string_lossy().to_string();
        opts.dry_run = false;

        let config = HarnessConfig::default();
        let selected = config.select(Some("osu_latency,osu_bw")).unwrap();
        let records = run_benchmarks(&selected, &config.variants, &opts).unwrap();

        assert_eq!(records.len(), 2 * 2 * 2);
        for record in &records {
            assert_eq!(record.status, Some(3));
            let expected = results.join(result_filename(&record.benchmark, record.run, &record.variant));
            assert_eq!(record.output, expected);

            let text = std::fs::read_to_string(&expected).unwrap();
            let variant = config.variants.iter().find(|v| v.label == record.variant).unwrap();
            let btl = &variant.env["OMPI_MCA_btl"];
            assert_eq!(
                text,
                format!(
                    "# btl={} args=-np 2 /omb/c/mpi/pt2pt/standard/{} -m 2:256 -i 16384\n2 0.19\n",
                    btl, record.benchmark
                )
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn stdout_and_environment_reach_the_result_file() {
        let dir = tempfile::tempdir().unwrap();
        let variant = VariantEnv::new("sm", &[("OMPI_MCA_btl", "sm,self")]);
        let output = dir.path().join("osu_latency.0.sm.out");
        let argv = vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo \"# btl=$OMPI_MCA_btl\"; echo 2 0.19; exit 3".to_string(),
        ];

        let status = run_once(&argv, &variant, &output).unwrap();
        assert_eq!(status, Some(3));
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "# btl=sm,self\n2 0.19\n"
        );
    }
}
