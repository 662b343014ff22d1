use std::collections::BTreeSet;
use std::path::Path;

use log::{debug, info, warn};
use polars::prelude::*;
use prettytable::{row, Table};
use termion::color;

use crate::error::{HarnessError, Result};
use crate::parse::{discover_runs, parse_file, RunResult};
use crate::stats::{aggregate, check_sizes, overhead, AggregatedSeries, Overhead};
use crate::util::{result_filename, BenchmarkSpec, Metric, VariantEnv};

/// Aggregated series of one variant, one entry per metric of the benchmark
#[derive(Debug, Clone)]
pub struct VariantSeries {
    pub variant: String,
    pub metrics: Vec<(Metric, AggregatedSeries)>,
}

/// Overhead of `comparison` relative to `baseline` for one metric
#[derive(Debug, Clone)]
pub struct MetricComparison {
    pub metric: Metric,
    pub baseline: String,
    pub comparison: String,
    pub overhead: Overhead,
}

#[derive(Debug, Clone)]
pub struct BenchmarkAnalysis {
    pub benchmark: String,
    pub sizes: Vec<u64>,
    pub variants: Vec<VariantSeries>,
    pub comparisons: Vec<MetricComparison>,
}

impl BenchmarkAnalysis {
    pub fn series(&self, variant: &str, metric: Metric) -> Option<&AggregatedSeries> {
        self.variants
            .iter()
            .find(|v| v.variant == variant)?
            .metrics
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, s)| s)
    }

    pub fn comparisons_for(&self, metric: Metric) -> impl Iterator<Item = &MetricComparison> {
        self.comparisons.iter().filter(move |c| c.metric == metric)
    }
}

/// Read runs `0..count` of one (benchmark, variant), checking every run measured the same sizes.
pub fn load_runs(
    results_path: &Path,
    bench: &BenchmarkSpec,
    variant: &str,
    count: usize,
) -> Result<(Vec<u64>, Vec<RunResult>)> {
    let mut sizes: Option<Vec<u64>> = None;
    let mut runs = Vec::with_capacity(count);
    for run in 0..count {
        let path = results_path.join(result_filename(&bench.name, run, variant));
        let result = parse_file(&path, bench.kind)?;
        match &sizes {
            Some(expected) => check_sizes(
                expected,
                &result.sizes,
                &format!("{} run {} ({})", bench.name, run, variant),
            )?,
            None => sizes = Some(result.sizes.clone()),
        }
        runs.push(result);
    }

    let sizes = sizes.ok_or_else(|| HarnessError::Config("run count must be at least 1".to_string()))?;
    Ok((sizes, runs))
}

/// Load, aggregate and compare every variant of one benchmark.
///
/// The first variant is the reference. Throughput metrics use it as the baseline of
/// the overhead; latency uses the other variant as the baseline, so a positive
/// overhead always means the compared variant is slower.
pub fn analyze_benchmark(
    results_path: &Path,
    bench: &BenchmarkSpec,
    variants: &[VariantEnv],
    count: usize,
) -> Result<BenchmarkAnalysis> {
    if variants.len() < 2 {
        return Err(HarnessError::Config(format!(
            "need at least two variants to compare, got {}",
            variants.len()
        )));
    }

    let mut sizes: Option<Vec<u64>> = None;
    let mut series = Vec::with_capacity(variants.len());
    for variant in variants {
        let (variant_sizes, runs) = load_runs(results_path, bench, &variant.label, count)?;
        match &sizes {
            Some(expected) => check_sizes(
                expected,
                &variant_sizes,
                &format!("{} ({} vs {})", bench.name, variant.label, variants[0].label),
            )?,
            None => sizes = Some(variant_sizes),
        }

        let mut metrics = Vec::new();
        for (i, metric) in bench.kind.metrics().iter().enumerate() {
            let columns: Vec<&[f64]> = runs.iter().map(|r| r.column(i)).collect();
            metrics.push((*metric, aggregate(&columns)?));
        }
        debug!("Aggregated {} runs of {} ({})", count, bench.name, variant.label);
        series.push(VariantSeries {
            variant: variant.label.clone(),
            metrics,
        });
    }

    let mut analysis = BenchmarkAnalysis {
        benchmark: bench.name.clone(),
        sizes: sizes.unwrap_or_default(),
        variants: series,
        comparisons: Vec::new(),
    };

    let reference = &variants[0].label;
    for other in &variants[1..] {
        for metric in bench.kind.metrics() {
            let (baseline, comparison) = if metric.higher_is_better() {
                (reference, &other.label)
            } else {
                (&other.label, reference)
            };
            let (Some(b), Some(c)) = (
                analysis.series(baseline, *metric),
                analysis.series(comparison, *metric),
            ) else {
                continue;
            };
            let overhead = overhead(&b.mean, &c.mean)?;
            analysis.comparisons.push(MetricComparison {
                metric: *metric,
                baseline: baseline.clone(),
                comparison: comparison.clone(),
                overhead,
            });
        }
    }

    Ok(analysis)
}

/// Benchmarks that have a run 0 result for every variant, in config order
pub fn benchmarks_with_results<'a>(
    results_path: &Path,
    benchmarks: &'a [BenchmarkSpec],
    variants: &[VariantEnv],
) -> Result<Vec<&'a BenchmarkSpec>> {
    let present: BTreeSet<(String, String)> = discover_runs(results_path)?
        .into_iter()
        .filter(|r| r.run == 0)
        .map(|r| (r.benchmark, r.variant))
        .collect();

    Ok(benchmarks
        .iter()
        .filter(|b| {
            variants
                .iter()
                .all(|v| present.contains(&(b.name.clone(), v.label.clone())))
        })
        .collect())
}

/// Warn when the results directory holds fewer runs than requested.
pub fn warn_on_missing_runs(
    results_path: &Path,
    bench: &BenchmarkSpec,
    variants: &[VariantEnv],
    count: usize,
) -> Result<()> {
    let runs = discover_runs(results_path)?;
    for variant in variants {
        let found = runs
            .iter()
            .filter(|r| r.benchmark == bench.name && r.variant == variant.label && r.run < count)
            .count();
        if found < count {
            warn!(
                "Only {} of {} runs of {} ({}) found in {}",
                found,
                count,
                bench.name,
                variant.label,
                results_path.display()
            );
        }
    }
    Ok(())
}

/// Print the overhead of each metric as a table.
pub fn print_summary(analysis: &BenchmarkAnalysis, color: bool) {
    let mut table = Table::new();
    table.set_titles(row![
        "metric",
        "baseline",
        "compared",
        "mean overhead %",
        "min overhead %",
        "min @ size",
        "max overhead %",
        "max @ size"
    ]);

    for c in &analysis.comparisons {
        let oh = &c.overhead;
        table.add_row(row![
            c.metric.name(),
            c.baseline,
            c.comparison,
            format!("{:.3}", oh.mean),
            format!("{:.3}", oh.min()),
            analysis.sizes[oh.min_index],
            format!("{:.3}", oh.max()),
            analysis.sizes[oh.max_index]
        ]);
    }

    if color {
        println!("{}{}{}", color::Fg(color::Yellow), analysis.benchmark, color::Fg(color::Reset));
    } else {
        println!("{}", analysis.benchmark);
    }
    table.printstd();

    for c in &analysis.comparisons {
        info!("{} {} overhead: {}", analysis.benchmark, c.metric.name(), c.overhead.mean);
    }
}

/// Convert an analysis to a Polars DataFrame
///
/// Columns: `size`, then `{variant}_{metric}_{mean,min,max}` for every variant, then
/// `{metric}_overhead` for every comparison.
pub fn analysis_to_df(analysis: &BenchmarkAnalysis) -> Result<DataFrame> {
    let mut columns = vec![Series::new("size", analysis.sizes.clone())];

    for variant in &analysis.variants {
        for (metric, agg) in &variant.metrics {
            let prefix = format!("{}_{}", variant.variant, metric.name());
            columns.push(Series::new(&format!("{}_mean", prefix), agg.mean.clone()));
            columns.push(Series::new(&format!("{}_min", prefix), agg.min.clone()));
            columns.push(Series::new(&format!("{}_max", prefix), agg.max.clone()));
        }
    }

    for c in &analysis.comparisons {
        columns.push(Series::new(
            &format!("{}_{}_vs_{}_overhead", c.metric.name(), c.comparison, c.baseline),
            c.overhead.values.clone(),
        ));
    }

    Ok(DataFrame::new(columns)?)
}

/// Write `{benchmark}.summary.csv` into `dir`.
pub fn write_csv(analysis: &BenchmarkAnalysis, dir: &Path) -> Result<std::path::PathBuf> {
    let mut df = analysis_to_df(analysis)?;
    let csv_file = dir.join(format!("{}.summary.csv", analysis.benchmark));
    info!("Writing summary to CSV at {}...", csv_file.display());
    let opened_file = std::fs::File::create(&csv_file).map_err(|e| HarnessError::io(&csv_file, e))?;
    CsvWriter::new(opened_file).finish(&mut df)?;
    Ok(csv_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::HarnessConfig;

    fn write(dir: &Path, name: &str, text: &str) {
        std::fs::write(dir.join(name), text).unwrap();
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn mbw_mr_overhead_uses_sm_as_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        write(p, "osu_mbw_mr.0.sm.out", "# Size MB/s Messages/s\n2 10.0 100.0\n4 20.0 200.0\n");
        write(p, "osu_mbw_mr.1.sm.out", "# Size MB/s Messages/s\n2 10.0 300.0\n4 20.0 200.0\n");
        write(p, "osu_mbw_mr.0.rsm.out", "2 9.0 200.0\n4 22.0 200.0\n");
        write(p, "osu_mbw_mr.1.rsm.out", "2 9.0 200.0\n4 22.0 200.0\n");

        let config = HarnessConfig::default();
        let bench = config.benchmark("osu_mbw_mr").unwrap();
        let analysis = analyze_benchmark(p, bench, &config.variants, 2).unwrap();

        assert_eq!(analysis.sizes, vec![2, 4]);
        let sm_mr = analysis.series("sm", Metric::MessageRate).unwrap();
        assert_eq!(sm_mr.mean, vec![200.0, 200.0]);
        assert_eq!(sm_mr.min, vec![100.0, 200.0]);
        assert_eq!(sm_mr.max, vec![300.0, 200.0]);

        let bw = analysis.comparisons_for(Metric::Bandwidth).next().unwrap();
        assert_eq!(bw.baseline, "sm");
        assert_eq!(bw.comparison, "rsm");
        assert!(close(bw.overhead.values[0], 10.0));
        assert!(close(bw.overhead.values[1], -10.0));
        assert!(close(bw.overhead.mean, 0.0));
        assert_eq!(bw.overhead.min_index, 1);
        assert_eq!(bw.overhead.max_index, 0);

        let mr = analysis.comparisons_for(Metric::MessageRate).next().unwrap();
        assert!(mr.overhead.values.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn latency_overhead_uses_rsm_as_baseline() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "osu_latency.0.sm.out", "2 1.0\n4 2.0\n");
        write(dir.path(), "osu_latency.0.rsm.out", "2 2.0\n4 2.0\n");

        let config = HarnessConfig::default();
        let bench = config.benchmark("osu_latency").unwrap();
        let analysis = analyze_benchmark(dir.path(), bench, &config.variants, 1).unwrap();
        let lat = analysis.comparisons_for(Metric::Latency).next().unwrap();
        assert_eq!(lat.baseline, "rsm");
        assert!(close(lat.overhead.values[0], 50.0));
        assert!(close(lat.overhead.values[1], 0.0));
    }

    #[test]
    fn misaligned_sizes_between_runs_fail() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "osu_latency.0.sm.out", "2 1.0\n4 2.0\n");
        write(dir.path(), "osu_latency.1.sm.out", "2 1.0\n8 2.0\n");

        let config = HarnessConfig::default();
        let bench = config.benchmark("osu_latency").unwrap();
        let err = load_runs(dir.path(), bench, "sm", 2).unwrap_err();
        assert!(matches!(err, HarnessError::Shape { .. }));
    }

    #[test]
    fn misaligned_sizes_between_variants_fail() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "osu_latency.0.sm.out", "2 1.0\n4 2.0\n");
        write(dir.path(), "osu_latency.0.rsm.out", "2 1.0\n4 2.0\n8 3.0\n");

        let config = HarnessConfig::default();
        let bench = config.benchmark("osu_latency").unwrap();
        let err = analyze_benchmark(dir.path(), bench, &config.variants, 1).unwrap_err();
        assert!(matches!(err, HarnessError::Shape { expected: 2, found: 3, .. }));
    }

    #[test]
    fn missing_run_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "osu_latency.0.sm.out", "2 1.0\n");
        write(dir.path(), "osu_latency.0.rsm.out", "2 1.0\n");

        let config = HarnessConfig::default();
        let bench = config.benchmark("osu_latency").unwrap();
        let err = analyze_benchmark(dir.path(), bench, &config.variants, 2).unwrap_err();
        assert!(matches!(err, HarnessError::Io { .. }));
    }

    #[test]
    fn finds_benchmarks_with_results() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "osu_latency.0.sm.out", "");
        write(dir.path(), "osu_latency.0.rsm.out", "");
        write(dir.path(), "osu_bw.0.sm.out", "");

        let config = HarnessConfig::default();
        let found = benchmarks_with_results(dir.path(), &config.benchmarks, &config.variants).unwrap();
        let names: Vec<&str> = found.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["osu_latency"]);
    }

    #[test]
    fn summary_csv() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "osu_latency.0.sm.out", "2 1.0\n4 2.0\n");
        write(dir.path(), "osu_latency.0.rsm.out", "2 2.0\n4 2.0\n");

        let config = HarnessConfig::default();
        let bench = config.benchmark("osu_latency").unwrap();
        let analysis = analyze_benchmark(dir.path(), bench, &config.variants, 1).unwrap();
        print_summary(&analysis, false);

        let df = analysis_to_df(&analysis).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 1 + 2 * 3 + 1);

        let path = write_csv(&analysis, dir.path()).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.starts_with("size,sm_latency_mean,sm_latency_min,sm_latency_max"));
        assert!(header.ends_with("latency_sm_vs_rsm_overhead"));
    }
}
