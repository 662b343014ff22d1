use std::fs;
use std::path::{Path, PathBuf};

use charts_rs::Box as ChartBox;
use charts_rs::{LegendCategory, LineChart, MarkPoint, MarkPointCategory, Series};
use log::info;

use crate::analyze::BenchmarkAnalysis;
use crate::error::{HarnessError, Result};
use crate::util::Metric;

const DASHED: &str = "4,3";

fn to_f32(values: &[f64]) -> Vec<f32> {
    values.iter().map(|v| *v as f32).collect()
}

/// Build the comparison chart of one metric.
///
/// Sizes are powers of two, so putting them on a category axis spaces them evenly in
/// log2. Each variant gets its mean plus dashed min and max lines around it. The
/// overhead goes on a second y axis with its min and max points marked.
///
/// The marks are placed by charts-rs on the `f32` values, so two overheads that only
/// differ past `f32` precision may get marked at another position. The subtitle is
/// built from the `f64` positions and always names the right sizes.
pub fn metric_chart(analysis: &BenchmarkAnalysis, metric: Metric, title: &str) -> Option<LineChart> {
    let mut series_list = Vec::new();
    for variant in &analysis.variants {
        let Some(agg) = analysis.series(&variant.variant, metric) else {
            continue;
        };
        series_list.push(Series::new(variant.variant.clone(), to_f32(&agg.mean)));

        let mut min = Series::new(format!("{} min", variant.variant), to_f32(&agg.min));
        min.stroke_dash_array = Some(DASHED.to_string());
        series_list.push(min);

        let mut max = Series::new(format!("{} max", variant.variant), to_f32(&agg.max));
        max.stroke_dash_array = Some(DASHED.to_string());
        series_list.push(max);
    }
    if series_list.is_empty() {
        return None;
    }

    let comparison = analysis.comparisons_for(metric).next();
    if let Some(c) = comparison {
        let mut overhead = Series::new(
            format!("overhead % ({} vs {})", c.comparison, c.baseline),
            to_f32(&c.overhead.values),
        );
        overhead.y_axis_index = 1;
        overhead.mark_points = vec![
            MarkPoint {
                category: MarkPointCategory::Min,
            },
            MarkPoint {
                category: MarkPointCategory::Max,
            },
        ];
        series_list.push(overhead);
    }

    let x_axis: Vec<String> = analysis.sizes.iter().map(|s| s.to_string()).collect();
    let mut chart = LineChart::new_with_theme(series_list, x_axis, "light");
    chart.title_text = if title.is_empty() {
        format!("{} - {}", analysis.benchmark, metric.axis_label())
    } else {
        format!("{} - {} - {}", analysis.benchmark, metric.axis_label(), title)
    };
    if let Some(c) = comparison {
        let oh = &c.overhead;
        chart.sub_title_text = format!(
            "min overhead {:.2}% @ {} B, max overhead {:.2}% @ {} B, mean {:.2}%",
            oh.min(),
            analysis.sizes[oh.min_index],
            oh.max(),
            analysis.sizes[oh.max_index],
            oh.mean
        );
        chart.y_axis_configs.push(chart.y_axis_configs[0].clone());
    }
    chart.width = 1200.0;
    chart.height = 800.0;
    chart.legend_category = LegendCategory::Normal;
    chart.legend_margin = Some(ChartBox {
        top: chart.title_height + chart.sub_title_height + 10.0,
        bottom: 5.0,
        ..Default::default()
    });

    Some(chart)
}

/// Render every metric of `analysis` to `{benchmark}.{metric}.svg` in `dir`.
pub fn render_charts(
    analysis: &BenchmarkAnalysis,
    metrics: &[Metric],
    dir: &Path,
    title: &str,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| HarnessError::io(dir, e))?;

    let mut written = Vec::new();
    for metric in metrics {
        let Some(chart) = metric_chart(analysis, *metric, title) else {
            continue;
        };
        let svg = chart.svg().map_err(|e| HarnessError::Plot(e.to_string()))?;
        let path = dir.join(format!("{}.{}.svg", analysis.benchmark, metric.name()));
        fs::write(&path, svg).map_err(|e| HarnessError::io(&path, e))?;
        info!("Wrote chart {}", path.display());
        written.push(path);
    }

    Ok(written)
}
