//! Reductions over repeated runs and the overhead between two variants.

use crate::error::{HarnessError, Result};

/// Per-position mean, minimum and maximum across runs
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedSeries {
    pub mean: Vec<f64>,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

/// Aggregate N runs position by position.
///
/// Every run must have the same length as the first one; a mismatch is a shape error
/// rather than a silent truncation. The mean is a running mean, so identical runs give
/// back their values exactly and the mean never leaves `[min, max]`.
pub fn aggregate<S: AsRef<[f64]>>(runs: &[S]) -> Result<AggregatedSeries> {
    let Some(first) = runs.first() else {
        return Err(HarnessError::Shape {
            expected: 1,
            found: 0,
            context: "aggregate needs at least one run".to_string(),
        });
    };
    let len = first.as_ref().len();

    for (i, run) in runs.iter().enumerate() {
        if run.as_ref().len() != len {
            return Err(HarnessError::Shape {
                expected: len,
                found: run.as_ref().len(),
                context: format!("run {}", i),
            });
        }
    }

    let mut series = AggregatedSeries {
        mean: Vec::with_capacity(len),
        min: Vec::with_capacity(len),
        max: Vec::with_capacity(len),
    };
    for pos in 0..len {
        let mut mean = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for (k, run) in runs.iter().enumerate() {
            let v = run.as_ref()[pos];
            mean += (v - mean) / (k + 1) as f64;
            min = min.min(v);
            max = max.max(v);
        }
        // Rounding can push the running mean just past an extreme
        let mean = if mean < min {
            min
        } else if mean > max {
            max
        } else {
            mean
        };
        series.mean.push(mean);
        series.min.push(min);
        series.max.push(max);
    }

    Ok(series)
}

/// Check that a run measured exactly the sizes every other run did, in the same order.
pub fn check_sizes(expected: &[u64], found: &[u64], context: &str) -> Result<()> {
    if expected.len() != found.len() {
        return Err(HarnessError::Shape {
            expected: expected.len(),
            found: found.len(),
            context: context.to_string(),
        });
    }
    if let Some(pos) = expected.iter().zip(found).position(|(a, b)| a != b) {
        return Err(HarnessError::Shape {
            expected: expected.len(),
            found: found.len(),
            context: format!(
                "{}: size {} at position {} where {} was expected",
                context, found[pos], pos, expected[pos]
            ),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Overhead {
    /// Percentage per position
    pub values: Vec<f64>,
    /// Mean of `values`
    pub mean: f64,
    /// Position of the smallest overhead (signed), first one on ties
    pub min_index: usize,
    /// Position of the largest overhead (signed), first one on ties
    pub max_index: usize,
}

impl Overhead {
    pub fn min(&self) -> f64 {
        self.values[self.min_index]
    }

    pub fn max(&self) -> f64 {
        self.values[self.max_index]
    }
}

/// `100 * (baseline[i] - comparison[i]) / baseline[i]` at every position.
///
/// The result is relative to `baseline`, so swapping the two arguments does not just
/// flip the sign: `overhead(b, c)[i] == -overhead(c, b)[i] * c[i] / b[i]`.
/// A zero baseline value is a domain error.
pub fn overhead(baseline: &[f64], comparison: &[f64]) -> Result<Overhead> {
    if baseline.len() != comparison.len() {
        return Err(HarnessError::Shape {
            expected: baseline.len(),
            found: comparison.len(),
            context: "overhead comparison series".to_string(),
        });
    }
    if baseline.is_empty() {
        return Err(HarnessError::Shape {
            expected: 1,
            found: 0,
            context: "overhead needs at least one position".to_string(),
        });
    }

    let mut values = Vec::with_capacity(baseline.len());
    for (i, (b, c)) in baseline.iter().zip(comparison).enumerate() {
        if *b == 0.0 {
            return Err(HarnessError::Domain {
                index: i,
                message: "baseline mean is zero".to_string(),
            });
        }
        values.push(100.0 * (b - c) / b);
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let mut min_index = 0;
    let mut max_index = 0;
    for (i, v) in values.iter().enumerate() {
        if *v < values[min_index] {
            min_index = i;
        }
        if *v > values[max_index] {
            max_index = i;
        }
    }

    Ok(Overhead {
        values,
        mean,
        min_index,
        max_index,
    })
}
