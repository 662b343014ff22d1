use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarnessError>;

/// Everything that can stop a run or an analysis. None of these are retried.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Benchmarks {} were not found", .0.join(","))]
    UnknownBenchmarks(Vec<String>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {}:{line}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Shape error ({context}): expected {expected} values, found {found}")]
    Shape {
        expected: usize,
        found: usize,
        context: String,
    },

    #[error("Domain error at position {index}: {message}")]
    Domain { index: usize, message: String },

    #[error("Plot error: {0}")]
    Plot(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

impl HarnessError {
    /// Wrap an `std::io::Error` with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarnessError::Io {
            path: path.into(),
            source,
        }
    }
}
