//! Run the OSU Micro-Benchmarks under two Open MPI shared-memory transports and
//! compare the results.

pub mod analyze;
pub mod error;
pub mod parse;
pub mod plot;
pub mod stats;
pub mod util;
pub mod wrapper;

pub use error::{HarnessError, Result};
pub use util::{BenchmarkKind, BenchmarkSpec, HarnessConfig, Metric, VariantEnv};
