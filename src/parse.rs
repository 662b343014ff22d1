use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::debug;
use regex::Regex;

use crate::error::{HarnessError, Result};
use crate::util::BenchmarkKind;

/// The data rows of one result file, as parallel columns in file order
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub sizes: Vec<u64>,
    /// One entry per value column, each as long as `sizes`
    pub columns: Vec<Vec<f64>>,
}

impl RunResult {
    pub fn column(&self, i: usize) -> &[f64] {
        &self.columns[i]
    }
}

/// Parse a line from the OMB output
///
/// Note: Only returns something if the line is a table data row. Comment and blank
/// lines give `Ok(None)`, anything else that isn't `size value...` is an error.
pub fn parse_line(line: &str, value_columns: usize) -> std::result::Result<Option<(u64, Vec<f64>)>, String> {
    // Handle comment and blank rows
    if line.trim_start().starts_with('#') || line.trim().is_empty() {
        return Ok(None);
    }

    let line_slice = line.split_whitespace().collect::<Vec<&str>>();
    if line_slice.len() != value_columns + 1 {
        return Err(format!(
            "expected {} columns, found {}",
            value_columns + 1,
            line_slice.len()
        ));
    }

    let size = line_slice[0]
        .parse::<u64>()
        .map_err(|e| format!("bad size {:?}: {}", line_slice[0], e))?;
    let values = line_slice[1..]
        .iter()
        .map(|v| v.parse::<f64>().map_err(|e| format!("bad value {:?}: {}", v, e)))
        .collect::<std::result::Result<Vec<f64>, String>>()?;

    Ok(Some((size, values)))
}

/// Parse the full text of a result file. `path` is only used in error messages.
pub fn parse_output(text: &str, value_columns: usize, path: &Path) -> Result<RunResult> {
    let mut result = RunResult {
        sizes: Vec::new(),
        columns: vec![Vec::new(); value_columns],
    };

    for (i, line) in text.lines().enumerate() {
        let parsed = parse_line(line, value_columns).map_err(|message| HarnessError::Parse {
            path: path.to_path_buf(),
            line: i + 1,
            message,
        })?;
        if let Some((size, values)) = parsed {
            result.sizes.push(size);
            for (column, value) in result.columns.iter_mut().zip(values) {
                column.push(value);
            }
        }
    }

    Ok(result)
}

/// Read and parse one result file in the layout of `kind`
pub fn parse_file(path: &Path, kind: BenchmarkKind) -> Result<RunResult> {
    let text = std::fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
    let result = parse_output(&text, kind.value_columns(), path)?;
    debug!("Parsed {} rows from {}", result.sizes.len(), path.display());
    Ok(result)
}

/// A result file found in the results directory
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RunFile {
    pub benchmark: String,
    pub run: usize,
    pub variant: String,
    pub path: PathBuf,
}

fn run_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<bench>[A-Za-z0-9_\-]+)\.(?P<run>[0-9]+)\.(?P<variant>[A-Za-z0-9_\-]+)\.out$").unwrap())
}

/// List the `{benchmark}.{run}.{variant}.out` files in `dir`, sorted.
pub fn discover_runs(dir: &Path) -> Result<Vec<RunFile>> {
    let entries = std::fs::read_dir(dir).map_err(|e| HarnessError::io(dir, e))?;

    let mut runs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| HarnessError::io(dir, e))?;
        let filename = entry.file_name().to_string_lossy().to_string();
        let Some(caps) = run_file_re().captures(&filename) else {
            continue;
        };
        let Ok(run) = caps["run"].parse::<usize>() else {
            continue;
        };
        runs.push(RunFile {
            benchmark: caps["bench"].to_string(),
            run,
            variant: caps["variant"].to_string(),
            path: entry.path(),
        });
    }

    runs.sort();
    Ok(runs)
}
