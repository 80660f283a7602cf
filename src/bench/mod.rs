//! GC benchmark harness: process orchestration, metric extraction, reporting.
//!
//! This module runs a target executable under several garbage-collector
//! configurations against a suite of workloads and renders the collected
//! metrics. Subcommands: run, render, extract, validate.

use std::{io, path::PathBuf, time::Duration};

/* ----------------------------- Error ----------------------------- */

/// Unified error type for the CLI-facing parts of the bench module.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("{0} run(s) failed")]
    FailedRuns(usize),
}

/* ----------------------------- Extraction Error ----------------------------- */

/// A summary line or analyzer log field could not be turned into metrics.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("output has {0} line(s); the GC and heap summaries need at least 3")]
    TooShort(usize),
    #[error("{summary} summary expected {position} line(s) from the end, found {line:?}")]
    Mismatch {
        summary: &'static str,
        position: usize,
        line: String,
    },
    #[error("{field} value {value:?} is not a valid integer")]
    Integer { field: &'static str, value: String },
    #[error("log field '{key}' has unparsable value {value:?}")]
    LogField { key: String, value: String },
    #[error("log CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("elapsed time must be positive, got {0} s")]
    NonPositiveElapsed(f64),
    #[error("free heap {free} Kb exceeds heap {heap} Kb")]
    HeapInconsistent { heap: f64, free: f64 },
}

/* ----------------------------- Execution Error ----------------------------- */

/// One (configuration, workload) run failed. Never aborts the matrix.
#[derive(Debug, thiserror::Error)]
#[error("{configuration}/{workload}: {kind}")]
pub struct ExecutionError {
    pub configuration: String,
    pub workload: String,
    #[source]
    pub kind: ExecutionErrorKind,
}

/// What went wrong during a single run.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionErrorKind {
    #[error("failed to start process: {0}")]
    Spawn(#[source] io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("no exit after {0:?}; process killed")]
    Timeout(Duration),
    #[error("process produced no output")]
    EmptyOutput,
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl ExecutionError {
    pub fn new(configuration: &str, workload: &str, kind: ExecutionErrorKind) -> Self {
        Self {
            configuration: configuration.to_string(),
            workload: workload.to_string(),
            kind,
        }
    }
}

/* ----------------------------- Build Error ----------------------------- */

/// Rebuilding the target for a configuration failed.
///
/// Fatal for that configuration's remaining workloads only.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationBuildError {
    #[error("removing {path:?}: {source}")]
    Clean { path: PathBuf, source: io::Error },
    #[error("build step `{command}` failed to start: {source}")]
    Spawn { command: String, source: io::Error },
    #[error("build step `{command}` exited with {status}")]
    Status { command: String, status: String },
}

/* ----------------------------- Validate Result ----------------------------- */

/// Result of a single environment validation check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub label: String,
    pub status: CheckStatus,
    pub detail: String,
}

/// Status of a validation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

/* ----------------------------- Tool Search ----------------------------- */

/// Search for an executable in PATH.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths).find_map(|dir| {
            let candidate = dir.join(name);
            if candidate.is_file() {
                Some(candidate)
            } else {
                None
            }
        })
    })
}

/* ----------------------------- Modules ----------------------------- */

pub mod chart;
pub mod config;
pub mod extract;
pub mod matrix;
pub mod model;
pub mod report;
pub mod runner;
pub mod validate;

/* ----------------------------- Re-exports ----------------------------- */

pub use chart::{chart_geometry, render_svg, ChartGeometry};
pub use config::{CommandLauncher, MatrixConfig};
pub use extract::{extract, parse_log_csv};
pub use matrix::{BenchmarkMatrix, BuildState, Execute};
pub use model::{
    Configuration, FailureKind, Launch, MatrixOutcome, RunFailure, RunResult, SeriesEntry,
    SeriesTable, Workload,
};
pub use report::{
    from_json, print_failures, print_summary_table, render, to_asciidoc, to_json,
    validate_to_json, write_float,
};
pub use runner::Runner;
pub use validate::{has_failures, print_results, run_checks};
