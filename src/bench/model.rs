//! Matrix data model: configurations, workloads, run results and series.

use std::collections::HashMap;
use std::fmt;
use std::process::Child;

use serde::{Deserialize, Serialize};

use super::{ConfigurationBuildError, ExtractionError};

/* ----------------------------- Launch ----------------------------- */

/// Capability that prepares and starts the benchmarked process for one GC
/// configuration.
///
/// The matrix calls [`Launch::build`] only when the configuration's build key
/// differs from the build currently in place, then [`Launch::spawn`] once per
/// workload. The spawned child must have piped stdin and stdout.
pub trait Launch {
    /// Configurations returning the same key share one build.
    fn build_key(&self) -> Option<&str> {
        None
    }

    fn build(&self) -> Result<(), ConfigurationBuildError> {
        Ok(())
    }

    fn spawn(&self) -> std::io::Result<Child>;
}

/* ----------------------------- Configuration ----------------------------- */

/// A named GC variant of the benchmarked process.
pub struct Configuration {
    pub name: String,
    pub launcher: Box<dyn Launch>,
}

impl Configuration {
    pub fn new(name: impl Into<String>, launcher: impl Launch + 'static) -> Self {
        Self {
            name: name.into(),
            launcher: Box::new(launcher),
        }
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("name", &self.name)
            .field("build_key", &self.launcher.build_key())
            .finish()
    }
}

/* ----------------------------- Workload ----------------------------- */

/// A named test scenario executed inside the benchmarked process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Workload(pub String);

impl Workload {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Workload {
    fn from(s: &str) -> Self {
        Workload(s.to_string())
    }
}

/* ----------------------------- RunResult ----------------------------- */

/// Metrics of one (configuration, workload) execution.
///
/// Heap figures are in Kb, times in seconds. Built only through
/// [`RunResult::new`], which enforces `0 <= average_free_heap <= average_heap`
/// and `total_seconds > 0`. Deserialization goes through the same check and
/// recomputes `throughput`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMetrics")]
pub struct RunResult {
    pub total_seconds: f64,
    pub gc_seconds: f64,
    pub gc_count: u64,
    pub allocations_per_gc: u64,
    pub freed_memory_per_min: f64,
    pub average_pause: f64,
    pub pause_deviation: f64,
    pub average_heap: f64,
    pub average_free_heap: f64,
    pub throughput: f64,
    #[serde(default)]
    pub collector_throughput: f64,
}

/// Raw inputs of a [`RunResult`] before the derived fields are computed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMetrics {
    pub total_seconds: f64,
    pub gc_seconds: f64,
    pub gc_count: u64,
    pub allocations_per_gc: u64,
    pub freed_memory_per_min: f64,
    pub average_pause: f64,
    pub pause_deviation: f64,
    pub average_heap: f64,
    pub average_free_heap: f64,
    #[serde(default)]
    pub collector_throughput: f64,
}

impl RunResult {
    pub fn new(raw: RawMetrics) -> Result<Self, ExtractionError> {
        if !(raw.total_seconds > 0.0) {
            return Err(ExtractionError::NonPositiveElapsed(raw.total_seconds));
        }
        if !(raw.average_free_heap >= 0.0 && raw.average_free_heap <= raw.average_heap) {
            return Err(ExtractionError::HeapInconsistent {
                heap: raw.average_heap,
                free: raw.average_free_heap,
            });
        }
        let throughput = if raw.average_heap > 0.0 {
            (raw.average_heap - raw.average_free_heap) / raw.average_heap
        } else {
            0.0
        };

        Ok(Self {
            total_seconds: raw.total_seconds,
            gc_seconds: raw.gc_seconds,
            gc_count: raw.gc_count,
            allocations_per_gc: raw.allocations_per_gc,
            freed_memory_per_min: raw.freed_memory_per_min,
            average_pause: raw.average_pause,
            pause_deviation: raw.pause_deviation,
            average_heap: raw.average_heap,
            average_free_heap: raw.average_free_heap,
            throughput,
            collector_throughput: raw.collector_throughput,
        })
    }

    /// Heap actually occupied by live data, in Kb.
    pub fn live_heap(&self) -> f64 {
        self.average_heap - self.average_free_heap
    }
}

impl TryFrom<RawMetrics> for RunResult {
    type Error = ExtractionError;

    fn try_from(raw: RawMetrics) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

/* ----------------------------- Series ----------------------------- */

/// One successful run in a workload's series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesEntry {
    pub configuration: String,
    pub result: RunResult,
}

/// Per-workload series of results, in configuration iteration order.
///
/// Workload order is the order workloads were registered; every registered
/// workload is present even when all its runs failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesTable {
    order: Vec<Workload>,
    series: HashMap<Workload, Vec<SeriesEntry>>,
}

impl SeriesTable {
    pub fn new(workloads: &[Workload]) -> Self {
        let mut table = Self::default();
        for w in workloads {
            table.register(w);
        }
        table
    }

    fn register(&mut self, workload: &Workload) {
        if !self.series.contains_key(workload) {
            self.order.push(workload.clone());
            self.series.insert(workload.clone(), Vec::new());
        }
    }

    pub fn push(&mut self, workload: &Workload, configuration: &str, result: RunResult) {
        self.register(workload);
        if let Some(entries) = self.series.get_mut(workload) {
            entries.push(SeriesEntry {
                configuration: configuration.to_string(),
                result,
            });
        }
    }

    pub fn get(&self, workload: &Workload) -> &[SeriesEntry] {
        self.series.get(workload).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate workloads in registration order with their series.
    pub fn iter(&self) -> impl Iterator<Item = (&Workload, &[SeriesEntry])> {
        self.order.iter().map(move |w| (w, self.get(w)))
    }

    pub fn workloads(&self) -> &[Workload] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/* ----------------------------- Failures ----------------------------- */

/// Which stage of a pair failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Build,
    Execution,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Build => "build",
            FailureKind::Execution => "run",
        })
    }
}

/// A (configuration, workload) pair that produced no result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub configuration: String,
    pub workload: Workload,
    pub kind: FailureKind,
    pub message: String,
}

/* ----------------------------- Outcome ----------------------------- */

/// Everything a finished matrix produced.
#[derive(Debug, Clone, Default)]
pub struct MatrixOutcome {
    /// Configuration names in iteration order, including ones that failed.
    pub configurations: Vec<String>,
    pub series: SeriesTable,
    pub failures: Vec<RunFailure>,
}

impl MatrixOutcome {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.series.iter().map(|(_, entries)| entries.len()).sum()
    }
}

/* ----------------------------- Tests ----------------------------- */
