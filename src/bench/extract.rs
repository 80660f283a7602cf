//! Metric extraction from benchmarked-process output and analyzer CSV logs.
//!
//! The benchmarked process ends its output with two fixed summary lines:
//!
//! ```text
//! GC count: 12 (3/9), average allocations per gc: 4096, microseconds spent in GC: 52000
//! Heap size (Kb*s): 2000, Free heap size (Kb*s): 400
//! <last line>
//! ```
//!
//! They are located by position (third- and second-from-last line), not by
//! searching. The analyzer log is a semicolon-separated `key;value;unit` file whose
//! numbers may use a comma as the decimal separator.

use std::io;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use super::model::{RawMetrics, RunResult};
use super::ExtractionError;

/* ----------------------------- Line Grammar ----------------------------- */

static GC_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"GC count: (\d+) \([^)]*\), ",
        r"average allocations per gc: (\d+), ",
        r"microseconds spent in GC: (\d+)",
    ))
    .expect("Always valid")
});

static HEAP_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Heap size \(Kb\*s\): (\d+), Free heap size \(Kb\*s\): (\d+)")
        .expect("Always valid")
});

/// Position of the GC summary, counted from the end of the output.
pub const GC_LINE_FROM_END: usize = 3;
/// Position of the heap summary, counted from the end of the output.
pub const HEAP_LINE_FROM_END: usize = 2;

/* ----------------------------- Output Summary ----------------------------- */

/// Integer fields read from the two summary lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSummary {
    pub gc_count: u64,
    pub allocations_per_gc: u64,
    pub gc_microseconds: u64,
    /// Heap size integrated over the run, in Kb*s.
    pub heap_kb_s: u64,
    /// Free heap size integrated over the run, in Kb*s.
    pub free_heap_kb_s: u64,
}

/// Parse the GC and heap summary lines at the end of the process output.
pub fn parse_output(raw: &[u8]) -> Result<OutputSummary, ExtractionError> {
    let text = String::from_utf8_lossy(raw);
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() < GC_LINE_FROM_END {
        return Err(ExtractionError::TooShort(lines.len()));
    }

    let gc_line = lines[lines.len() - GC_LINE_FROM_END];
    let gc = GC_SUMMARY
        .captures(gc_line)
        .ok_or_else(|| ExtractionError::Mismatch {
            summary: "GC",
            position: GC_LINE_FROM_END,
            line: gc_line.to_string(),
        })?;

    let heap_line = lines[lines.len() - HEAP_LINE_FROM_END];
    let heap = HEAP_SUMMARY
        .captures(heap_line)
        .ok_or_else(|| ExtractionError::Mismatch {
            summary: "heap",
            position: HEAP_LINE_FROM_END,
            line: heap_line.to_string(),
        })?;

    Ok(OutputSummary {
        gc_count: parse_u64(&gc[1], "GC count")?,
        allocations_per_gc: parse_u64(&gc[2], "average allocations per gc")?,
        gc_microseconds: parse_u64(&gc[3], "microseconds spent in GC")?,
        heap_kb_s: parse_u64(&heap[1], "heap size")?,
        free_heap_kb_s: parse_u64(&heap[2], "free heap size")?,
    })
}

fn parse_u64(s: &str, field: &'static str) -> Result<u64, ExtractionError> {
    s.parse().map_err(|_| ExtractionError::Integer {
        field,
        value: s.to_string(),
    })
}

/* ----------------------------- Analyzer Log ----------------------------- */

/// Fields read from the analyzer CSV. Missing keys stay at zero / `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogMetrics {
    pub freed_memory_per_min: f64,
    pub average_pause: f64,
    pub pause_deviation: f64,
    pub collector_throughput: f64,
    /// Total pause time reported by the analyzer; replaces the GC time from
    /// stdout when present.
    pub accumulated_pause: Option<f64>,
}

/// Parse `key;value[,value...];unit` rows.
///
/// Unknown keys are ignored. Values marked not-available are treated as
/// missing; any other unparsable value of a known key is an error.
pub fn parse_log_csv<R: io::Read>(reader: R) -> Result<LogMetrics, ExtractionError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut metrics = LogMetrics::default();
    for record in rdr.records() {
        let record = record?;
        let key = record.get(0).unwrap_or("").trim();
        let value = record.get(1).unwrap_or("");

        let slot = match key {
            "freedMemoryPerMin" => &mut metrics.freed_memory_per_min,
            "avgPause" => &mut metrics.average_pause,
            "avgPauseσ" => &mut metrics.pause_deviation,
            "throughput" => &mut metrics.collector_throughput,
            "accumPause" => {
                metrics.accumulated_pause = parse_log_value(key, value)?;
                continue;
            }
            _ => continue,
        };
        *slot = parse_log_value(key, value)?.unwrap_or(0.0);
    }

    Ok(metrics)
}

/// Normalize a locale-formatted number: drop digit-group spaces, turn the
/// decimal comma into a period.
pub fn normalize_decimal(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect()
}

fn parse_log_value(key: &str, value: &str) -> Result<Option<f64>, ExtractionError> {
    let normalized = normalize_decimal(value);
    match normalized.to_ascii_lowercase().as_str() {
        "" | "n/a" | "n.a." | "na" => return Ok(None),
        _ => {}
    }
    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or_else(|| ExtractionError::LogField {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/* ----------------------------- API ----------------------------- */

/// Build a [`RunResult`] from raw process output, the optional analyzer CSV,
/// and the wall-clock time of the request/response cycle.
///
/// Heap averages are the Kb*s integrals divided by `elapsed`.
pub fn extract(
    raw_output: &[u8],
    log_csv: Option<&str>,
    elapsed: Duration,
) -> Result<RunResult, ExtractionError> {
    let summary = parse_output(raw_output)?;
    let log = match log_csv {
        Some(text) => parse_log_csv(text.as_bytes())?,
        None => LogMetrics::default(),
    };

    let total_seconds = elapsed.as_secs_f64();
    if total_seconds <= 0.0 {
        return Err(ExtractionError::NonPositiveElapsed(total_seconds));
    }

    let gc_seconds = log
        .accumulated_pause
        .unwrap_or(summary.gc_microseconds as f64 / 1_000_000.0);

    RunResult::new(RawMetrics {
        total_seconds,
        gc_seconds,
        gc_count: summary.gc_count,
        allocations_per_gc: summary.allocations_per_gc,
        freed_memory_per_min: log.freed_memory_per_min,
        average_pause: log.average_pause,
        pause_deviation: log.pause_deviation,
        average_heap: summary.heap_kb_s as f64 / total_seconds,
        average_free_heap: summary.free_heap_kb_s as f64 / total_seconds,
        collector_throughput: log.collector_throughput,
    })
}

/* ----------------------------- Tests ----------------------------- */
