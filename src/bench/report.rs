//! Output formatting: AsciiDoc results table, terminal tables, and JSON.
//!
//! Uses ANSI escape codes for colored terminal output.

use serde::{Deserialize, Serialize};

use super::chart::{chart_geometry, render_svg};
use super::model::{MatrixOutcome, RunFailure, RunResult, SeriesEntry, SeriesTable, Workload};
use super::{CheckResult, CheckStatus, Error};

/* ----------------------------- ANSI Colors ----------------------------- */

const GREEN: &str = "\x1b[92m";
const RED: &str = "\x1b[91m";
const YELLOW: &str = "\x1b[93m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/* ----------------------------- Number Format ----------------------------- */

/// Format a metric for the report.
///
/// - `100 < f < 100000`: rounded, `,`-grouped integer (`12,345`)
/// - `f > 0.001`: three significant digits (`0.500`, `1.23`, `42.0`)
/// - otherwise: scientific with two decimals (`1.00e-04`)
pub fn write_float(f: f64) -> String {
    if f > 100.0 && f < 100_000.0 {
        group_thousands(f.round() as u64)
    } else if f > 0.001 {
        significant(f, 3)
    } else {
        scientific(f)
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn significant(f: f64, digits: i32) -> String {
    let decimals = |exp: i32| (digits - 1 - exp).max(0) as usize;
    let exp = f.log10().floor() as i32;
    let s = format!("{:.*}", decimals(exp), f);
    // 99.96 rounds to "100.0", which is four digits.
    match s.parse::<f64>() {
        Ok(rounded) if rounded >= 10f64.powi(exp + 1) => format!("{:.*}", decimals(exp + 1), f),
        _ => s,
    }
}

fn scientific(f: f64) -> String {
    let s = format!("{f:.2e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => match exp.parse::<i32>() {
            Ok(e) => {
                let sign = if e < 0 { '-' } else { '+' };
                format!("{mantissa}e{sign}{:02}", e.abs())
            }
            Err(_) => s,
        },
        None => s,
    }
}

/* ----------------------------- AsciiDoc ----------------------------- */

const COLUMNS: [&str; 10] = [
    "Configuration",
    "Total time (s)",
    "GC time (s)",
    "GC count",
    "Allocations per GC",
    "Freed memory per minute",
    "Average pause (s)",
    "Average heap (Kb)",
    "Average free heap (Kb)",
    "Heap efficiency",
];

fn title_row() -> String {
    let mut row = String::new();
    for c in COLUMNS {
        row.push_str("| ");
        row.push_str(c);
        row.push(' ');
    }
    row.push('\n');
    row
}

fn cells(entry: &SeriesEntry) -> [String; 10] {
    let r = &entry.result;
    [
        entry.configuration.clone(),
        write_float(r.total_seconds),
        write_float(r.gc_seconds),
        r.gc_count.to_string(),
        r.allocations_per_gc.to_string(),
        write_float(r.freed_memory_per_min),
        write_float(r.average_pause),
        write_float(r.average_heap),
        write_float(r.average_free_heap),
        write_float(r.throughput),
    ]
}

/// Render the series as an AsciiDoc table with one navy section per workload.
pub fn to_asciidoc(series: &SeriesTable) -> String {
    let title = title_row();
    let mut out = String::new();

    out.push_str("[cols=\"^h,9*\", options=\"header,footer\"]\n");
    out.push_str("|===\n");
    out.push_str(&title);

    for (workload, entries) in series.iter() {
        out.push_str(&format!("{}+| [white]#{}#\n", COLUMNS.len(), workload));
        out.push_str("{set:cellbgcolor:navy}");
        for entry in entries {
            for cell in cells(entry) {
                out.push_str("| ");
                out.push_str(&cell);
                out.push_str("{set:cellbgcolor:white}");
            }
            out.push('\n');
        }
    }

    out.push_str(&title);
    out.push_str("|===\n");
    out
}

/// Render both report documents: (AsciiDoc table, SVG chart).
pub fn render(series: &SeriesTable, configuration_names: &[String]) -> (String, String) {
    let table = to_asciidoc(series);
    let chart = render_svg(&chart_geometry(series, configuration_names));
    (table, chart)
}

/* ----------------------------- Summary Table ----------------------------- */

/// Print per-workload results to stdout.
pub fn print_summary_table(outcome: &MatrixOutcome) {
    if outcome.success_count() == 0 {
        println!("No successful runs to display.");
        return;
    }

    let name_width = outcome
        .configurations
        .iter()
        .map(String::len)
        .max()
        .unwrap_or(13)
        .max(13);

    for (workload, entries) in outcome.series.iter() {
        println!();
        println!("{BOLD}{workload}{RESET}");
        println!(
            "{BOLD}{:<width$}  {:>10}  {:>10}  {:>6}  {:>12}  {:>10}  {:>10}{RESET}",
            "Configuration",
            "Total (s)",
            "GC (s)",
            "GC %",
            "Heap (Kb)",
            "Efficiency",
            "Pause (s)",
            width = name_width
        );
        println!(
            "{:-<width$}  {:-<10}  {:-<10}  {:-<6}  {:-<12}  {:-<10}  {:-<10}",
            "",
            "",
            "",
            "",
            "",
            "",
            "",
            width = name_width
        );

        if entries.is_empty() {
            println!("{RED}  no successful runs{RESET}");
            continue;
        }

        let fastest = entries
            .iter()
            .map(|e| e.result.total_seconds)
            .fold(f64::INFINITY, f64::min);

        for e in entries {
            let r = &e.result;
            let gc_share = gc_share(r);
            let color = if r.total_seconds == fastest { GREEN } else { "" };
            let share_color = if gc_share > 50.0 { YELLOW } else { "" };
            println!(
                "{color}{:<width$}  {:>10}  {:>10}{RESET}  \
                 {share_color}{:>5.1}%{RESET}  {:>12}  {:>10}  {:>10}",
                e.configuration,
                write_float(r.total_seconds),
                write_float(r.gc_seconds),
                gc_share,
                write_float(r.average_heap),
                write_float(r.throughput),
                write_float(r.average_pause),
                width = name_width,
            );
        }
    }

    println!();
    println!(
        "  {} configuration(s), {} workload(s), {} successful run(s)",
        outcome.configurations.len(),
        outcome.series.len(),
        outcome.success_count()
    );
}

fn gc_share(r: &RunResult) -> f64 {
    if r.total_seconds > 0.0 {
        r.gc_seconds / r.total_seconds * 100.0
    } else {
        0.0
    }
}

/// Print failed pairs to stdout. Prints nothing when every pair succeeded.
pub fn print_failures(failures: &[RunFailure]) {
    if failures.is_empty() {
        return;
    }

    println!();
    println!("{RED}{BOLD}{} failed run(s):{RESET}", failures.len());
    for f in failures {
        println!(
            "  {RED}[{:>5}]{RESET} {}/{}: {}",
            f.kind.to_string(),
            f.configuration,
            f.workload,
            f.message
        );
    }
}

/* ----------------------------- JSON ----------------------------- */

#[derive(Debug, Serialize, Deserialize)]
struct ResultsDocument {
    configurations: Vec<String>,
    workloads: Vec<WorkloadResults>,
    #[serde(default)]
    failures: Vec<RunFailure>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WorkloadResults {
    name: Workload,
    results: Vec<SeriesEntry>,
}

/// Serialize a matrix outcome for `results.json`.
pub fn to_json(outcome: &MatrixOutcome) -> Result<String, Error> {
    let doc = ResultsDocument {
        configurations: outcome.configurations.clone(),
        workloads: outcome
            .series
            .iter()
            .map(|(w, entries)| WorkloadResults {
                name: w.clone(),
                results: entries.to_vec(),
            })
            .collect(),
        failures: outcome.failures.clone(),
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Load a `results.json` written by [`to_json`].
pub fn from_json(json: &str) -> Result<MatrixOutcome, Error> {
    let doc: ResultsDocument = serde_json::from_str(json)?;

    let order: Vec<Workload> = doc.workloads.iter().map(|w| w.name.clone()).collect();
    let mut series = SeriesTable::new(&order);
    for w in doc.workloads {
        for entry in w.results {
            series.push(&w.name, &entry.configuration, entry.result);
        }
    }

    Ok(MatrixOutcome {
        configurations: doc.configurations,
        series,
        failures: doc.failures,
    })
}

/// Format validation results as a JSON array.
pub fn validate_to_json(checks: &[CheckResult]) -> String {
    let entries: Vec<serde_json::Value> = checks
        .iter()
        .map(|c| {
            serde_json::json!({
                "label": c.label,
                "status": match c.status {
                    CheckStatus::Ok => "ok",
                    CheckStatus::Warn => "warn",
                    CheckStatus::Fail => "fail",
                },
                "detail": c.detail,
            })
        })
        .collect();

    serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
}

/* ----------------------------- Tests ----------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::model::{FailureKind, RawMetrics};

    fn result(total: f64, gc_count: u64) -> RunResult {
        RunResult::new(RawMetrics {
            total_seconds: total,
            gc_seconds: 0.25,
            gc_count,
            allocations_per_gc: 1000,
            average_heap: 2048.0,
            average_free_heap: 512.0,
            average_pause: 0.0001,
            ..Default::default()
        })
        .unwrap()
    }

    fn outcome() -> MatrixOutcome {
        let wl = [Workload::from("listWithHoles"), Workload::from("diff")];
        let mut series = SeriesTable::new(&wl);
        series.push(&wl[0], "copy", result(12345.0, 7));
        series.push(&wl[0], "non_collecting", result(1.5, 0));
        MatrixOutcome {
            configurations: vec!["copy".into(), "non_collecting".into()],
            series,
            failures: vec![RunFailure {
                configuration: "copy".into(),
                workload: wl[1].clone(),
                kind: FailureKind::Execution,
                message: "process produced no output".into(),
            }],
        }
    }

    /// @test Grouped integers between 100 and 100000.
    #[test]
    fn write_float_grouped() {
        assert_eq!(write_float(12345.0), "12,345");
        assert_eq!(write_float(100.4), "100");
        assert_eq!(write_float(99999.4), "99,999");
        assert_eq!(write_float(1234.5678), "1,235");
    }

    /// @test Three significant digits between 0.001 and 100.
    #[test]
    fn write_float_significant() {
        assert_eq!(write_float(0.5), "0.500");
        assert_eq!(write_float(1.23456), "1.23");
        assert_eq!(write_float(42.0), "42.0");
        assert_eq!(write_float(100.0), "100");
        assert_eq!(write_float(0.0015), "0.00150");
        assert_eq!(write_float(9.999), "10.0");
    }

    /// @test Scientific notation at and beyond the edges.
    #[test]
    fn write_float_scientific() {
        assert_eq!(write_float(0.0001), "1.00e-04");
        assert_eq!(write_float(0.001), "1.00e-03");
        assert_eq!(write_float(0.0), "0.00e+00");
        assert_eq!(write_float(100_000.0), "1.00e+05");
        assert_eq!(write_float(123_456.0), "1.23e+05");
    }

    /// @test Table structure: header, sections, cell markers, footer.
    #[test]
    fn asciidoc_structure() {
        let doc = to_asciidoc(&outcome().series);
        let lines: Vec<&str> = doc.lines().collect();

        assert_eq!(lines[0], "[cols=\"^h,9*\", options=\"header,footer\"]");
        assert_eq!(lines[1], "|===");
        assert!(lines[2].starts_with("| Configuration "));
        assert_eq!(lines[3], "10+| [white]#listWithHoles#");
        assert!(lines[4].starts_with("{set:cellbgcolor:navy}| copy{set:cellbgcolor:white}"));
        assert!(lines[4].contains("| 12,345{set:cellbgcolor:white}"));
        assert!(lines[4].contains("| 7{set:cellbgcolor:white}"));
        assert!(lines[4].contains("| 1.00e-04{set:cellbgcolor:white}"));
        assert_eq!(lines[4].matches("{set:cellbgcolor:white}").count(), 10);
        assert!(doc.ends_with(&format!("{}|===\n", title_row())));
    }

    /// @test A workload without results keeps its section header.
    #[test]
    fn asciidoc_empty_section() {
        let doc = to_asciidoc(&outcome().series);
        assert!(doc.contains("10+| [white]#diff#\n{set:cellbgcolor:navy}| Configuration"));
    }

    /// @test render returns both documents.
    #[test]
    fn render_both() {
        let o = outcome();
        let (table, chart) = render(&o.series, &o.configurations);
        assert!(table.starts_with("[cols="));
        assert!(chart.contains("<svg"));
        assert!(chart.contains("listWithHoles"));
    }

    /// @test JSON export reloads to the same outcome.
    #[test]
    fn json_reload() {
        let o = outcome();
        let json = to_json(&o).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["workloads"][0]["name"], "listWithHoles");
        assert_eq!(parsed["workloads"][1]["results"].as_array().unwrap().len(), 0);
        assert_eq!(parsed["failures"][0]["kind"], "execution");

        let back = from_json(&json).unwrap();
        assert_eq!(back.configurations, o.configurations);
        assert_eq!(back.series, o.series);
        assert_eq!(back.failures, o.failures);
    }

    /// @test Malformed JSON is a JSON error.
    #[test]
    fn json_malformed() {
        assert!(matches!(from_json("{"), Err(Error::Json(_))));
    }

    /// @test A results file with impossible metrics is refused, not rendered.
    #[test]
    fn json_invalid_metrics_rejected() {
        let o = outcome();
        let mut doc: serde_json::Value = serde_json::from_str(&to_json(&o).unwrap()).unwrap();
        let stored = stored_mut(&mut doc);
        stored["total_seconds"] = serde_json::json!(-1.0);
        stored["average_heap"] = serde_json::json!(100.0);
        stored["average_free_heap"] = serde_json::json!(500.0);
        stored["throughput"] = serde_json::json!(7.5);

        let err = from_json(&doc.to_string()).unwrap_err();
        assert!(matches!(err, Error::Json(_)), "{err}");

        stored_mut(&mut doc)["total_seconds"] = serde_json::json!(1.0);
        assert!(matches!(from_json(&doc.to_string()), Err(Error::Json(_))));
        stored_mut(&mut doc)["average_free_heap"] = serde_json::json!(25.0);
        let back = from_json(&doc.to_string()).unwrap();
        let r = &back.series.get(&Workload::from("listWithHoles"))[0].result;
        assert!((r.throughput - 0.75).abs() < 1e-12);
    }

    fn stored_mut(doc: &mut serde_json::Value) -> &mut serde_json::Value {
        &mut doc["workloads"][0]["results"][0]["result"]
    }

    /// @test Validation JSON carries lowercase status.
    #[test]
    fn validate_json() {
        let checks = [CheckResult {
            label: "asciidoctor".into(),
            status: CheckStatus::Warn,
            detail: "not found".into(),
        }];
        let parsed: serde_json::Value = serde_json::from_str(&validate_to_json(&checks)).unwrap();
        assert_eq!(parsed[0]["status"], "warn");
    }
}
