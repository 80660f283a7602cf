//! gcbench: garbage-collector benchmark matrix CLI.
//!
//! Runs a target under several GC configurations against a workload suite
//! and renders the comparison as an AsciiDoc table and an SVG chart.
//!
//! Usage:
//!   gcbench run --config matrix.json [--output-dir DIR]   # Run the whole matrix
//!   gcbench render <results.json> [--output-dir DIR]      # Re-render a previous run
//!   gcbench extract <stdout.log> --seconds S [--csv F]    # Metrics of one captured run
//!   gcbench validate --config matrix.json                 # Environment readiness

use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command as Process, ExitCode},
    time::Duration,
};

use clap::{Parser, Subcommand};
use gcbench::bench::{self, BenchmarkMatrix, BuildState, Error, MatrixConfig, MatrixOutcome, Runner};
use tracing_subscriber::EnvFilter;

const RESULTS_ADOC: &str = "results.adoc";
const CHART_SVG: &str = "chart.svg";
const RESULTS_JSON: &str = "results.json";

/* ----------------------------- CLI ----------------------------- */

#[derive(Parser, Debug)]
#[command(
    name = "gcbench",
    about = "Garbage-collector benchmark matrix runner and reporter",
    version
)]
struct Args {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every configuration against every workload and write the reports
    Run {
        /// Matrix description (JSON)
        #[arg(long)]
        config: PathBuf,

        /// Directory for per-run logs and the reports
        #[arg(long, default_value = "gc-results")]
        output_dir: PathBuf,

        /// Only run the named configuration (repeatable)
        #[arg(long = "config-filter")]
        config_filter: Vec<String>,

        /// Only run the named workload (repeatable)
        #[arg(long)]
        workload: Vec<String>,

        /// Per-run timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Render results.adoc to HTML with asciidoctor
        #[arg(long)]
        html: bool,

        /// Exit with code 1 if any run failed (CI mode)
        #[arg(long)]
        fail_on_error: bool,
    },

    /// Re-render the table and chart from a results.json
    Render {
        /// results.json written by `run`
        results: PathBuf,

        /// Output directory (defaults to the directory of results.json)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Extract metrics from a captured stdout log and print them as JSON
    Extract {
        /// Captured stdout of the target
        stdout_log: PathBuf,

        /// Analyzer CSV for the same run
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Wall-clock duration of the run in seconds
        #[arg(long)]
        seconds: f64,
    },

    /// Check that a matrix can run in this environment
    Validate {
        /// Matrix description (JSON)
        #[arg(long)]
        config: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/* ----------------------------- Main ----------------------------- */

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<(), Error> {
    match args.command {
        Command::Run {
            config,
            output_dir,
            config_filter,
            workload,
            timeout,
            html,
            fail_on_error,
        } => {
            let mut matrix_config = MatrixConfig::load(&config)?;
            matrix_config.retain(&config_filter, &workload)?;
            if let Some(secs) = timeout {
                if secs == 0 {
                    return Err(Error::InvalidArgs("--timeout must be positive".to_string()));
                }
                matrix_config.timeout_secs = Some(secs);
            }

            fs::create_dir_all(&output_dir)?;
            // The analyzer runs in the matrix working directory.
            let output_dir = std::path::absolute(&output_dir)?;
            let runner = Runner::from_config(&matrix_config, &output_dir);
            let configurations = matrix_config.configurations();
            let workloads = matrix_config.workload_list();

            tracing::info!(
                configurations = configurations.len(),
                workloads = workloads.len(),
                output = %output_dir.display(),
                "starting matrix"
            );
            let mut matrix = BenchmarkMatrix::new(runner, BuildState::new());
            let outcome = matrix.run_all(&configurations, &workloads);

            fs::write(output_dir.join(RESULTS_JSON), bench::to_json(&outcome)?)?;
            write_reports(&outcome, &output_dir)?;

            bench::print_summary_table(&outcome);
            bench::print_failures(&outcome.failures);

            if html {
                render_html(&output_dir);
            }

            if fail_on_error && outcome.has_failures() {
                return Err(Error::FailedRuns(outcome.failures.len()));
            }
        }

        Command::Render {
            results,
            output_dir,
        } => {
            let text = fs::read_to_string(&results)?;
            let outcome = bench::from_json(&text)?;
            let dir = output_dir.unwrap_or_else(|| {
                results
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."))
            });

            fs::create_dir_all(&dir)?;
            write_reports(&outcome, &dir)?;
            bench::print_summary_table(&outcome);
            bench::print_failures(&outcome.failures);
        }

        Command::Extract {
            stdout_log,
            csv,
            seconds,
        } => {
            let elapsed = Duration::try_from_secs_f64(seconds)
                .map_err(|e| Error::InvalidArgs(format!("--seconds {seconds}: {e}")))?;
            let raw = fs::read(&stdout_log)?;
            let log = csv.map(fs::read_to_string).transpose()?;

            let result = bench::extract(&raw, log.as_deref(), elapsed)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Command::Validate { config, json } => {
            let matrix_config = MatrixConfig::load(&config)?;
            let results = bench::run_checks(&matrix_config);

            if json {
                println!("{}", bench::validate_to_json(&results));
            } else {
                bench::print_results(&results);
            }

            if bench::has_failures(&results) {
                return Err(Error::Config("environment check failed".to_string()));
            }
        }
    }

    Ok(())
}

/// Write the AsciiDoc table and SVG chart of an outcome into `dir`.
fn write_reports(outcome: &MatrixOutcome, dir: &Path) -> Result<(), Error> {
    let (table, chart) = bench::render(&outcome.series, &outcome.configurations);
    fs::write(dir.join(RESULTS_ADOC), table)?;
    fs::write(dir.join(CHART_SVG), chart)?;
    tracing::info!(dir = %dir.display(), "reports written");
    Ok(())
}

/// HTML is a convenience; a missing or failing asciidoctor only warns.
fn render_html(dir: &Path) {
    let Some(asciidoctor) = bench::find_in_path("asciidoctor") else {
        tracing::warn!("asciidoctor not found in PATH; skipping HTML");
        return;
    };

    match Process::new(asciidoctor)
        .arg(RESULTS_ADOC)
        .current_dir(dir)
        .status()
    {
        Ok(status) if status.success() => {
            tracing::info!(dir = %dir.display(), "results.html written")
        }
        Ok(status) => tracing::warn!("asciidoctor exited with {status}"),
        Err(e) => tracing::warn!("asciidoctor failed to start: {e}"),
    }
}
