//! Environment validation: check that a matrix file can actually run here.
//!
//! Verifies the working directory, every configuration's program and build
//! directory, the GC-log analyzer, and the optional HTML renderer.

use std::path::Path;

use super::config::{resolve, MatrixConfig};
use super::{find_in_path, CheckResult, CheckStatus};

/* ----------------------------- API ----------------------------- */

/// Run all environment validation checks for a matrix. Returns a list of results.
pub fn run_checks(config: &MatrixConfig) -> Vec<CheckResult> {
    let cwd = config.working_dir();
    let mut results = vec![check_working_dir(&cwd)];

    for spec in &config.configurations {
        results.push(check_program(
            &format!("{} program", spec.name),
            &resolve(&cwd, &spec.program),
            CheckStatus::Fail,
        ));
        if let Some(ref build) = spec.build {
            results.push(check_build_dir(&spec.name, &resolve(&cwd, &build.dir)));
            if let Some(tool) = build.commands.first().and_then(|argv| argv.first()) {
                results.push(check_program(
                    &format!("{} build tool", spec.name),
                    Path::new(tool),
                    CheckStatus::Fail,
                ));
            }
        }
    }

    results.push(match config.analyzer {
        Some(ref analyzer) => check_program(
            "GC log analyzer",
            &resolve(&cwd, &analyzer.program),
            CheckStatus::Fail,
        ),
        None => CheckResult {
            label: "GC log analyzer".to_string(),
            status: CheckStatus::Warn,
            detail: "not configured; freed memory and pause metrics will be 0".to_string(),
        },
    });
    results.push(check_program(
        "asciidoctor",
        Path::new("asciidoctor"),
        CheckStatus::Warn,
    ));

    results
}

/// Print validation results in the `[  OK]` / `[WARN]` / `[FAIL]` format.
pub fn print_results(results: &[CheckResult]) {
    println!();
    println!("=== GC Benchmark Readiness Check ===");
    println!();

    let mut pass_count = 0;
    let mut warn_count = 0;
    let mut fail_count = 0;

    for r in results {
        let (tag, color) = match r.status {
            CheckStatus::Ok => {
                pass_count += 1;
                ("OK", "\x1b[92m")
            }
            CheckStatus::Warn => {
                warn_count += 1;
                ("WARN", "\x1b[93m")
            }
            CheckStatus::Fail => {
                fail_count += 1;
                ("FAIL", "\x1b[91m")
            }
        };
        println!("  {color}[{tag:>4}]\x1b[0m {:<30} {}", r.label, r.detail);
    }

    println!();
    println!("  ---");
    println!(
        "  {} passed, {} warnings, {} failures",
        pass_count, warn_count, fail_count
    );

    println!();
    if fail_count > 0 {
        println!("  Fix the failures above before running the matrix.");
    } else if warn_count > 0 {
        println!("  Matrix can run. Address warnings for complete reports.");
    } else {
        println!("  Environment is ready.");
    }
    println!();
}

/// Returns true if any check failed.
pub fn has_failures(results: &[CheckResult]) -> bool {
    results.iter().any(|r| r.status == CheckStatus::Fail)
}

/* ----------------------------- Individual Checks ----------------------------- */

fn check_working_dir(dir: &Path) -> CheckResult {
    if dir.is_dir() {
        CheckResult {
            label: "working directory".to_string(),
            status: CheckStatus::Ok,
            detail: dir.display().to_string(),
        }
    } else {
        CheckResult {
            label: "working directory".to_string(),
            status: CheckStatus::Fail,
            detail: format!("{} does not exist", dir.display()),
        }
    }
}

/// Paths with a directory part must exist; bare names are looked up in PATH.
fn check_program(label: &str, program: &Path, missing: CheckStatus) -> CheckResult {
    let found = if program.components().count() > 1 || program.is_absolute() {
        program.is_file().then(|| program.to_path_buf())
    } else {
        program.to_str().and_then(find_in_path)
    };

    match found {
        Some(path) => CheckResult {
            label: label.to_string(),
            status: CheckStatus::Ok,
            detail: format!("found at {}", path.display()),
        },
        None => CheckResult {
            label: label.to_string(),
            status: missing,
            detail: format!("{} not found", program.display()),
        },
    }
}

fn check_build_dir(configuration: &str, dir: &Path) -> CheckResult {
    let label = format!("{configuration} build dir");
    if dir.is_dir() {
        CheckResult {
            label,
            status: CheckStatus::Ok,
            detail: dir.display().to_string(),
        }
    } else {
        // Only a warning: the program may already be built.
        CheckResult {
            label,
            status: CheckStatus::Warn,
            detail: format!("{} does not exist; rebuilds will fail", dir.display()),
        }
    }
}

/* ----------------------------- Tests ----------------------------- */
