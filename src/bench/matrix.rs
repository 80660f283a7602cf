//! Configuration x workload matrix with per-run failure isolation.
//!
//! Configurations form the outer loop because switching one may require a
//! rebuild of the target. The build currently in place is tracked in
//! [`BuildState`] so configurations sharing a build key rebuild only once.

use super::model::{
    Configuration, FailureKind, MatrixOutcome, RunFailure, RunResult, SeriesTable, Workload,
};
use super::ExecutionError;

/* ----------------------------- Execute ----------------------------- */

/// Runs one (configuration, workload) pair.
pub trait Execute {
    fn run(
        &mut self,
        configuration: &Configuration,
        workload: &Workload,
    ) -> Result<RunResult, ExecutionError>;
}

/* ----------------------------- BuildState ----------------------------- */

/// Build key of the target build currently in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildState {
    current: Option<String>,
}

impl BuildState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for a build that is already in place before the matrix starts.
    pub fn with_current(key: impl Into<String>) -> Self {
        Self {
            current: Some(key.into()),
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// The only mutator; `None` means the in-place build is unknown.
    pub fn set_current(&mut self, key: Option<&str>) {
        self.current = key.map(str::to_string);
    }

    fn needs_build(&self, key: Option<&str>) -> bool {
        match key {
            Some(k) => self.current() != Some(k),
            None => false,
        }
    }
}

/* ----------------------------- BenchmarkMatrix ----------------------------- */

/// Drives an executor over every (configuration, workload) pair, in order.
pub struct BenchmarkMatrix<E> {
    executor: E,
    state: BuildState,
}

impl<E: Execute> BenchmarkMatrix<E> {
    pub fn new(executor: E, state: BuildState) -> Self {
        Self { executor, state }
    }

    pub fn state(&self) -> &BuildState {
        &self.state
    }

    pub fn into_executor(self) -> E {
        self.executor
    }

    /// Run everything sequentially. A failed pair is recorded and skipped; a
    /// failed build skips only that configuration's workloads.
    pub fn run_all(
        &mut self,
        configurations: &[Configuration],
        workloads: &[Workload],
    ) -> MatrixOutcome {
        let mut outcome = MatrixOutcome {
            configurations: configurations.iter().map(|c| c.name.clone()).collect(),
            series: SeriesTable::new(workloads),
            failures: Vec::new(),
        };

        for configuration in configurations {
            if let Err(message) = self.ensure_built(configuration) {
                for workload in workloads {
                    outcome.failures.push(RunFailure {
                        configuration: configuration.name.clone(),
                        workload: workload.clone(),
                        kind: FailureKind::Build,
                        message: message.clone(),
                    });
                }
                continue;
            }

            for workload in workloads {
                tracing::info!(
                    configuration = %configuration.name,
                    workload = %workload,
                    "running"
                );
                match self.executor.run(configuration, workload) {
                    Ok(result) => {
                        tracing::info!(
                            configuration = %configuration.name,
                            workload = %workload,
                            total_s = result.total_seconds,
                            gc_s = result.gc_seconds,
                            "done"
                        );
                        outcome.series.push(workload, &configuration.name, result);
                    }
                    Err(e) => {
                        tracing::warn!("{e}");
                        outcome.failures.push(RunFailure {
                            configuration: configuration.name.clone(),
                            workload: workload.clone(),
                            kind: FailureKind::Execution,
                            message: e.kind.to_string(),
                        });
                    }
                }
            }
        }

        outcome
    }

    fn ensure_built(&mut self, configuration: &Configuration) -> Result<(), String> {
        let key = configuration.launcher.build_key();
        if !self.state.needs_build(key) {
            return Ok(());
        }

        tracing::info!(configuration = %configuration.name, key = ?key, "rebuilding target");
        match configuration.launcher.build() {
            Ok(()) => {
                self.state.set_current(key);
                Ok(())
            }
            Err(e) => {
                tracing::error!(configuration = %configuration.name, "build failed: {e}");
                // Whatever is on disk now is a half-finished build.
                self.state.set_current(None);
                Err(e.to_string())
            }
        }
    }
}

/* ----------------------------- Tests ----------------------------- */
