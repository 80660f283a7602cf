//! Single-run execution: spawn, send the workload command, capture, analyze.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use super::config::{resolve, AnalyzerSpec, MatrixConfig, DEFAULT_TIMEOUT_SECS};
use super::extract::extract;
use super::matrix::Execute;
use super::model::{Configuration, RunResult, Workload};
use super::{ExecutionError, ExecutionErrorKind};

/// Raw stdout of a run, kept for post-hoc inspection.
pub const STDOUT_LOG: &str = "stdout.log";
pub const STDERR_LOG: &str = "stderr.log";
/// Copy of the GC log the target wrote during the run.
pub const GC_LOG: &str = "gc.log";
/// Analyzer CSV consumed by the extractor.
pub const LOG_CSV: &str = "log.csv";
pub const PLOT_PNG: &str = "plot.png";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/* ----------------------------- Runner ----------------------------- */

/// Executes one configuration against one workload.
#[derive(Debug, Clone)]
pub struct Runner {
    receiver: String,
    output_dir: PathBuf,
    timeout: Duration,
    gc_log: Option<PathBuf>,
    analyzer: Option<AnalyzerSpec>,
    analyzer_dir: Option<PathBuf>,
}

impl Runner {
    pub fn new(receiver: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            receiver: receiver.into(),
            output_dir: output_dir.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            gc_log: None,
            analyzer: None,
            analyzer_dir: None,
        }
    }

    pub fn from_config(config: &MatrixConfig, output_dir: impl Into<PathBuf>) -> Self {
        let mut runner = Self::new(config.receiver.clone(), output_dir)
            .with_timeout(config.timeout())
            .with_gc_log(config.gc_log_path());
        if let Some(ref analyzer) = config.analyzer {
            let cwd = config.working_dir();
            let analyzer = AnalyzerSpec {
                program: resolve(&cwd, &analyzer.program),
                args: analyzer.args.clone(),
            };
            runner = runner.with_analyzer(analyzer).with_analyzer_dir(cwd);
        }
        runner
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// GC log the target writes; copied into the run directory after exit.
    pub fn with_gc_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.gc_log = Some(path.into());
        self
    }

    pub fn with_analyzer(mut self, analyzer: AnalyzerSpec) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Directory the analyzer runs in; relative analyzer paths resolve here.
    pub fn with_analyzer_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.analyzer_dir = Some(dir.into());
        self
    }

    /// `<output>/<configuration>/<workload>/`
    pub fn run_dir(&self, configuration: &str, workload: &Workload) -> PathBuf {
        self.output_dir.join(configuration).join(workload.name())
    }

    /// `<receiver> new <workload>\n` followed by a NUL terminator.
    pub fn request(&self, workload: &Workload) -> Vec<u8> {
        let mut req = format!("{} new {}\n", self.receiver, workload).into_bytes();
        req.push(0);
        req
    }

    /// Run one pair. Errors are tagged with the pair.
    pub fn execute(
        &self,
        configuration: &Configuration,
        workload: &Workload,
    ) -> Result<RunResult, ExecutionError> {
        self.execute_inner(configuration, workload)
            .map_err(|kind| ExecutionError::new(&configuration.name, workload.name(), kind))
    }

    fn execute_inner(
        &self,
        configuration: &Configuration,
        workload: &Workload,
    ) -> Result<RunResult, ExecutionErrorKind> {
        if let Some(ref gc_log) = self.gc_log {
            remove_if_exists(gc_log)?;
        }

        let child = configuration
            .launcher
            .spawn()
            .map_err(ExecutionErrorKind::Spawn)?;
        tracing::debug!(pid = child.id(), "spawned {}", configuration.name);

        let started = Instant::now();
        let captured = communicate(child, &self.request(workload), self.timeout)?;
        let elapsed = started.elapsed();

        if !captured.status.success() {
            tracing::warn!(
                configuration = %configuration.name,
                workload = %workload,
                "target exited with {}",
                captured.status
            );
        }

        let dir = self.run_dir(&configuration.name, workload);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(STDOUT_LOG), &captured.stdout)?;
        std::fs::write(dir.join(STDERR_LOG), &captured.stderr)?;

        if captured.stdout.iter().all(u8::is_ascii_whitespace) {
            return Err(ExecutionErrorKind::EmptyOutput);
        }

        let log_csv = self.analyze(&dir)?;
        let result = extract(&captured.stdout, log_csv.as_deref(), elapsed)?;
        Ok(result)
    }

    /// Copy the GC log, run the analyzer on it, return the CSV if one exists.
    ///
    /// A missing log or analyzer is not an error: CSV-derived metrics then
    /// default to zero.
    fn analyze(&self, dir: &Path) -> io::Result<Option<String>> {
        let csv_path = dir.join(LOG_CSV);
        let run_gc_log = dir.join(GC_LOG);
        remove_if_exists(&csv_path)?;
        remove_if_exists(&run_gc_log)?;

        match self.gc_log {
            Some(ref source) if source.is_file() => {
                std::fs::copy(source, &run_gc_log)?;
            }
            Some(ref source) => {
                tracing::debug!("no GC log at {}", source.display());
            }
            None => {}
        }

        if let Some(ref analyzer) = self.analyzer {
            if run_gc_log.is_file() {
                run_analyzer(
                    analyzer,
                    self.analyzer_dir.as_deref(),
                    &run_gc_log,
                    &csv_path,
                    &dir.join(PLOT_PNG),
                );
            }
        }

        read_log_csv(&csv_path)
    }
}

impl Execute for Runner {
    fn run(
        &mut self,
        configuration: &Configuration,
        workload: &Workload,
    ) -> Result<RunResult, ExecutionError> {
        self.execute(configuration, workload)
    }
}

/* ----------------------------- Helpers ----------------------------- */

struct Captured {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Write the request, close stdin, and wait for exit with a deadline.
///
/// Pipes are drained on helper threads while the child runs. The deadline
/// also bounds the pipe reads: a background process that inherited stdout
/// keeps it open after the child exits.
fn communicate(
    mut child: Child,
    request: &[u8],
    timeout: Duration,
) -> Result<Captured, ExecutionErrorKind> {
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    if let Some(mut stdin) = child.stdin.take() {
        // A target that exits before reading closes the pipe; its output
        // still decides the outcome.
        match stdin.write_all(request) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        }
    }

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExecutionErrorKind::Timeout(timeout));
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    };

    Ok(Captured {
        status,
        stdout: collect(stdout, deadline, timeout)?,
        stderr: collect(stderr, deadline, timeout)?,
    })
}

type Drained = Receiver<io::Result<Vec<u8>>>;

fn drain<R: Read + Send + 'static>(mut pipe: R) -> Drained {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let result = pipe.read_to_end(&mut buf).map(|_| buf);
        let _ = tx.send(result);
    });
    rx
}

/// Wait for a drained pipe until the run deadline.
///
/// On expiry the reader thread is left behind; it ends when the last
/// holder of the pipe exits.
fn collect(
    pipe: Option<Drained>,
    deadline: Instant,
    timeout: Duration,
) -> Result<Vec<u8>, ExecutionErrorKind> {
    let Some(rx) = pipe else {
        return Ok(Vec::new());
    };
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(result) => Ok(result?),
        Err(RecvTimeoutError::Timeout) => Err(ExecutionErrorKind::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => {
            Err(io::Error::other("output reader panicked").into())
        }
    }
}

fn run_analyzer(
    analyzer: &AnalyzerSpec,
    cwd: Option<&Path>,
    gc_log: &Path,
    csv: &Path,
    plot: &Path,
) {
    let args = analyzer.expand_args(gc_log, csv, plot);
    tracing::debug!(
        "analyzer: {} {}",
        analyzer.program.display(),
        args.join(" ")
    );
    let mut cmd = Command::new(&analyzer.program);
    cmd.args(&args).stdin(Stdio::null());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    match cmd.output() {
        Ok(out) if out.status.success() => {}
        Ok(out) => tracing::warn!(
            "analyzer exited with {}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        ),
        Err(e) => tracing::warn!("analyzer {} failed to start: {e}", analyzer.program.display()),
    }
}

/// Analyzer CSV text, if the analyzer wrote one.
///
/// The analyzer's locale decides the encoding; invalid UTF-8 is replaced so
/// that only the affected keys go unrecognized.
fn read_log_csv(path: &Path) -> io::Result<Option<String>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/* ----------------------------- Tests ----------------------------- */

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::bench::model::Launch;

    struct Sh(String);

    impl Launch for Sh {
        fn spawn(&self) -> io::Result<Child> {
            Command::new("sh")
                .arg("-c")
                .arg(&self.0)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
        }
    }

    struct Missing;

    impl Launch for Missing {
        fn spawn(&self) -> io::Result<Child> {
            Command::new("/nonexistent/llst")
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .spawn()
        }
    }

    fn target(gc_count: u32) -> String {
        format!(
            "read line; printf 'got %s\\n\
             GC count: {gc_count} (1/1), average allocations per gc: 10, \
             microseconds spent in GC: 1000\\n\
             Heap size (Kb*s): 50, Free heap size (Kb*s): 10\\n->\\n' \"$line\""
        )
    }

    /// @test Request line names receiver and workload and ends with NUL.
    #[test]
    fn request_format() {
        let runner = Runner::new("GCStressTest", "/tmp");
        assert_eq!(
            runner.request(&Workload::from("treeTest")),
            b"GCStressTest new treeTest\n\0"
        );
    }

    /// @test Successful run parses output and persists stdout.
    #[test]
    fn successful_run() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Runner::new("GCStressTest", dir.path());
        let cfg = Configuration::new("copy", Sh(target(2)));
        let wl = Workload::from("listWithHoles");

        let r = runner.execute(&cfg, &wl).unwrap();
        assert_eq!(r.gc_count, 2);
        assert_eq!(r.allocations_per_gc, 10);
        assert!((r.gc_seconds - 0.001).abs() < 1e-12);
        assert!(r.total_seconds > 0.0);
        assert!((r.throughput - 0.8).abs() < 1e-9);

        let log =
            std::fs::read_to_string(dir.path().join("copy/listWithHoles/stdout.log")).unwrap();
        assert!(log.starts_with("got GCStressTest new listWithHoles"));
    }

    /// @test Repeated runs overwrite the previous stdout log.
    #[test]
    fn logs_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Runner::new("GCStressTest", dir.path());
        let wl = Workload::from("treeTest");
        runner.execute(&Configuration::new("copy", Sh(target(1))), &wl).unwrap();
        runner.execute(&Configuration::new("copy", Sh(target(7))), &wl).unwrap();

        let log = std::fs::read_to_string(runner.run_dir("copy", &wl).join(STDOUT_LOG)).unwrap();
        assert!(log.contains("GC count: 7"));
        assert!(!log.contains("GC count: 1 "));
    }

    /// @test Empty output fails after the (empty) log is written.
    #[test]
    fn empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Runner::new("GCStressTest", dir.path());
        let cfg = Configuration::new("copy", Sh("cat > /dev/null".into()));
        let wl = Workload::from("diff");

        let err = runner.execute(&cfg, &wl).unwrap_err();
        assert!(matches!(err.kind, ExecutionErrorKind::EmptyOutput));
        assert_eq!(err.configuration, "copy");
        assert_eq!(err.workload, "diff");
        assert!(runner.run_dir("copy", &wl).join(STDOUT_LOG).is_file());
    }

    /// @test Malformed summary surfaces as a wrapped extraction error.
    #[test]
    fn extraction_failure_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Runner::new("GCStressTest", dir.path());
        let script = "echo a; echo 'GC count: x'; echo b; echo c";
        let cfg = Configuration::new("copy", Sh(script.into()));
        let err = runner.execute(&cfg, &Workload::from("diff")).unwrap_err();
        assert!(matches!(err.kind, ExecutionErrorKind::Extraction(_)));
    }

    /// @test A hung child is killed at the deadline.
    #[test]
    fn timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let runner =
            Runner::new("GCStressTest", dir.path()).with_timeout(Duration::from_millis(200));
        let cfg = Configuration::new("copy", Sh("exec sleep 30".into()));

        let started = Instant::now();
        let err = runner.execute(&cfg, &Workload::from("treeTest")).unwrap_err();
        assert!(matches!(err.kind, ExecutionErrorKind::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    /// @test A background process holding stdout open cannot outlast the deadline.
    #[test]
    fn timeout_bounds_inherited_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let runner =
            Runner::new("GCStressTest", dir.path()).with_timeout(Duration::from_millis(500));
        let cfg = Configuration::new("copy", Sh("sleep 6 & echo started".into()));

        let started = Instant::now();
        let err = runner.execute(&cfg, &Workload::from("treeTest")).unwrap_err();
        assert!(matches!(err.kind, ExecutionErrorKind::Timeout(_)), "{err}");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    /// @test A missing binary fails to spawn.
    #[test]
    fn spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Runner::new("GCStressTest", dir.path());
        let err = runner
            .execute(&Configuration::new("copy", Missing), &Workload::from("diff"))
            .unwrap_err();
        assert!(matches!(err.kind, ExecutionErrorKind::Spawn(_)));
    }

    /// @test The analyzer turns the copied GC log into CSV metrics.
    #[test]
    fn analyzer_feeds_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let gc_log = dir.path().join("gc.log");
        let analyzer = AnalyzerSpec {
            program: PathBuf::from("sh"),
            args: vec![
                "-c".into(),
                "test -f \"$1\" && printf 'avgPause;0,5;s\\navgPauseσ;0,25;s\\n' > \"$2\"".into(),
                "analyzer".into(),
                "{gc_log}".into(),
                "{csv}".into(),
            ],
        };
        let out = dir.path().join("out");
        let runner = Runner::new("GCStressTest", &out)
            .with_gc_log(&gc_log)
            .with_analyzer(analyzer);
        let script = format!("echo gc-events > '{}'; {}", gc_log.display(), target(3));
        let cfg = Configuration::new("copy", Sh(script));
        let wl = Workload::from("treeTest");

        let r = runner.execute(&cfg, &wl).unwrap();
        assert!((r.average_pause - 0.5).abs() < 1e-12);
        assert!((r.pause_deviation - 0.25).abs() < 1e-12);
        assert!(runner.run_dir("copy", &wl).join(GC_LOG).is_file());
    }

    /// @test A failing analyzer leaves CSV metrics at zero.
    #[test]
    fn analyzer_failure_defaults_zero() {
        let dir = tempfile::tempdir().unwrap();
        let gc_log = dir.path().join("gc.log");
        let analyzer = AnalyzerSpec {
            program: PathBuf::from("/nonexistent/java"),
            args: vec![],
        };
        let runner = Runner::new("GCStressTest", dir.path().join("out"))
            .with_gc_log(&gc_log)
            .with_analyzer(analyzer);
        let script = format!("echo x > '{}'; {}", gc_log.display(), target(3));
        let r = runner
            .execute(&Configuration::new("copy", Sh(script)), &Workload::from("diff"))
            .unwrap();
        assert_eq!(r.average_pause, 0.0);
        assert_eq!(r.freed_memory_per_min, 0.0);
    }

    /// @test A log CSV in a legacy encoding is decoded lossily.
    #[test]
    fn non_utf8_log_csv() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join(LOG_CSV);
        let mut bytes = b"accumPause;0,25;s\navgPause".to_vec();
        bytes.push(0xE5);
        bytes.extend_from_slice(b";0,1;s\n");
        std::fs::write(&csv, bytes).unwrap();

        let text = read_log_csv(&csv).unwrap().unwrap();
        assert!(text.starts_with("accumPause;0,25;s\n"));
        assert!(text.contains('\u{FFFD}'));
        assert!(read_log_csv(&dir.path().join("absent.csv")).unwrap().is_none());
    }

    /// @test A non-UTF-8 analyzer CSV does not fail the run.
    #[test]
    fn non_utf8_analyzer_output() {
        let dir = tempfile::tempdir().unwrap();
        let gc_log = dir.path().join("gc.log");
        let analyzer = AnalyzerSpec {
            program: PathBuf::from("sh"),
            args: vec![
                "-c".into(),
                "printf 'accumPause;0,25;s\\navgPause\\345;0,1;s\\n' > \"$1\"".into(),
                "analyzer".into(),
                "{csv}".into(),
            ],
        };
        let runner = Runner::new("GCStressTest", dir.path().join("out"))
            .with_gc_log(&gc_log)
            .with_analyzer(analyzer);
        let script = format!("echo x > '{}'; {}", gc_log.display(), target(3));
        let r = runner
            .execute(&Configuration::new("copy", Sh(script)), &Workload::from("diff"))
            .unwrap();
        assert!((r.gc_seconds - 0.25).abs() < 1e-12);
        assert_eq!(r.average_pause, 0.0);
    }
}
