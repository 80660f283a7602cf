//! Matrix description file and the command-backed launch/build capability.
//!
//! A matrix is described in JSON: the receiver the workload command is sent
//! to, the workload names, the analyzer invocation, and one entry per GC
//! configuration with its program, arguments and optional build step.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::model::{Configuration, Launch, Workload};
use super::{ConfigurationBuildError, Error};

/// Used when the matrix file does not set `timeout_secs`.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/* ----------------------------- MatrixConfig ----------------------------- */

/// Top-level matrix description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatrixConfig {
    /// Receiver of the `<receiver> new <workload>` command.
    pub receiver: String,
    pub workloads: Vec<String>,
    pub configurations: Vec<ConfigurationSpec>,
    /// Working directory of spawned processes; relative to the file.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// GC log written by the target, relative to `working_dir`.
    #[serde(default = "default_gc_log")]
    pub gc_log: PathBuf,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub analyzer: Option<AnalyzerSpec>,
}

/// One GC configuration of the target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigurationSpec {
    pub name: String,
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub build: Option<BuildSpec>,
}

/// Rebuild step shared by all configurations with the same `key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSpec {
    pub key: String,
    pub dir: PathBuf,
    /// Files removed before the commands run (e.g. a stale build cache).
    #[serde(default)]
    pub remove: Vec<PathBuf>,
    /// Commands run in order, each as an argv list.
    pub commands: Vec<Vec<String>>,
}

/// External GC-log analyzer invocation.
///
/// Arguments may contain `{gc_log}`, `{csv}` and `{plot}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyzerSpec {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_gc_log() -> PathBuf {
    PathBuf::from("gc.log")
}

impl MatrixConfig {
    /// Load and validate a matrix file. Relative directories are resolved
    /// against the file's parent directory and made absolute.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config: MatrixConfig = serde_json::from_str(&text)?;

        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let dir = match config.working_dir.take() {
            Some(dir) if dir.is_relative() => base.join(dir),
            Some(dir) => dir,
            None => base.to_path_buf(),
        };
        // Program paths are joined onto this and used after chdir.
        config.working_dir = Some(std::path::absolute(dir)?);

        config.validate()?;
        Ok(config)
    }

    /// Check names before they become directory components.
    pub fn validate(&self) -> Result<(), Error> {
        if self.configurations.is_empty() {
            return Err(Error::Config("no configurations defined".to_string()));
        }
        if self.workloads.is_empty() {
            return Err(Error::Config("no workloads defined".to_string()));
        }
        if self.receiver.trim().is_empty() {
            return Err(Error::Config("receiver must not be empty".to_string()));
        }

        check_names("configuration", self.configurations.iter().map(|c| c.name.as_str()))?;
        check_names("workload", self.workloads.iter().map(String::as_str))?;

        for spec in &self.configurations {
            if let Some(ref build) = spec.build {
                if build.commands.iter().any(Vec::is_empty) {
                    return Err(Error::Config(format!(
                        "configuration '{}' has an empty build command",
                        spec.name
                    )));
                }
            }
        }
        if let Some(0) = self.timeout_secs {
            return Err(Error::Config("timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn working_dir(&self) -> PathBuf {
        self.working_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn gc_log_path(&self) -> PathBuf {
        self.working_dir().join(&self.gc_log)
    }

    pub fn workload_list(&self) -> Vec<Workload> {
        self.workloads.iter().map(|w| Workload(w.clone())).collect()
    }

    /// Keep only the named configurations and workloads. Empty filters keep
    /// everything; unknown names are an error.
    pub fn retain(&mut self, configurations: &[String], workloads: &[String]) -> Result<(), Error> {
        for name in configurations {
            if !self.configurations.iter().any(|c| &c.name == name) {
                return Err(Error::InvalidArgs(format!("unknown configuration '{name}'")));
            }
        }
        for name in workloads {
            if !self.workloads.contains(name) {
                return Err(Error::InvalidArgs(format!("unknown workload '{name}'")));
            }
        }
        if !configurations.is_empty() {
            self.configurations.retain(|c| configurations.contains(&c.name));
        }
        if !workloads.is_empty() {
            self.workloads.retain(|w| workloads.contains(w));
        }
        Ok(())
    }

    /// Turn the specs into launchable configurations, in file order.
    pub fn configurations(&self) -> Vec<Configuration> {
        let cwd = self.working_dir();
        self.configurations
            .iter()
            .map(|spec| {
                Configuration::new(
                    spec.name.clone(),
                    CommandLauncher::new(spec.clone(), cwd.clone()),
                )
            })
            .collect()
    }
}

fn check_names<'a>(what: &str, names: impl Iterator<Item = &'a str>) -> Result<(), Error> {
    let mut seen = HashSet::new();
    for name in names {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\'])
            || name.chars().any(char::is_control)
        {
            return Err(Error::Config(format!("invalid {what} name {name:?}")));
        }
        if !seen.insert(name) {
            return Err(Error::Config(format!("duplicate {what} name '{name}'")));
        }
    }
    Ok(())
}

/* ----------------------------- Analyzer ----------------------------- */

impl AnalyzerSpec {
    /// Arguments with placeholders replaced.
    pub fn expand_args(&self, gc_log: &Path, csv: &Path, plot: &Path) -> Vec<String> {
        self.args
            .iter()
            .map(|a| {
                a.replace("{gc_log}", &gc_log.display().to_string())
                    .replace("{csv}", &csv.display().to_string())
                    .replace("{plot}", &plot.display().to_string())
            })
            .collect()
    }
}

/* ----------------------------- CommandLauncher ----------------------------- */

/// [`Launch`] backed by a program path, arguments and an argv build step.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    spec: ConfigurationSpec,
    cwd: PathBuf,
}

impl CommandLauncher {
    pub fn new(spec: ConfigurationSpec, cwd: PathBuf) -> Self {
        Self { spec, cwd }
    }

    /// Program path as the child will see it.
    pub fn program(&self) -> PathBuf {
        resolve(&self.cwd, &self.spec.program)
    }
}

impl Launch for CommandLauncher {
    fn build_key(&self) -> Option<&str> {
        self.spec.build.as_ref().map(|b| b.key.as_str())
    }

    fn build(&self) -> Result<(), ConfigurationBuildError> {
        let Some(ref build) = self.spec.build else {
            return Ok(());
        };
        let dir = resolve(&self.cwd, &build.dir);

        for file in &build.remove {
            let path = dir.join(file);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(ConfigurationBuildError::Clean { path, source }),
            }
        }

        for argv in &build.commands {
            let command = argv.join(" ");
            tracing::info!(
                configuration = %self.spec.name,
                dir = %dir.display(),
                "build: {command}"
            );
            let status = Command::new(&argv[0])
                .args(&argv[1..])
                .current_dir(&dir)
                .stdin(Stdio::null())
                .status()
                .map_err(|source| ConfigurationBuildError::Spawn {
                    command: command.clone(),
                    source,
                })?;
            if !status.success() {
                return Err(ConfigurationBuildError::Status {
                    command,
                    status: status.to_string(),
                });
            }
        }
        Ok(())
    }

    fn spawn(&self) -> std::io::Result<Child> {
        Command::new(self.program())
            .args(&self.spec.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
    }
}

/// Relative paths containing a separator are taken from `base`; bare names
/// are left for PATH lookup.
pub(super) fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() && path.components().count() > 1 {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

/* ----------------------------- Tests ----------------------------- */
