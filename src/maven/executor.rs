//! Build executor: runs Maven tasks as isolated subprocesses

use crate::core::config::ExecutorConfig;
use crate::core::error::{BuildError, SyncResult};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// A task the build tool can run in a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildTask {
  /// Rewrite declared dependency versions to their latest releases
  NormalizeDependencies,
  /// `release:clean`
  Clean,
  /// `release:prepare` with explicit versions
  Prepare {
    release_version: String,
    development_version: String,
  },
  /// `release:perform`
  Perform,
  /// Plain build and local install
  Install,
}

impl BuildTask {
  /// Maven goals for this task
  pub fn goals(&self) -> &'static [&'static str] {
    match self {
      BuildTask::NormalizeDependencies => &["versions:use-latest-releases"],
      BuildTask::Clean => &["release:clean"],
      BuildTask::Prepare { .. } => &["release:prepare"],
      BuildTask::Perform => &["release:perform"],
      BuildTask::Install => &["clean", "install"],
    }
  }

  /// `-D` parameters for this task, in a stable order
  pub fn parameters(&self) -> BTreeMap<&'static str, String> {
    let mut params = BTreeMap::new();
    match self {
      BuildTask::NormalizeDependencies => {
        params.insert("generateBackupPoms", "false".to_string());
      }
      BuildTask::Prepare {
        release_version,
        development_version,
      } => {
        params.insert("releaseVersion", release_version.clone());
        params.insert("developmentVersion", development_version.clone());
      }
      BuildTask::Clean | BuildTask::Perform | BuildTask::Install => {}
    }
    params
  }
}

impl fmt::Display for BuildTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.goals().join(" "))
  }
}

/// Runs build tasks in a repository's working directory
pub trait BuildExecutor {
  fn execute(&self, task: &BuildTask, dir: &Path) -> SyncResult<()>;
}

/// Maven invoked through the configured program
pub struct MavenExecutor {
  program: String,
  args: Vec<String>,
  skip_tests: bool,
}

impl MavenExecutor {
  pub fn new(config: &ExecutorConfig) -> Self {
    Self {
      program: config.program.clone(),
      args: config.args.clone(),
      skip_tests: config.skip_tests,
    }
  }

  /// Full argument list for a task
  pub fn command_args(&self, task: &BuildTask) -> Vec<String> {
    let mut args = self.args.clone();
    args.extend(task.goals().iter().map(|g| g.to_string()));
    for (key, value) in task.parameters() {
      args.push(format!("-D{}={}", key, value));
    }
    if self.skip_tests {
      args.push("-DskipTests=true".to_string());
    }
    args
  }
}

impl BuildExecutor for MavenExecutor {
  fn execute(&self, task: &BuildTask, dir: &Path) -> SyncResult<()> {
    let args = self.command_args(task);
    info!(task = %task, dir = %dir.display(), "running build task");
    debug!("{} {}", self.program, args.join(" "));

    let output = Command::new(&self.program)
      .current_dir(dir)
      .args(&args)
      .output()
      .map_err(|e| BuildError::Launch {
        program: self.program.clone(),
        reason: e.to_string(),
      })?;

    if !output.status.success() {
      // Maven reports failures on stdout
      let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
      combined.push_str(&String::from_utf8_lossy(&output.stderr));
      return Err(
        BuildError::TaskFailed {
          task: task.to_string(),
          dir: dir.to_path_buf(),
          output: tail_lines(&combined, 40),
        }
        .into(),
      );
    }

    Ok(())
  }
}

/// Last `n` lines of build output
fn tail_lines(output: &str, n: usize) -> String {
  let lines: Vec<&str> = output.lines().collect();
  let start = lines.len().saturating_sub(n);
  lines[start..].join("\n")
}
