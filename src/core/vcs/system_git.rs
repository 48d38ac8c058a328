//! System git backend
//!
//! Every operation is one or two `git` subprocess calls with an isolated
//! environment, so user-level git config can't change release behaviour.

use super::{Repository, VcsBackend};
use crate::core::credentials::Credentials;
use crate::core::error::{GitError, SyncError, SyncResult, ResultExt};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Opens [`SystemGit`] handles sharing one set of credentials
pub struct SystemGitBackend {
  ssh_command: Option<String>,
}

impl SystemGitBackend {
  pub fn new(credentials: Option<&Credentials>) -> Self {
    Self {
      ssh_command: credentials.map(Credentials::ssh_command),
    }
  }
}

impl VcsBackend for SystemGitBackend {
  fn open(&self, path: &Path) -> SyncResult<Box<dyn Repository>> {
    Ok(Box::new(SystemGit::open(path, self.ssh_command.clone())?))
  }
}

/// Git backend using system git
pub struct SystemGit {
  /// Repository working directory
  pub(crate) repo_path: PathBuf,

  /// `GIT_SSH_COMMAND` for transport operations
  pub(crate) ssh_command: Option<String>,
}

impl SystemGit {
  /// Open a git repository
  ///
  /// Fails unless `path` is the top level of a work tree; a nested project
  /// without its own checkout must not be treated as one.
  pub fn open(path: &Path, ssh_command: Option<String>) -> SyncResult<Self> {
    let git = Self {
      repo_path: path.to_path_buf(),
      ssh_command,
    };

    let output = git
      .git_cmd()
      .args(["rev-parse", "--show-toplevel"])
      .output()
      .context("Failed to execute git rev-parse")?;

    if !output.status.success() {
      return Err(GitError::RepoNotFound {
        path: path.to_path_buf(),
      }
      .into());
    }

    let top_level = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
    let same = match (top_level.canonicalize(), path.canonicalize()) {
      (Ok(a), Ok(b)) => a == b,
      _ => top_level == path,
    };
    if !same {
      return Err(GitError::RepoNotFound {
        path: path.to_path_buf(),
      }
      .into());
    }

    Ok(git)
  }

  /// Create a safe git command with isolated environment
  ///
  /// - Sets working directory to repo path
  /// - Clears environment variables (see [`isolated_git`])
  /// - Adds safe configuration overrides
  pub(crate) fn git_cmd(&self) -> Command {
    let mut cmd = isolated_git(self.ssh_command.as_deref());
    cmd.arg("-C").arg(&self.repo_path);
    cmd
  }

  /// Run a git command, returning trimmed stdout
  pub(crate) fn run(&self, args: &[&str]) -> SyncResult<String> {
    let output = self
      .git_cmd()
      .args(args)
      .output()
      .with_context(|| format!("Failed to execute git {}", args.join(" ")))?;
    check(args, &output)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }
}

/// `git` with a cleared environment
///
/// Only PATH, HOME and the SSH agent socket survive; `GIT_SSH_COMMAND` is
/// set from the credentials when present.
pub(crate) fn isolated_git(ssh_command: Option<&str>) -> Command {
  let mut cmd = Command::new("git");

  cmd.env_clear();
  for var in ["PATH", "HOME", "SSH_AUTH_SOCK"] {
    if let Ok(value) = std::env::var(var) {
      cmd.env(var, value);
    }
  }
  if let Some(ssh) = ssh_command {
    cmd.env("GIT_SSH_COMMAND", ssh);
  }
  // never block on a credential prompt
  cmd.env("GIT_TERMINAL_PROMPT", "0");

  cmd.arg("-c").arg("advice.detachedHead=false");
  cmd.arg("-c").arg("core.quotePath=false");

  cmd
}

/// Turn a non-zero exit into a typed error
pub(crate) fn check(args: &[&str], output: &Output) -> SyncResult<()> {
  if output.status.success() {
    return Ok(());
  }
  Err(SyncError::Git(GitError::CommandFailed {
    command: format!("git {}", args.join(" ")),
    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
  }))
}
