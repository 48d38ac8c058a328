//! Error types for release-sync with contextual messages and exit codes
//!
//! Errors fall into two scopes. Batch-level errors (config, credentials,
//! discovery, registry) abort the run with a non-zero exit code.
//! Repository-level errors are caught by the orchestrator, logged against
//! the repository and followed by a recovery reset.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for release-sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
  /// User error (config, invalid args, missing files)
  User = 1,
  /// System error (git, network, I/O, build tool)
  System = 2,
  /// Validation failure (credentials, malformed manifests or versions)
  Validation = 3,
}

impl ExitCode {
  /// Convert to i32 for process exit
  pub fn as_i32(self) -> i32 {
    self as i32
  }
}

/// Main error type for release-sync
#[derive(Debug, Error)]
pub enum SyncError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Git(#[from] GitError),

  #[error(transparent)]
  Build(#[from] BuildError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Version(#[from] VersionError),

  /// Directory walk failures; these abort the whole batch
  #[error("Discovery failed under {}: {reason}", .path.display())]
  Discovery { path: PathBuf, reason: String },

  #[error("I/O error: {0}")]
  Io(#[from] io::Error),

  /// Generic error with message and optional context
  #[error("{message}{}", .context.as_ref().map(|c| format!("\n{}", c)).unwrap_or_default())]
  Message {
    message: String,
    context: Option<String>,
    help: Option<String>,
  },
}

impl SyncError {
  /// Create a simple error message
  pub fn message(msg: impl Into<String>) -> Self {
    SyncError::Message {
      message: msg.into(),
      context: None,
      help: None,
    }
  }

  /// Create an error with help text
  pub fn with_help(msg: impl Into<String>, help: impl Into<String>) -> Self {
    SyncError::Message {
      message: msg.into(),
      context: None,
      help: Some(help.into()),
    }
  }

  /// Add context to an existing error
  ///
  /// Typed errors are wrapped into a message so the context is never lost.
  pub fn context(self, ctx: impl Into<String>) -> Self {
    let ctx_str = ctx.into();
    match self {
      SyncError::Message { message, context, help } => SyncError::Message {
        message,
        context: Some(context.map(|c| format!("{}\n{}", ctx_str, c)).unwrap_or(ctx_str)),
        help,
      },
      other => {
        let help = other.help_message();
        SyncError::Message {
          message: other.to_string(),
          context: Some(ctx_str),
          help,
        }
      }
    }
  }

  /// Get the appropriate exit code for this error
  pub fn exit_code(&self) -> ExitCode {
    match self {
      SyncError::Config(ConfigError::Credentials { .. }) => ExitCode::Validation,
      SyncError::Config(_) => ExitCode::User,
      SyncError::Git(_) | SyncError::Build(_) | SyncError::Io(_) | SyncError::Discovery { .. } => ExitCode::System,
      SyncError::Manifest(_) | SyncError::Version(_) => ExitCode::Validation,
      SyncError::Message { .. } => ExitCode::User,
    }
  }

  /// Get contextual help message for this error
  pub fn help_message(&self) -> Option<String> {
    match self {
      SyncError::Config(e) => e.help_message(),
      SyncError::Git(e) => e.help_message(),
      SyncError::Build(e) => e.help_message(),
      SyncError::Discovery { .. } => {
        Some("Fix the directory permissions or add the path to `exclude` in release-sync.toml.".to_string())
      }
      SyncError::Message { help, .. } => help.clone(),
      _ => None,
    }
  }
}

impl From<toml_edit::TomlError> for SyncError {
  fn from(err: toml_edit::TomlError) -> Self {
    SyncError::Config(ConfigError::Parse { reason: err.to_string() })
  }
}

impl From<toml_edit::de::Error> for SyncError {
  fn from(err: toml_edit::de::Error) -> Self {
    SyncError::Config(ConfigError::Parse { reason: err.to_string() })
  }
}

impl From<serde_json::Error> for SyncError {
  fn from(err: serde_json::Error) -> Self {
    SyncError::message(format!("JSON error: {}", err))
  }
}

impl From<walkdir::Error> for SyncError {
  fn from(err: walkdir::Error) -> Self {
    let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
    SyncError::Discovery {
      path,
      reason: err.to_string(),
    }
  }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("No release-sync configuration found at {}", .path.display())]
  NotFound { path: PathBuf },

  #[error("Failed to parse configuration: {reason}")]
  Parse { reason: String },

  #[error("Invalid configuration value for `{field}`: {reason}")]
  Invalid { field: String, reason: String },

  #[error("Failed to load credentials from {}: {reason}", .path.display())]
  Credentials { path: PathBuf, reason: String },
}

impl ConfigError {
  fn help_message(&self) -> Option<String> {
    match self {
      ConfigError::NotFound { .. } => {
        Some("Create release-sync.toml with at least `repos_location = \"/path/to/projects\"`.".to_string())
      }
      ConfigError::Credentials { .. } => {
        Some("Check `[credentials]` in release-sync.toml points at a readable SSH key pair.".to_string())
      }
      _ => None,
    }
  }
}

/// Git operation errors
#[derive(Debug, Error)]
pub enum GitError {
  #[error("Git command failed: {command}\n{stderr}")]
  CommandFailed { command: String, stderr: String },

  #[error("Git repository not found at: {}", .path.display())]
  RepoNotFound { path: PathBuf },

  #[error("No upstream tracking branch configured for {branch}")]
  NoUpstream { branch: String },

  #[error("Fetch from {remote} failed: {reason}")]
  FetchFailed { remote: String, reason: String },

  #[error("Push to {remote} failed: {reason}")]
  PushFailed { remote: String, reason: String },
}

impl GitError {
  fn help_message(&self) -> Option<String> {
    match self {
      GitError::PushFailed { reason, .. } => {
        if reason.contains("non-fast-forward") || reason.contains("rejected") {
          Some("The remote advanced during the release. The next run will resync and retry.".to_string())
        } else if reason.contains("Permission denied") || reason.contains("403") {
          Some("Check the SSH key configured under [credentials] has push access.".to_string())
        } else {
          None
        }
      }
      GitError::NoUpstream { branch } => Some(format!(
        "Set an upstream with: git branch --set-upstream-to=origin/{} {}",
        branch, branch
      )),
      _ => None,
    }
  }
}

/// Build executor errors
#[derive(Debug, Error)]
pub enum BuildError {
  #[error("Failed to launch build tool `{program}`: {reason}")]
  Launch { program: String, reason: String },

  #[error("Build task `{task}` failed in {}\n{output}", .dir.display())]
  TaskFailed { task: String, dir: PathBuf, output: String },
}

impl BuildError {
  fn help_message(&self) -> Option<String> {
    match self {
      BuildError::Launch { .. } => Some("Check `[executor] program` in release-sync.toml is on PATH.".to_string()),
      BuildError::TaskFailed { .. } => None,
    }
  }
}

/// Manifest (pom.xml) errors
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("Failed to parse manifest: {reason}")]
  Parse { reason: String },

  #[error("Manifest has no <{field}> element")]
  MissingField { field: &'static str },
}

/// Version string errors
#[derive(Debug, Error)]
pub enum VersionError {
  #[error("Malformed version '{version}': {reason}")]
  Malformed { version: String, reason: String },
}

/// Result type alias for release-sync
pub type SyncResult<T> = Result<T, SyncError>;

/// Helper trait to add context to Results
pub trait ResultExt<T> {
  /// Add context to an error result
  fn context(self, ctx: impl Into<String>) -> SyncResult<T>;

  /// Add context using a closure (lazy evaluation)
  fn with_context<F>(self, f: F) -> SyncResult<T>
  where
    F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
  E: Into<SyncError>,
{
  fn context(self, ctx: impl Into<String>) -> SyncResult<T> {
    self.map_err(|e| e.into().context(ctx))
  }

  fn with_context<F>(self, f: F) -> SyncResult<T>
  where
    F: FnOnce() -> String,
  {
    self.map_err(|e| e.into().context(f()))
  }
}

/// Pretty-print an error to stderr with help text
pub fn print_error(error: &SyncError) {
  eprintln!("\n❌ {}\n", error);

  if let Some(help) = error.help_message() {
    eprintln!("💡 Help: {}\n", help);
  }
}
