use crate::core::error::{ConfigError, SyncResult, ResultExt};
use crate::release::version::CarryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use toml_edit::DocumentMut;

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "release-sync.toml";

/// Configuration for release-sync
///
/// Loaded from `release-sync.toml`; a sibling `release-sync.local.toml`
/// overrides any top-level key it defines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
  /// Root of the tree of project checkouts
  pub repos_location: PathBuf,

  /// Remote that releases are fetched from and pushed to
  #[serde(default = "default_remote")]
  pub remote: String,

  /// Commit message substring that requests a release
  #[serde(default = "default_release_marker")]
  pub release_marker: String,

  /// Prefix of the commit message for release-sync's own commits; the tag is appended
  #[serde(default = "default_commit_message")]
  pub commit_message: String,

  /// Manifest substring that marks an artifact as publishable
  #[serde(default = "default_publish_marker")]
  pub publish_marker: String,

  /// Seconds to wait after each released repository
  #[serde(default = "default_release_pause_secs")]
  pub release_pause_secs: u64,

  /// Optional append-only log file
  #[serde(default)]
  pub log_file: Option<PathBuf>,

  #[serde(default)]
  pub discovery: DiscoveryConfig,

  #[serde(default)]
  pub credentials: CredentialsConfig,

  #[serde(default)]
  pub author: AuthorConfig,

  #[serde(default)]
  pub executor: ExecutorConfig,

  #[serde(default)]
  pub align: AlignConfig,
}

fn default_remote() -> String {
  "origin".to_string()
}

fn default_release_marker() -> String {
  "[release]".to_string()
}

fn default_commit_message() -> String {
  "[release-sync] dependency update for ".to_string()
}

fn default_publish_marker() -> String {
  "<distributionManagement>".to_string()
}

fn default_release_pause_secs() -> u64 {
  30
}

/// What the directory walk looks for and what it skips
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
  #[serde(default = "default_manifest_file")]
  pub manifest_file: String,

  #[serde(default = "default_vcs_dir")]
  pub vcs_dir: String,

  /// Build output directory name, never descended into
  #[serde(default = "default_build_output_dir")]
  pub build_output_dir: String,

  /// Dependency cache directory names, never descended into
  #[serde(default = "default_dependency_cache_dirs")]
  pub dependency_cache_dirs: Vec<String>,

  /// Stale build-tool backup file removed during discovery
  #[serde(default = "default_backup_file")]
  pub backup_file: String,

  /// Path substrings (case-insensitive, `/`-separated) to skip
  #[serde(default)]
  pub exclude: Vec<String>,
}

fn default_manifest_file() -> String {
  "pom.xml".to_string()
}

fn default_vcs_dir() -> String {
  ".git".to_string()
}

fn default_build_output_dir() -> String {
  "target".to_string()
}

fn default_dependency_cache_dirs() -> Vec<String> {
  vec!["node_modules".to_string(), "repository".to_string()]
}

fn default_backup_file() -> String {
  "pom.xml.versionsBackup".to_string()
}

impl Default for DiscoveryConfig {
  fn default() -> Self {
    Self {
      manifest_file: default_manifest_file(),
      vcs_dir: default_vcs_dir(),
      build_output_dir: default_build_output_dir(),
      dependency_cache_dirs: default_dependency_cache_dirs(),
      backup_file: default_backup_file(),
      exclude: Vec::new(),
    }
  }
}

/// SSH key pair used for fetch and push
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CredentialsConfig {
  #[serde(default)]
  pub public_key: Option<PathBuf>,
  #[serde(default)]
  pub private_key: Option<PathBuf>,
}

/// Identity for release-sync's commits and tags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorConfig {
  #[serde(default = "default_author_name")]
  pub name: String,
  #[serde(default = "default_author_email")]
  pub email: String,
}

fn default_author_name() -> String {
  "release-sync".to_string()
}

fn default_author_email() -> String {
  "release-sync@localhost".to_string()
}

impl Default for AuthorConfig {
  fn default() -> Self {
    Self {
      name: default_author_name(),
      email: default_author_email(),
    }
  }
}

/// How the build tool is launched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
  #[serde(default = "default_program")]
  pub program: String,
  /// Arguments placed before the goals
  #[serde(default = "default_executor_args")]
  pub args: Vec<String>,
  #[serde(default = "default_skip_tests")]
  pub skip_tests: bool,
}

fn default_program() -> String {
  "mvn".to_string()
}

fn default_executor_args() -> Vec<String> {
  vec!["-B".to_string()]
}

fn default_skip_tests() -> bool {
  true
}

impl Default for ExecutorConfig {
  fn default() -> Self {
    Self {
      program: default_program(),
      args: default_executor_args(),
      skip_tests: default_skip_tests(),
    }
  }
}

/// Alignment mode settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AlignConfig {
  /// Remote whose version tags define the shared target
  #[serde(default)]
  pub registry: Option<String>,

  /// Value an overflowing component resets to in forced and alignment runs.
  /// Zero keeps the standard rollover.
  #[serde(default)]
  pub carry_reserve: u32,
}

impl SyncConfig {
  /// Path of the local overlay for a config file (`x.toml` -> `x.local.toml`)
  pub fn local_overlay_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("release-sync");
    path.with_file_name(format!("{}.local.toml", stem))
  }

  /// Load config and its local overlay, then validate
  pub fn load(path: &Path) -> SyncResult<Self> {
    if !path.exists() {
      return Err(ConfigError::NotFound { path: path.to_path_buf() }.into());
    }

    let content =
      fs::read_to_string(path).with_context(|| format!("Failed to read config from {}", path.display()))?;
    let mut doc: DocumentMut = content
      .parse()
      .with_context(|| format!("Failed to parse config from {}", path.display()))?;

    let overlay_path = Self::local_overlay_path(path);
    if overlay_path.exists() {
      let overlay_content = fs::read_to_string(&overlay_path)
        .with_context(|| format!("Failed to read config from {}", overlay_path.display()))?;
      let overlay: DocumentMut = overlay_content
        .parse()
        .with_context(|| format!("Failed to parse config from {}", overlay_path.display()))?;
      merge_overlay(&mut doc, &overlay);
    }

    let config: SyncConfig = toml_edit::de::from_str(&doc.to_string())
      .with_context(|| format!("Failed to parse config from {}", path.display()))?;
    config.validate()?;
    Ok(config)
  }

  /// Validate values serde can't check
  pub fn validate(&self) -> SyncResult<()> {
    if self.repos_location.as_os_str().is_empty() {
      return Err(invalid("repos_location", "must not be empty"));
    }
    if self.remote.trim().is_empty() {
      return Err(invalid("remote", "must not be empty"));
    }
    if self.release_marker.is_empty() {
      return Err(invalid("release_marker", "must not be empty"));
    }
    if self.align.carry_reserve > 9 {
      return Err(invalid("align.carry_reserve", "must be between 0 and 9"));
    }
    if self.credentials.public_key.is_some() != self.credentials.private_key.is_some() {
      return Err(invalid(
        "credentials",
        "public_key and private_key must be set together",
      ));
    }
    Ok(())
  }

  /// Carry policy for a run mode
  pub fn carry_policy(&self, mode: RunMode) -> CarryPolicy {
    match mode {
      RunMode::Force | RunMode::Align if self.align.carry_reserve > 0 => {
        CarryPolicy::Reserved(self.align.carry_reserve)
      }
      _ => CarryPolicy::Standard,
    }
  }

  pub fn release_pause(&self) -> Duration {
    Duration::from_secs(self.release_pause_secs)
  }
}

/// Replace base top-level entries with the overlay's
fn merge_overlay(base: &mut DocumentMut, overlay: &DocumentMut) {
  for (key, item) in overlay.iter() {
    base.insert(key, item.clone());
  }
}

fn invalid(field: &str, reason: &str) -> crate::core::error::SyncError {
  ConfigError::Invalid {
    field: field.to_string(),
    reason: reason.to_string(),
  }
  .into()
}

/// How the orchestrator treats the release decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
  /// Release when history or manifest drift asks for it
  #[default]
  Normal,
  /// Release every repository regardless of the decision
  Force,
  /// Sync and report only
  Fetch,
  /// Release every repository at one shared target version
  Align,
}

impl fmt::Display for RunMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      RunMode::Normal => "normal",
      RunMode::Force => "force",
      RunMode::Fetch => "fetch",
      RunMode::Align => "align",
    };
    f.write_str(name)
  }
}

impl RunMode {
  /// Modes that bypass the release decision
  pub fn bypasses_decision(self) -> bool {
    matches!(self, RunMode::Force | RunMode::Align)
  }
}

/// Immutable per-run options threaded through the orchestrator
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
  pub mode: RunMode,
}

impl RunOptions {
  pub fn new(mode: RunMode) -> Self {
    Self { mode }
  }

  pub fn is_fetch_only(&self) -> bool {
    self.mode == RunMode::Fetch
  }
}
