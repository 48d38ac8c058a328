//! Release decision
//!
//! A repository is released when forced, when a commit newer than the
//! discovery boundary carries the release marker, or when its manifest
//! changed since discovery (dependency normalization bumped something).

use crate::core::config::{RunMode, RunOptions, SyncConfig};
use crate::core::discovery::RepositoryDescriptor;
use crate::core::error::{SyncError, SyncResult};
use crate::core::vcs::Repository;
use serde::Serialize;
use similar::TextDiff;
use std::fmt;
use std::fs;
use tracing::debug;

/// Why a repository is (or is not) released
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionReason {
  Forced,
  Aligned,
  MarkerCommit { sha: String },
  ManifestDrift,
  None,
}

impl fmt::Display for DecisionReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DecisionReason::Forced => write!(f, "forced"),
      DecisionReason::Aligned => write!(f, "alignment"),
      DecisionReason::MarkerCommit { sha } => write!(f, "release marker in {}", short_sha(sha)),
      DecisionReason::ManifestDrift => write!(f, "manifest changed"),
      DecisionReason::None => write!(f, "nothing new"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseDecision {
  pub release: bool,
  pub reason: DecisionReason,
}

impl ReleaseDecision {
  fn yes(reason: DecisionReason) -> Self {
    Self { release: true, reason }
  }

  fn no() -> Self {
    Self {
      release: false,
      reason: DecisionReason::None,
    }
  }
}

/// Decide whether `repo` needs a release
///
/// Expects the repository to have been synced; the history walk starts at
/// HEAD and the drift check reads the manifest from the working tree.
pub fn must_release(
  repo: &dyn Repository,
  descriptor: &RepositoryDescriptor,
  config: &SyncConfig,
  options: RunOptions,
) -> SyncResult<ReleaseDecision> {
  if options.mode.bypasses_decision() {
    let reason = match options.mode {
      RunMode::Align => DecisionReason::Aligned,
      _ => DecisionReason::Forced,
    };
    return Ok(ReleaseDecision::yes(reason));
  }

  if let Some(sha) = find_marker_commit(repo, &config.release_marker, descriptor.last_known_commit_timestamp)? {
    return Ok(ReleaseDecision::yes(DecisionReason::MarkerCommit { sha }));
  }

  if manifest_drifted(descriptor, &config.discovery.manifest_file)? {
    return Ok(ReleaseDecision::yes(DecisionReason::ManifestDrift));
  }

  Ok(ReleaseDecision::no())
}

/// First commit reachable from HEAD that is newer than `since` and carries `marker`
///
/// Commit timestamps are not monotonic along history (rebases, clock skew),
/// so every commit is checked and an older one never ends the walk.
fn find_marker_commit(repo: &dyn Repository, marker: &str, since: Option<i64>) -> SyncResult<Option<String>> {
  for commit in repo.walk_history("HEAD")? {
    let commit = commit?;
    let newer = since.is_none_or(|boundary| commit.timestamp > boundary);
    if newer && commit.message.contains(marker) {
      debug!(sha = %commit.sha, "release marker found");
      return Ok(Some(commit.sha));
    }
  }
  Ok(None)
}

fn manifest_drifted(descriptor: &RepositoryDescriptor, manifest_file: &str) -> SyncResult<bool> {
  let Some(snapshot) = descriptor.manifest_snapshot.as_deref() else {
    return Ok(false);
  };
  let path = descriptor.path.join(manifest_file);
  let current = match fs::read(&path) {
    Ok(bytes) => bytes,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
    Err(e) => return Err(SyncError::from(e).context(format!("Failed to read {}", path.display()))),
  };
  if current == snapshot {
    return Ok(false);
  }

  let old = String::from_utf8_lossy(snapshot);
  let new = String::from_utf8_lossy(&current);
  let diff = TextDiff::from_lines(old.as_ref(), new.as_ref())
    .unified_diff()
    .context_radius(2)
    .header("discovered", "current")
    .to_string();
  debug!(repo = %descriptor.display_name, "manifest drift:\n{}", diff);
  Ok(true)
}

fn short_sha(sha: &str) -> &str {
  sha.get(..8).unwrap_or(sha)
}
