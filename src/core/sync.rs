//! Sync & reset state machine
//!
//! Brings a checkout from "possibly stale, possibly dirty" to "clean at the
//! upstream head":
//!
//! ```text
//! Unknown -> HeadHardReset -> Fetched -> AlignedToUpstream -> Clean
//!    \             \              \               \
//!     +-------------+--------------+---------------+--> Failed
//! ```
//!
//! Each transition is one group of backend operations. Normal processing
//! runs to `Clean`; the recovery path after an error runs to
//! `AlignedToUpstream` so no build tool is involved.

use crate::core::error::{GitError, SyncError, SyncResult};
use crate::core::vcs::Repository;
use crate::maven::{BuildExecutor, BuildTask};
use std::fmt;
use tracing::debug;

/// Where a checkout stands relative to its upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
  Unknown,
  /// Index and work tree match HEAD, untracked files removed
  HeadHardReset,
  /// Remote refs and tags fetched
  Fetched,
  /// HEAD at the upstream commit, no local tags
  AlignedToUpstream,
  /// Dependencies normalized (edits left uncommitted)
  Clean,
  Failed,
}

impl SyncState {
  fn rank(self) -> u8 {
    match self {
      SyncState::Unknown => 0,
      SyncState::HeadHardReset => 1,
      SyncState::Fetched => 2,
      SyncState::AlignedToUpstream => 3,
      SyncState::Clean => 4,
      SyncState::Failed => u8::MAX,
    }
  }
}

impl fmt::Display for SyncState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      SyncState::Unknown => "unknown",
      SyncState::HeadHardReset => "head-hard-reset",
      SyncState::Fetched => "fetched",
      SyncState::AlignedToUpstream => "aligned-to-upstream",
      SyncState::Clean => "clean",
      SyncState::Failed => "failed",
    };
    f.write_str(name)
  }
}

/// Drives one repository through [`SyncState`]s
pub struct SyncMachine<'a> {
  repo: &'a dyn Repository,
  remote: &'a str,
  /// Runs dependency normalization on the way to `Clean`
  normalizer: Option<&'a dyn BuildExecutor>,
  state: SyncState,
}

impl<'a> SyncMachine<'a> {
  pub fn new(repo: &'a dyn Repository, remote: &'a str) -> Self {
    Self {
      repo,
      remote,
      normalizer: None,
      state: SyncState::Unknown,
    }
  }

  /// Normalize dependencies with `executor` in the `Clean` transition
  ///
  /// Leave unset for repositories without a manifest and for fetch-only runs.
  pub fn with_normalizer(mut self, executor: &'a dyn BuildExecutor) -> Self {
    self.normalizer = Some(executor);
    self
  }

  #[cfg(test)]
  pub fn state(&self) -> SyncState {
    self.state
  }

  /// Perform the next transition
  ///
  /// On error the machine moves to `Failed` and stays there.
  pub fn step(&mut self) -> SyncResult<SyncState> {
    let result = match self.state {
      SyncState::Unknown => self.reset_head(),
      SyncState::HeadHardReset => self.fetch(),
      SyncState::Fetched => self.align_to_upstream(),
      SyncState::AlignedToUpstream => self.normalize(),
      SyncState::Clean | SyncState::Failed => {
        return Err(SyncError::message(format!(
          "Sync of {} has already finished ({})",
          self.repo.path().display(),
          self.state
        )));
      }
    };

    match result {
      Ok(next) => {
        debug!(repo = %self.repo.path().display(), from = %self.state, to = %next, "sync transition");
        self.state = next;
        Ok(next)
      }
      Err(e) => {
        debug!(repo = %self.repo.path().display(), at = %self.state, error = %e, "sync failed");
        self.state = SyncState::Failed;
        Err(e)
      }
    }
  }

  /// Restart from `Unknown` and step until `target` is reached
  pub fn run_to(&mut self, target: SyncState) -> SyncResult<()> {
    if target == SyncState::Failed || target == SyncState::Unknown {
      return Err(SyncError::message(format!("{} is not a sync target", target)));
    }
    self.state = SyncState::Unknown;
    while self.state.rank() < target.rank() {
      self.step()?;
    }
    Ok(())
  }

  fn reset_head(&self) -> SyncResult<SyncState> {
    self.repo.hard_reset("HEAD")?;
    self.repo.clean_untracked()?;
    Ok(SyncState::HeadHardReset)
  }

  fn fetch(&self) -> SyncResult<SyncState> {
    if self.repo.remote_url(self.remote)?.is_none() {
      return Err(
        GitError::FetchFailed {
          remote: self.remote.to_string(),
          reason: "remote is not configured".to_string(),
        }
        .into(),
      );
    }
    self.repo.fetch_all(self.remote)?;
    Ok(SyncState::Fetched)
  }

  fn align_to_upstream(&self) -> SyncResult<SyncState> {
    self.delete_local_tags();
    let upstream = self.repo.upstream_branch()?;
    let commit = self.repo.resolve_branch(&upstream)?;
    self.repo.hard_reset(&commit)?;
    self.delete_local_tags();
    Ok(SyncState::AlignedToUpstream)
  }

  fn normalize(&self) -> SyncResult<SyncState> {
    if let Some(executor) = self.normalizer {
      executor.execute(&BuildTask::NormalizeDependencies, self.repo.path())?;
    }
    Ok(SyncState::Clean)
  }

  /// Idempotent cleanup: failures are logged and ignored
  fn delete_local_tags(&self) {
    let tags = match self.repo.list_tags() {
      Ok(tags) => tags,
      Err(e) => {
        debug!(repo = %self.repo.path().display(), error = %e, "could not list tags");
        return;
      }
    };
    for tag in tags {
      if let Err(e) = self.repo.delete_tag(&tag) {
        debug!(repo = %self.repo.path().display(), tag = %tag, error = %e, "could not delete tag");
      }
    }
  }
}
