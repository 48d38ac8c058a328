//! Version control backend abstraction
//!
//! The orchestrator and the sync state machine only talk to [`Repository`].
//! [`SystemGit`] implements it over the `git` binary.

pub mod system_git;
mod system_git_ops;

#[cfg(test)]
pub mod fake;

pub use system_git::{SystemGit, SystemGitBackend};
pub use system_git_ops::ls_remote_tags;

use crate::core::error::SyncResult;
use std::path::{Path, PathBuf};

/// Information about a commit, as needed by the release decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
  pub sha: String,
  pub message: String,
  /// Committer time, seconds since the epoch
  pub timestamp: i64,
}

/// Author/committer identity for commits and annotated tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
  pub name: String,
  pub email: String,
}

/// Lazily produced history, newest first
pub type HistoryWalk<'a> = Box<dyn Iterator<Item = SyncResult<CommitInfo>> + 'a>;

/// Opens repositories; one handle per repository per run
pub trait VcsBackend {
  fn open(&self, path: &Path) -> SyncResult<Box<dyn Repository>>;
}

/// Primitives on one open repository
///
/// The handle is dropped before the next repository is processed.
pub trait Repository {
  fn path(&self) -> &Path;

  fn head_commit(&self) -> SyncResult<String>;

  /// HEAD commit time, `None` for an unborn branch
  fn head_timestamp(&self) -> SyncResult<Option<i64>>;

  fn current_branch(&self) -> SyncResult<String>;

  /// Upstream tracking branch of HEAD, e.g. `origin/main`
  fn upstream_branch(&self) -> SyncResult<String>;

  /// Resolve a branch or ref name to a commit SHA
  fn resolve_branch(&self, name: &str) -> SyncResult<String>;

  fn is_ancestor(&self, ancestor: &str, descendant: &str) -> SyncResult<bool>;

  fn walk_history(&self, start: &str) -> SyncResult<HistoryWalk<'_>>;

  /// Move HEAD's branch to `commit`, discarding index and worktree changes
  fn hard_reset(&self, commit: &str) -> SyncResult<()>;

  /// Remove untracked files that are not ignored
  fn clean_untracked(&self) -> SyncResult<()>;

  fn fetch_all(&self, remote: &str) -> SyncResult<()>;

  fn list_tags(&self) -> SyncResult<Vec<String>>;

  fn delete_tag(&self, name: &str) -> SyncResult<()>;

  /// Create an annotated tag
  fn create_tag(&self, name: &str, commit: &str, message: &str, tagger: &Signature) -> SyncResult<()>;

  /// Paths whose working-tree content differs from the index, untracked files included
  fn diff_index_to_workdir(&self) -> SyncResult<Vec<PathBuf>>;

  /// Stage paths and write the index
  fn stage_all(&self, paths: &[PathBuf]) -> SyncResult<()>;

  /// Write the index as a tree, returning its id
  fn write_tree(&self) -> SyncResult<String>;

  /// Create a commit and point `refname` at it
  fn create_commit(
    &self,
    refname: &str,
    author: &Signature,
    message: &str,
    tree: &str,
    parents: &[String],
  ) -> SyncResult<String>;

  fn remote_url(&self, name: &str) -> SyncResult<Option<String>>;

  fn push(&self, remote: &str, refspecs: &[String]) -> SyncResult<()>;
}
