//! In-memory repository for unit tests
//!
//! Models one local branch (`main`) tracking `origin/main`, a remote with
//! its own branch tip and tags, and a set of dirty working-tree paths.

use super::{CommitInfo, HistoryWalk, Repository, Signature, VcsBackend};
use crate::core::error::{GitError, SyncError, SyncResult};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const UPSTREAM: &str = "origin/main";

#[derive(Debug, Clone)]
pub struct FakeCommit {
  pub message: String,
  pub timestamp: i64,
  pub parent: Option<String>,
}

#[derive(Debug)]
pub struct FakeState {
  pub commits: HashMap<String, FakeCommit>,
  pub head: String,
  /// `origin/main` as of the last fetch
  pub upstream: String,
  pub has_upstream: bool,
  pub remote_head: String,
  pub remote_tags: BTreeMap<String, String>,
  pub tags: BTreeMap<String, String>,
  /// Annotated tag messages, by name
  pub tag_messages: BTreeMap<String, String>,
  pub dirty: BTreeSet<PathBuf>,
  pub staged: BTreeSet<PathBuf>,
  /// Upcoming push attempts that fail before touching the remote
  pub push_failures: usize,
  pub fail_fetch: bool,
  pub pushes: Vec<Vec<String>>,
  /// Operation log, in call order
  pub calls: Vec<String>,
  next_id: usize,
  clock: i64,
}

impl FakeState {
  pub fn new() -> Self {
    let mut commits = HashMap::new();
    commits.insert(
      "c0".to_string(),
      FakeCommit {
        message: "initial".to_string(),
        timestamp: 1_000,
        parent: None,
      },
    );
    Self {
      commits,
      head: "c0".to_string(),
      upstream: "c0".to_string(),
      has_upstream: true,
      remote_head: "c0".to_string(),
      remote_tags: BTreeMap::new(),
      tags: BTreeMap::new(),
      tag_messages: BTreeMap::new(),
      dirty: BTreeSet::new(),
      staged: BTreeSet::new(),
      push_failures: 0,
      fail_fetch: false,
      pushes: Vec::new(),
      calls: Vec::new(),
      next_id: 1,
      clock: 1_000,
    }
  }

  fn new_commit(&mut self, parent: &str, message: &str, timestamp: Option<i64>) -> String {
    let sha = format!("c{}", self.next_id);
    self.next_id += 1;
    self.clock += 10;
    self.commits.insert(
      sha.clone(),
      FakeCommit {
        message: message.to_string(),
        timestamp: timestamp.unwrap_or(self.clock),
        parent: Some(parent.to_string()),
      },
    );
    sha
  }

  /// Someone else pushes a commit to the remote
  pub fn push_remote_commit(&mut self, message: &str, timestamp: Option<i64>) -> String {
    let parent = self.remote_head.clone();
    let sha = self.new_commit(&parent, message, timestamp);
    self.remote_head = sha.clone();
    sha
  }

  /// A commit that exists only in the local branch
  pub fn local_commit(&mut self, message: &str) -> String {
    let parent = self.head.clone();
    let sha = self.new_commit(&parent, message, None);
    self.head = sha.clone();
    sha
  }

  pub fn head_timestamp(&self) -> i64 {
    self.commits[&self.head].timestamp
  }

  fn ancestors(&self, from: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut cursor = Some(from.to_string());
    while let Some(sha) = cursor {
      cursor = self.commits.get(&sha).and_then(|c| c.parent.clone());
      chain.push(sha);
    }
    chain
  }

  fn resolve(&self, name: &str) -> SyncResult<String> {
    match name {
      "HEAD" | "main" | "refs/heads/main" => Ok(self.head.clone()),
      UPSTREAM => Ok(self.upstream.clone()),
      _ if self.commits.contains_key(name) => Ok(name.to_string()),
      _ => {
        let tag = name.strip_prefix("refs/tags/").unwrap_or(name);
        self
          .tags
          .get(tag)
          .cloned()
          .ok_or_else(|| SyncError::message(format!("unknown ref {}", name)))
      }
    }
  }

  fn apply_push(&mut self, refspec: &str) -> Result<(), String> {
    let force = refspec.starts_with('+');
    let (src, dst) = refspec
      .trim_start_matches('+')
      .split_once(':')
      .ok_or_else(|| format!("bad refspec {}", refspec))?;
    let sha = self.resolve(src).map_err(|e| e.to_string())?;

    if dst.starts_with("refs/heads/") {
      if !force && !self.ancestors(&sha).contains(&self.remote_head) {
        return Err(format!("! [rejected] {} (non-fast-forward)", dst));
      }
      self.remote_head = sha;
    } else if let Some(tag) = dst.strip_prefix("refs/tags/") {
      if let Some(existing) = self.remote_tags.get(tag)
        && *existing != sha
        && !force
      {
        return Err(format!("! [rejected] {} (already exists)", dst));
      }
      self.remote_tags.insert(tag.to_string(), sha);
    }
    Ok(())
  }
}

pub type SharedState = Rc<RefCell<FakeState>>;

/// Repository handle over shared fake state
pub struct FakeRepo {
  path: PathBuf,
  state: SharedState,
}

impl FakeRepo {
  fn log(&self, call: impl Into<String>) {
    self.state.borrow_mut().calls.push(call.into());
  }
}

impl Repository for FakeRepo {
  fn path(&self) -> &Path {
    &self.path
  }

  fn head_commit(&self) -> SyncResult<String> {
    Ok(self.state.borrow().head.clone())
  }

  fn head_timestamp(&self) -> SyncResult<Option<i64>> {
    Ok(Some(self.state.borrow().head_timestamp()))
  }

  fn current_branch(&self) -> SyncResult<String> {
    Ok("main".to_string())
  }

  fn upstream_branch(&self) -> SyncResult<String> {
    if self.state.borrow().has_upstream {
      Ok(UPSTREAM.to_string())
    } else {
      Err(GitError::NoUpstream {
        branch: "main".to_string(),
      }
      .into())
    }
  }

  fn resolve_branch(&self, name: &str) -> SyncResult<String> {
    self.state.borrow().resolve(name)
  }

  fn is_ancestor(&self, ancestor: &str, descendant: &str) -> SyncResult<bool> {
    let state = self.state.borrow();
    Ok(state.ancestors(descendant).iter().any(|sha| sha == ancestor))
  }

  fn walk_history(&self, start: &str) -> SyncResult<HistoryWalk<'_>> {
    let state = self.state.borrow();
    let start = state.resolve(start)?;
    let commits: Vec<SyncResult<CommitInfo>> = state
      .ancestors(&start)
      .into_iter()
      .map(|sha| {
        let c = &state.commits[&sha];
        Ok(CommitInfo {
          sha,
          message: c.message.clone(),
          timestamp: c.timestamp,
        })
      })
      .collect();
    Ok(Box::new(commits.into_iter()))
  }

  fn hard_reset(&self, commit: &str) -> SyncResult<()> {
    self.log(format!("reset {}", commit));
    let mut state = self.state.borrow_mut();
    let sha = state.resolve(commit)?;
    state.head = sha;
    state.dirty.clear();
    state.staged.clear();
    Ok(())
  }

  fn clean_untracked(&self) -> SyncResult<()> {
    self.log("clean");
    Ok(())
  }

  fn fetch_all(&self, remote: &str) -> SyncResult<()> {
    self.log("fetch");
    let mut state = self.state.borrow_mut();
    if state.fail_fetch {
      return Err(
        GitError::FetchFailed {
          remote: remote.to_string(),
          reason: "Could not resolve host".to_string(),
        }
        .into(),
      );
    }
    let remote_head = state.remote_head.clone();
    state.upstream = remote_head;
    let remote_tags = state.remote_tags.clone();
    state.tags.extend(remote_tags);
    Ok(())
  }

  fn list_tags(&self) -> SyncResult<Vec<String>> {
    Ok(self.state.borrow().tags.keys().cloned().collect())
  }

  fn delete_tag(&self, name: &str) -> SyncResult<()> {
    self.log(format!("delete-tag {}", name));
    self
      .state
      .borrow_mut()
      .tags
      .remove(name)
      .map(|_| ())
      .ok_or_else(|| SyncError::message(format!("tag '{}' not found", name)))
  }

  fn create_tag(&self, name: &str, commit: &str, message: &str, _tagger: &Signature) -> SyncResult<()> {
    self.log(format!("tag {}", name));
    let mut state = self.state.borrow_mut();
    if state.tags.contains_key(name) {
      return Err(SyncError::message(format!("tag '{}' already exists", name)));
    }
    let sha = state.resolve(commit)?;
    state.tags.insert(name.to_string(), sha);
    state.tag_messages.insert(name.to_string(), message.to_string());
    Ok(())
  }

  fn diff_index_to_workdir(&self) -> SyncResult<Vec<PathBuf>> {
    Ok(self.state.borrow().dirty.iter().cloned().collect())
  }

  fn stage_all(&self, paths: &[PathBuf]) -> SyncResult<()> {
    let mut state = self.state.borrow_mut();
    for path in paths {
      state.dirty.remove(path);
      state.staged.insert(path.clone());
    }
    Ok(())
  }

  fn write_tree(&self) -> SyncResult<String> {
    Ok(format!("tree-{}", self.state.borrow().staged.len()))
  }

  fn create_commit(
    &self,
    refname: &str,
    _author: &Signature,
    message: &str,
    _tree: &str,
    parents: &[String],
  ) -> SyncResult<String> {
    self.log(format!("commit {}", message));
    let mut state = self.state.borrow_mut();
    let parent = parents.first().cloned().unwrap_or_else(|| state.head.clone());
    let sha = state.new_commit(&parent, message, None);
    if refname == "HEAD" {
      state.head = sha.clone();
    }
    state.staged.clear();
    Ok(sha)
  }

  fn remote_url(&self, name: &str) -> SyncResult<Option<String>> {
    Ok((name == "origin").then(|| "git@example.com:acme/project.git".to_string()))
  }

  fn push(&self, remote: &str, refspecs: &[String]) -> SyncResult<()> {
    self.log("push");
    let mut state = self.state.borrow_mut();
    state.pushes.push(refspecs.to_vec());
    if state.push_failures > 0 {
      state.push_failures -= 1;
      return Err(
        GitError::PushFailed {
          remote: remote.to_string(),
          reason: "! [rejected] main -> main (fetch first)".to_string(),
        }
        .into(),
      );
    }
    for refspec in refspecs {
      state.apply_push(refspec).map_err(|reason| GitError::PushFailed {
        remote: remote.to_string(),
        reason,
      })?;
    }
    Ok(())
  }
}

/// Backend handing out [`FakeRepo`]s for registered paths
#[derive(Default)]
pub struct FakeBackend {
  repos: RefCell<HashMap<PathBuf, SharedState>>,
}

impl FakeBackend {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&self, path: &Path) -> SharedState {
    let state = Rc::new(RefCell::new(FakeState::new()));
    self.repos.borrow_mut().insert(path.to_path_buf(), state.clone());
    state
  }

  pub fn repo(&self, path: &Path) -> FakeRepo {
    FakeRepo {
      path: path.to_path_buf(),
      state: self.repos.borrow()[path].clone(),
    }
  }
}

impl VcsBackend for FakeBackend {
  fn open(&self, path: &Path) -> SyncResult<Box<dyn Repository>> {
    let state = self
      .repos
      .borrow()
      .get(path)
      .cloned()
      .ok_or_else(|| GitError::RepoNotFound {
        path: path.to_path_buf(),
      })?;
    Ok(Box::new(FakeRepo {
      path: path.to_path_buf(),
      state,
    }))
  }
}
