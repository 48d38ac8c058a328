//! Release orchestrator
//!
//! Processes discovered repositories one at a time:
//!
//! 1. sync & reset to `Clean`
//! 2. release decision (fetch-only runs stop here)
//! 3. release plan from the manifest version or the alignment target
//! 4. commit working-tree edits
//! 5. build (`release:*` for publishable artifacts, `clean install` otherwise)
//! 6. re-fetch, re-align if the remote moved, tag
//! 7. push, retrying once with force
//! 8. pause
//!
//! Errors never leave a repository's processing: they are logged, the
//! checkout is reset to its upstream, and the batch moves on.

use crate::core::config::{RunMode, RunOptions, SyncConfig};
use crate::core::discovery::RepositoryDescriptor;
use crate::core::error::{ResultExt, SyncResult};
use crate::core::sync::{SyncMachine, SyncState};
use crate::core::vcs::{Repository, Signature, VcsBackend};
use crate::maven::manifest::is_publishable;
use crate::maven::{BuildExecutor, BuildTask, Manifest};
use crate::release::{DecisionReason, ReleaseDecision, ReleasePlan, must_release, next_version};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// What happened to one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepoOutcome {
  Released {
    plan: ReleasePlan,
    reason: DecisionReason,
    /// The first push was rejected and the force retry went through
    forced_push: bool,
  },
  UpToDate,
  /// Fetch-only run: the decision that would have been acted on
  Reported { decision: ReleaseDecision },
  Skipped { reason: String },
  Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoReport {
  pub name: String,
  pub path: PathBuf,
  #[serde(flatten)]
  pub outcome: RepoOutcome,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
  pub mode: RunMode,
  pub started_at: DateTime<Utc>,
  pub repositories: Vec<RepoReport>,
}

impl BatchReport {
  pub fn released(&self) -> usize {
    self.count(|o| matches!(o, RepoOutcome::Released { .. }))
  }

  pub fn failed(&self) -> usize {
    self.count(|o| matches!(o, RepoOutcome::Failed { .. }))
  }

  pub fn up_to_date(&self) -> usize {
    self.count(|o| matches!(o, RepoOutcome::UpToDate | RepoOutcome::Reported { .. }))
  }

  pub fn skipped(&self) -> usize {
    self.count(|o| matches!(o, RepoOutcome::Skipped { .. }))
  }

  fn count(&self, pred: impl Fn(&RepoOutcome) -> bool) -> usize {
    self.repositories.iter().filter(|r| pred(&r.outcome)).count()
  }
}

/// Sequential release driver
pub struct Orchestrator<'a> {
  config: &'a SyncConfig,
  options: RunOptions,
  vcs: &'a dyn VcsBackend,
  executor: &'a dyn BuildExecutor,
}

impl<'a> Orchestrator<'a> {
  pub fn new(
    config: &'a SyncConfig,
    options: RunOptions,
    vcs: &'a dyn VcsBackend,
    executor: &'a dyn BuildExecutor,
  ) -> Self {
    Self {
      config,
      options,
      vcs,
      executor,
    }
  }

  /// Process every descriptor in order
  pub fn run(&self, descriptors: &[RepositoryDescriptor]) -> BatchReport {
    let started_at = Utc::now();
    info!(mode = %self.options.mode, repositories = descriptors.len(), "release run started");

    let repositories = descriptors
      .iter()
      .map(|descriptor| RepoReport {
        name: descriptor.display_name.clone(),
        path: descriptor.path.clone(),
        outcome: self.process(descriptor),
      })
      .collect();

    let report = BatchReport {
      mode: self.options.mode,
      started_at,
      repositories,
    };
    info!(
      released = report.released(),
      failed = report.failed(),
      skipped = report.skipped(),
      "release run finished"
    );
    report
  }

  fn process(&self, descriptor: &RepositoryDescriptor) -> RepoOutcome {
    let name = &descriptor.display_name;
    if !descriptor.has_vcs {
      debug!(repo = %name, "no version control, skipping");
      return RepoOutcome::Skipped {
        reason: "not a version-controlled checkout".to_string(),
      };
    }

    info!(repo = %name, "processing");
    // the handle lives for this repository only
    let repo = match self.vcs.open(&descriptor.path) {
      Ok(repo) => repo,
      Err(e) => {
        error!(repo = %name, error = %e, "cannot open repository");
        return RepoOutcome::Failed { error: e.to_string() };
      }
    };

    let outcome = match self.release(repo.as_ref(), descriptor) {
      Ok(outcome) => outcome,
      Err(e) => {
        error!(repo = %name, error = %e, "release failed");
        self.recover(repo.as_ref(), name);
        RepoOutcome::Failed { error: e.to_string() }
      }
    };
    info!(repo = %name, outcome = ?outcome, "done");
    outcome
  }

  fn release(&self, repo: &dyn Repository, descriptor: &RepositoryDescriptor) -> SyncResult<RepoOutcome> {
    let name = &descriptor.display_name;

    self.sync(repo, descriptor.has_manifest)?;

    let decision = must_release(repo, descriptor, self.config, self.options)?;
    info!(repo = %name, release = decision.release, reason = %decision.reason, "decision");
    if self.options.is_fetch_only() {
      return Ok(RepoOutcome::Reported { decision });
    }
    if !decision.release {
      return Ok(RepoOutcome::UpToDate);
    }
    if !descriptor.has_manifest {
      return Ok(RepoOutcome::Skipped {
        reason: "synced; no manifest to release".to_string(),
      });
    }

    let manifest_path = descriptor.path.join(&self.config.discovery.manifest_file);
    let text = fs::read_to_string(&manifest_path)
      .with_context(|| format!("Failed to read {}", manifest_path.display()))?;
    let manifest = Manifest::parse(&text)?;
    let current = manifest.version()?;
    let plan = next_version(
      current,
      descriptor.target_version.as_deref(),
      self.config.carry_policy(self.options.mode),
    )?;
    info!(
      repo = %name,
      from = %current,
      release = %plan.release_version,
      development = %plan.development_version,
      "version"
    );

    self.commit_changes(repo, &plan.tag)?;
    self.build(repo, &plan, is_publishable(&text, &self.config.publish_marker))?;
    self.realign_after_build(repo)?;
    self.commit_changes(repo, &plan.tag)?;
    self.tag(repo, &plan.tag)?;
    let forced_push = self.push(repo, &plan.tag)?;

    let pause = self.config.release_pause();
    if !pause.is_zero() {
      debug!(repo = %name, seconds = pause.as_secs(), "pausing");
      std::thread::sleep(pause);
    }

    Ok(RepoOutcome::Released {
      plan,
      reason: decision.reason,
      forced_push,
    })
  }

  fn sync(&self, repo: &dyn Repository, has_manifest: bool) -> SyncResult<()> {
    let mut machine = SyncMachine::new(repo, &self.config.remote);
    if has_manifest && !self.options.is_fetch_only() {
      machine = machine.with_normalizer(self.executor);
    }
    machine.run_to(SyncState::Clean)
  }

  /// Commit all working-tree edits; `None` when there was nothing to commit
  fn commit_changes(&self, repo: &dyn Repository, tag: &str) -> SyncResult<Option<String>> {
    let paths = repo.diff_index_to_workdir()?;
    if paths.is_empty() {
      debug!(repo = %repo.path().display(), "nothing to commit");
      return Ok(None);
    }

    repo.stage_all(&paths)?;
    let tree = repo.write_tree()?;
    let parent = repo.head_commit()?;
    let message = format!("{}{}", self.config.commit_message, tag);
    let sha = repo.create_commit("HEAD", &self.signature(), &message, &tree, &[parent])?;
    info!(repo = %repo.path().display(), sha = %sha, files = paths.len(), "committed");
    Ok(Some(sha))
  }

  fn build(&self, repo: &dyn Repository, plan: &ReleasePlan, publishable: bool) -> SyncResult<()> {
    let tasks = if publishable {
      vec![
        BuildTask::Clean,
        BuildTask::Prepare {
          release_version: plan.release_version.clone(),
          development_version: plan.development_version.clone(),
        },
        BuildTask::Perform,
      ]
    } else {
      vec![BuildTask::Install]
    };

    for task in &tasks {
      self.executor.execute(task, repo.path())?;
    }
    info!(repo = %repo.path().display(), publishable, "built");
    Ok(())
  }

  /// Re-fetch and, when the remote advanced during the build, start again from upstream
  fn realign_after_build(&self, repo: &dyn Repository) -> SyncResult<()> {
    repo.fetch_all(&self.config.remote)?;
    let upstream = repo.resolve_branch(&repo.upstream_branch()?)?;
    let head = repo.head_commit()?;
    if repo.is_ancestor(&upstream, &head)? {
      return Ok(());
    }

    warn!(repo = %repo.path().display(), upstream = %upstream, "remote advanced during the build, re-aligning");
    repo.hard_reset(&upstream)?;
    self
      .executor
      .execute(&BuildTask::NormalizeDependencies, repo.path())
  }

  /// Annotated tag at HEAD, replacing a local tag of the same name
  fn tag(&self, repo: &dyn Repository, tag: &str) -> SyncResult<()> {
    if repo.list_tags()?.iter().any(|t| t == tag) {
      debug!(repo = %repo.path().display(), tag = %tag, "replacing local tag");
      repo.delete_tag(tag)?;
    }
    let head = repo.head_commit()?;
    let message = format!("{}{}", self.config.commit_message, tag);
    repo.create_tag(tag, &head, &message, &self.signature())?;
    info!(repo = %repo.path().display(), tag = %tag, commit = %head, "tagged");
    Ok(())
  }

  /// Push branch and tag; returns whether the force retry was needed
  fn push(&self, repo: &dyn Repository, tag: &str) -> SyncResult<bool> {
    let remote = &self.config.remote;
    let branch = repo.current_branch()?;
    let upstream = repo.upstream_branch()?;
    let upstream_branch = upstream
      .strip_prefix(&format!("{}/", remote))
      .unwrap_or(&upstream)
      .to_string();

    let refspecs = vec![
      format!("refs/heads/{}:refs/heads/{}", branch, upstream_branch),
      format!("refs/tags/{}:refs/tags/{}", tag, tag),
    ];

    match repo.push(remote, &refspecs) {
      Ok(()) => {
        info!(repo = %repo.path().display(), remote = %remote, "pushed");
        Ok(false)
      }
      Err(first) => {
        warn!(repo = %repo.path().display(), error = %first, "push rejected, retrying with force");
        let forced: Vec<String> = refspecs.iter().map(|r| format!("+{}", r)).collect();
        repo
          .push(remote, &forced)
          .map_err(|e| e.context("Force push failed after a rejected push"))?;
        info!(repo = %repo.path().display(), remote = %remote, "force pushed");
        Ok(true)
      }
    }
  }

  /// Best-effort reset to upstream after an error
  fn recover(&self, repo: &dyn Repository, name: &str) {
    match SyncMachine::new(repo, &self.config.remote).run_to(SyncState::AlignedToUpstream) {
      Ok(()) => info!(repo = %name, "reset to upstream"),
      Err(e) => warn!(repo = %name, error = %e, "recovery reset failed"),
    }
  }

  fn signature(&self) -> Signature {
    Signature {
      name: self.config.author.name.clone(),
      email: self.config.author.email.clone(),
    }
  }
}
