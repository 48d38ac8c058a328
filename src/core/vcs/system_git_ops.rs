//! Repository operations for SystemGit (history, reset, tags, commits, transport)

use super::system_git::{SystemGit, check, isolated_git};
use super::{CommitInfo, HistoryWalk, Repository, Signature};
use crate::core::error::{GitError, SyncError, SyncResult, ResultExt};
use std::io::{BufRead, BufReader, Split};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Stdio};

/// Field and record separators for `git log` output
const FIELD_SEP: u8 = 0x1f;
const RECORD_SEP: u8 = 0x1e;

impl Repository for SystemGit {
  fn path(&self) -> &Path {
    &self.repo_path
  }

  fn head_commit(&self) -> SyncResult<String> {
    self.run(&["rev-parse", "HEAD"])
  }

  fn head_timestamp(&self) -> SyncResult<Option<i64>> {
    let output = self
      .git_cmd()
      .args(["rev-parse", "--verify", "--quiet", "HEAD"])
      .output()
      .context("Failed to resolve HEAD")?;
    if !output.status.success() {
      // unborn branch
      return Ok(None);
    }

    let ts = self.run(&["log", "-1", "--format=%ct", "HEAD"])?;
    let ts = ts
      .parse::<i64>()
      .map_err(|_| SyncError::message(format!("Invalid commit timestamp '{}'", ts)))?;
    Ok(Some(ts))
  }

  fn current_branch(&self) -> SyncResult<String> {
    self.run(&["rev-parse", "--abbrev-ref", "HEAD"])
  }

  fn upstream_branch(&self) -> SyncResult<String> {
    let output = self
      .git_cmd()
      .args(["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])
      .output()
      .context("Failed to resolve upstream branch")?;

    if !output.status.success() {
      let branch = self.current_branch().unwrap_or_else(|_| "HEAD".to_string());
      return Err(GitError::NoUpstream { branch }.into());
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  fn resolve_branch(&self, name: &str) -> SyncResult<String> {
    let spec = format!("{}^{{commit}}", name);
    self.run(&["rev-parse", "--verify", &spec])
  }

  fn is_ancestor(&self, ancestor: &str, descendant: &str) -> SyncResult<bool> {
    let args = ["merge-base", "--is-ancestor", ancestor, descendant];
    let output = self
      .git_cmd()
      .args(args)
      .output()
      .context("Failed to run git merge-base")?;

    match output.status.code() {
      Some(0) => Ok(true),
      Some(1) => Ok(false),
      _ => {
        check(&args, &output)?;
        Ok(false)
      }
    }
  }

  fn walk_history(&self, start: &str) -> SyncResult<HistoryWalk<'_>> {
    let format = format!("--format=%H%x{:02x}%ct%x{:02x}%B%x{:02x}", FIELD_SEP, FIELD_SEP, RECORD_SEP);
    let mut child = self
      .git_cmd()
      .args(["log", &format, start])
      .stdout(Stdio::piped())
      .stderr(Stdio::null())
      .spawn()
      .context("Failed to run git log")?;

    let stdout = child
      .stdout
      .take()
      .ok_or_else(|| SyncError::message("git log produced no stdout"))?;

    Ok(Box::new(HistoryIter {
      child,
      records: BufReader::new(stdout).split(RECORD_SEP),
      start: start.to_string(),
      finished: false,
    }))
  }

  fn hard_reset(&self, commit: &str) -> SyncResult<()> {
    self.run(&["reset", "--hard", "--quiet", commit]).map(|_| ())
  }

  fn clean_untracked(&self) -> SyncResult<()> {
    self.run(&["clean", "-d", "--force", "--quiet"]).map(|_| ())
  }

  fn fetch_all(&self, remote: &str) -> SyncResult<()> {
    let output = self
      .git_cmd()
      .args(["fetch", "--prune", "--prune-tags", "--tags", "--force", remote])
      .output()
      .context("Failed to run git fetch")?;

    if !output.status.success() {
      return Err(
        GitError::FetchFailed {
          remote: remote.to_string(),
          reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into(),
      );
    }
    Ok(())
  }

  fn list_tags(&self) -> SyncResult<Vec<String>> {
    let stdout = self.run(&["tag", "--list"])?;
    Ok(stdout.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect())
  }

  fn delete_tag(&self, name: &str) -> SyncResult<()> {
    self.run(&["tag", "--delete", name]).map(|_| ())
  }

  fn create_tag(&self, name: &str, commit: &str, message: &str, tagger: &Signature) -> SyncResult<()> {
    let args = ["tag", "--annotate", "--message", message, name, commit];
    let output = self
      .git_cmd()
      .env("GIT_COMMITTER_NAME", &tagger.name)
      .env("GIT_COMMITTER_EMAIL", &tagger.email)
      .args(args)
      .output()
      .context("Failed to run git tag")?;
    check(&args, &output)
  }

  fn diff_index_to_workdir(&self) -> SyncResult<Vec<PathBuf>> {
    let args = ["status", "--porcelain=v1", "-z", "--untracked-files=all"];
    let output = self
      .git_cmd()
      .args(args)
      .output()
      .context("Failed to run git status")?;
    check(&args, &output)?;
    Ok(parse_porcelain_z(&output.stdout))
  }

  fn stage_all(&self, paths: &[PathBuf]) -> SyncResult<()> {
    if paths.is_empty() {
      return Ok(());
    }
    let mut cmd = self.git_cmd();
    cmd.args(["add", "--all", "--"]);
    for path in paths {
      cmd.arg(path);
    }
    let output = cmd.output().context("Failed to run git add")?;
    check(&["add", "--all"], &output)
  }

  fn write_tree(&self) -> SyncResult<String> {
    self.run(&["write-tree"])
  }

  fn create_commit(
    &self,
    refname: &str,
    author: &Signature,
    message: &str,
    tree: &str,
    parents: &[String],
  ) -> SyncResult<String> {
    let mut cmd = self.git_cmd();
    for (var, value) in [
      ("GIT_AUTHOR_NAME", &author.name),
      ("GIT_AUTHOR_EMAIL", &author.email),
      ("GIT_COMMITTER_NAME", &author.name),
      ("GIT_COMMITTER_EMAIL", &author.email),
    ] {
      cmd.env(var, value);
    }
    cmd.args(["commit-tree", tree]);
    for parent in parents {
      cmd.arg("-p").arg(parent);
    }
    cmd.arg("-m").arg(message);

    let output = cmd.output().context("Failed to run git commit-tree")?;
    check(&["commit-tree", tree], &output)?;
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();

    self.run(&["update-ref", "-m", "release-sync: commit", refname, &sha])?;
    Ok(sha)
  }

  fn remote_url(&self, name: &str) -> SyncResult<Option<String>> {
    let output = self
      .git_cmd()
      .args(["remote", "get-url", name])
      .output()
      .context("Failed to run git remote")?;

    if !output.status.success() {
      return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
  }

  fn push(&self, remote: &str, refspecs: &[String]) -> SyncResult<()> {
    let output = self
      .git_cmd()
      .args(["push", "--porcelain", remote])
      .args(refspecs)
      .output()
      .context("Failed to run git push")?;

    if !output.status.success() {
      let mut reason = String::from_utf8_lossy(&output.stderr).trim().to_string();
      let stdout = String::from_utf8_lossy(&output.stdout);
      // porcelain output names the rejected refs
      for line in stdout.lines().filter(|l| l.starts_with('!')) {
        reason.push('\n');
        reason.push_str(line);
      }
      return Err(
        GitError::PushFailed {
          remote: remote.to_string(),
          reason,
        }
        .into(),
      );
    }
    Ok(())
  }
}

/// Streams `git log` records as they are produced
struct HistoryIter {
  child: Child,
  records: Split<BufReader<ChildStdout>>,
  start: String,
  finished: bool,
}

impl Iterator for HistoryIter {
  type Item = SyncResult<CommitInfo>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    loop {
      match self.records.next() {
        Some(Ok(record)) => {
          if record.iter().all(u8::is_ascii_whitespace) {
            continue;
          }
          return Some(parse_log_record(&record));
        }
        Some(Err(e)) => {
          self.finished = true;
          return Some(Err(e.into()));
        }
        None => {
          self.finished = true;
          return match self.child.wait() {
            Ok(status) if status.success() => None,
            Ok(status) => Some(Err(
              GitError::CommandFailed {
                command: format!("git log {}", self.start),
                stderr: format!("exited with {}", status),
              }
              .into(),
            )),
            Err(e) => Some(Err(e.into())),
          };
        }
      }
    }
  }
}

impl Drop for HistoryIter {
  fn drop(&mut self) {
    if !self.finished {
      // walk abandoned early; don't leave git blocked on a full pipe
      let _ = self.child.kill();
    }
    let _ = self.child.wait();
  }
}

/// Parse one `%H<US>%ct<US>%B` record
fn parse_log_record(record: &[u8]) -> SyncResult<CommitInfo> {
  let text = String::from_utf8_lossy(record);
  let text = text.trim_start_matches('\n');
  let mut fields = text.splitn(3, FIELD_SEP as char);

  let sha = fields
    .next()
    .filter(|s| !s.is_empty())
    .ok_or_else(|| SyncError::message("Missing commit SHA in git log output"))?
    .to_string();
  let timestamp = fields
    .next()
    .and_then(|s| s.trim().parse::<i64>().ok())
    .ok_or_else(|| SyncError::message(format!("Missing/invalid timestamp for commit {}", sha)))?;
  let message = fields.next().unwrap_or("").trim().to_string();

  Ok(CommitInfo {
    sha,
    message,
    timestamp,
  })
}

/// Paths from `git status --porcelain=v1 -z`
///
/// Renames and copies carry a second NUL-terminated path (the source),
/// which is skipped.
fn parse_porcelain_z(data: &[u8]) -> Vec<PathBuf> {
  let mut paths = Vec::new();
  let mut entries = data.split(|&b| b == 0).filter(|e| !e.is_empty());

  while let Some(entry) = entries.next() {
    if entry.len() < 4 {
      continue;
    }
    let status = &entry[..2];
    let path = String::from_utf8_lossy(&entry[3..]).to_string();
    paths.push(PathBuf::from(path));
    if status[0] == b'R' || status[0] == b'C' {
      entries.next();
    }
  }

  paths
}

/// Version-like tags on a remote, without cloning it
pub fn ls_remote_tags(url: &str, ssh_command: Option<&str>) -> SyncResult<Vec<String>> {
  let args = ["ls-remote", "--tags", "--refs", url];
  let output = isolated_git(ssh_command)
    .args(args)
    .output()
    .context("Failed to run git ls-remote")?;
  check(&args, &output)?;

  Ok(
    String::from_utf8_lossy(&output.stdout)
      .lines()
      .filter_map(|line| line.split_whitespace().nth(1))
      .filter_map(|r| r.strip_prefix("refs/tags/"))
      .map(String::from)
      .collect(),
  )
}
