//! Repository discovery
//!
//! Walks the checkout tree and classifies every directory as a build
//! project, a VCS checkout, both, or neither. Only the first three produce a
//! [`RepositoryDescriptor`]. Hidden, build-output, dependency-cache and
//! excluded directories are pruned from the walk.

use crate::core::config::DiscoveryConfig;
use crate::core::error::{SyncError, SyncResult};
use crate::core::vcs::VcsBackend;
use crate::maven::Manifest;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// One discovered project checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDescriptor {
  pub path: PathBuf,
  pub has_manifest: bool,
  /// Manifest bytes as they were at discovery time
  pub manifest_snapshot: Option<Vec<u8>>,
  pub has_vcs: bool,
  /// HEAD commit time at discovery; `None` without VCS metadata or on an unborn branch,
  /// the discovery time itself when HEAD cannot be read
  pub last_known_commit_timestamp: Option<i64>,
  /// `groupId:artifactId` when the manifest parses, the path otherwise
  pub display_name: String,
  /// Alignment target, only set in alignment mode
  pub target_version: Option<String>,
}

/// Walk `root` and return one descriptor per project or checkout, sorted by path
///
/// `target_version` is seeded into every descriptor that has a manifest.
/// Any filesystem error aborts the walk.
pub fn discover(
  root: &Path,
  config: &DiscoveryConfig,
  vcs: &dyn VcsBackend,
  target_version: Option<&str>,
) -> SyncResult<Vec<RepositoryDescriptor>> {
  let root = root.canonicalize().map_err(|e| SyncError::Discovery {
    path: root.to_path_buf(),
    reason: e.to_string(),
  })?;
  let excludes: Vec<String> = config.exclude.iter().map(|p| normalize(p)).collect();

  let walker = WalkDir::new(&root)
    .min_depth(1)
    .follow_links(false)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|entry| !is_pruned(entry, config, &excludes));

  let mut descriptors = Vec::new();
  for entry in walker {
    let entry = entry?;
    if let Some(descriptor) = inspect(entry.path(), config, vcs, target_version)? {
      debug!(path = %descriptor.path.display(), name = %descriptor.display_name, "discovered");
      descriptors.push(descriptor);
    }
  }

  descriptors.sort_by(|a, b| a.path.cmp(&b.path));
  Ok(descriptors)
}

fn is_pruned(entry: &DirEntry, config: &DiscoveryConfig, excludes: &[String]) -> bool {
  // symlinks report their own type here, so they are never followed
  if !entry.file_type().is_dir() {
    return true;
  }

  let name = entry.file_name().to_string_lossy();
  if name.starts_with('.')
    || name == config.build_output_dir
    || config.dependency_cache_dirs.iter().any(|d| *d == name)
  {
    return true;
  }

  let path = normalize(&entry.path().to_string_lossy());
  if let Some(pattern) = excludes.iter().find(|p| !p.is_empty() && path.contains(p.as_str())) {
    debug!(path = %entry.path().display(), pattern = %pattern, "excluded");
    return true;
  }
  false
}

/// Lowercase with forward slashes, for exclusion matching
fn normalize(path: &str) -> String {
  path.replace('\\', "/").to_lowercase()
}

fn inspect(
  dir: &Path,
  config: &DiscoveryConfig,
  vcs: &dyn VcsBackend,
  target_version: Option<&str>,
) -> SyncResult<Option<RepositoryDescriptor>> {
  let manifest_path = dir.join(&config.manifest_file);
  let has_manifest = manifest_path.is_file();
  let has_vcs = dir.join(&config.vcs_dir).exists();
  if !has_manifest && !has_vcs {
    return Ok(None);
  }

  remove_backup(dir, config);

  let manifest_snapshot = if has_manifest {
    Some(fs::read(&manifest_path).map_err(|e| SyncError::Discovery {
      path: manifest_path.clone(),
      reason: e.to_string(),
    })?)
  } else {
    None
  };

  let display_name = manifest_snapshot
    .as_deref()
    .and_then(|bytes| match Manifest::parse(&String::from_utf8_lossy(bytes)) {
      Ok(manifest) => manifest.coordinates(),
      Err(e) => {
        warn!(path = %manifest_path.display(), error = %e, "manifest does not parse");
        None
      }
    })
    .unwrap_or_else(|| dir.display().to_string());

  let last_known_commit_timestamp = if has_vcs { head_timestamp(dir, vcs) } else { None };

  Ok(Some(RepositoryDescriptor {
    path: dir.to_path_buf(),
    has_manifest,
    manifest_snapshot,
    has_vcs,
    last_known_commit_timestamp,
    display_name,
    target_version: target_version.filter(|_| has_manifest).map(str::to_string),
  }))
}

/// HEAD commit time; an unreadable HEAD pins the boundary to now
///
/// `None` is reserved for an unborn branch, where the whole history is new.
fn head_timestamp(dir: &Path, vcs: &dyn VcsBackend) -> Option<i64> {
  match vcs.open(dir).and_then(|repo| repo.head_timestamp()) {
    Ok(timestamp) => timestamp,
    Err(e) => {
      warn!(path = %dir.display(), error = %e, "cannot read HEAD, markers already in history are ignored");
      Some(Utc::now().timestamp())
    }
  }
}

fn remove_backup(dir: &Path, config: &DiscoveryConfig) {
  let backup = dir.join(&config.backup_file);
  if !backup.exists() {
    return;
  }
  match fs::remove_file(&backup) {
    Ok(()) => debug!(path = %backup.display(), "removed stale backup"),
    Err(e) => debug!(path = %backup.display(), error = %e, "could not remove stale backup"),
  }
}
