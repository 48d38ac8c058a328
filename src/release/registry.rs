//! Version registry for alignment runs
//!
//! Alignment converges every repository on one release version: the highest
//! version tag of a registry remote, bumped once.

use crate::core::error::{SyncError, SyncResult};
use crate::core::vcs::ls_remote_tags;
use crate::release::version::{CarryPolicy, VersionTriple};
use semver::Version;
use tracing::{debug, info};

/// Source of already-published version tags
pub trait VersionRegistry {
  /// Raw tag names, without the `refs/tags/` prefix
  fn tags(&self) -> SyncResult<Vec<String>>;

  /// Highest `vX.Y.Z` / `X.Y.Z` tag; pre-releases and other tags are ignored
  fn latest_version(&self) -> SyncResult<Option<Version>> {
    Ok(self.tags()?.iter().filter_map(|tag| parse_tag(tag)).max())
  }
}

/// Registry backed by the tags of a git remote
pub struct GitTagRegistry {
  url: String,
  ssh_command: Option<String>,
}

impl GitTagRegistry {
  pub fn new(url: impl Into<String>, ssh_command: Option<String>) -> Self {
    Self {
      url: url.into(),
      ssh_command,
    }
  }
}

impl VersionRegistry for GitTagRegistry {
  fn tags(&self) -> SyncResult<Vec<String>> {
    let tags = ls_remote_tags(&self.url, self.ssh_command.as_deref())
      .map_err(|e| e.context(format!("Failed to list tags of version registry {}", self.url)))?;
    debug!(registry = %self.url, count = tags.len(), "listed registry tags");
    Ok(tags)
  }
}

fn parse_tag(tag: &str) -> Option<Version> {
  let version = Version::parse(tag.strip_prefix('v').unwrap_or(tag)).ok()?;
  (version.pre.is_empty() && version.build.is_empty()).then_some(version)
}

/// Release version every repository is aligned to
///
/// Fails when the registry has no version tags; there is nothing to align on.
pub fn resolve_alignment_target(registry: &dyn VersionRegistry, carry: CarryPolicy) -> SyncResult<String> {
  let latest = registry.latest_version()?.ok_or_else(|| {
    SyncError::with_help(
      "Version registry has no version tags",
      "Tag the registry with a vX.Y.Z version before running with --align",
    )
  })?;

  let component = |n: u64| {
    u32::try_from(n).map_err(|_| SyncError::message(format!("Registry version {} is out of range", latest)))
  };
  let current = VersionTriple::new(component(latest.major)?, component(latest.minor)?, component(latest.patch)?);
  let target = current.bump(carry)?.to_string();

  info!(latest = %latest, target = %target, "alignment target resolved");
  Ok(target)
}
