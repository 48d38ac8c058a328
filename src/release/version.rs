//! Version arithmetic for Maven-style `X.Y.Z[-SNAPSHOT]` versions
//!
//! Versions use a fixed base-10 rollover: a component that grows past 9
//! resets and carries one into the component on its left. This is not
//! semver; `1.2.9` is followed by `1.3.0`, never `1.2.10`.

use crate::core::error::{SyncResult, VersionError};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Suffix marking an in-progress development version
pub const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

/// Suffix some projects put on released versions
pub const RELEASE_SUFFIX: &str = "-RELEASE";

/// Highest value a component may hold before it carries
const COMPONENT_MAX: u32 = 9;

/// How overflowing components are reset while carrying
///
/// `Standard` resets to zero. `Reserved(n)` resets to `n`, leaving the
/// versions `x.y.0 ..= x.y.(n-1)` unused. The reserved variant only applies
/// to forced and alignment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CarryPolicy {
  #[default]
  Standard,
  Reserved(u32),
}

impl CarryPolicy {
  fn reset_value(self) -> u32 {
    match self {
      CarryPolicy::Standard => 0,
      CarryPolicy::Reserved(n) => n.min(COMPONENT_MAX),
    }
  }
}

/// (major, minor, patch) with any version suffix removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VersionTriple {
  pub major: u32,
  pub minor: u32,
  pub patch: u32,
}

impl VersionTriple {
  pub fn new(major: u32, minor: u32, patch: u32) -> Self {
    Self { major, minor, patch }
  }

  /// Increment patch by one, then carry patch→minor→major
  pub fn bump(self, carry: CarryPolicy) -> Result<Self, VersionError> {
    let reset = carry.reset_value();
    let mut next = Self {
      patch: increment(self.patch, self)?,
      ..self
    };
    if next.patch > COMPONENT_MAX {
      next.patch = reset;
      next.minor = increment(next.minor, self)?;
    }
    if next.minor > COMPONENT_MAX {
      next.minor = reset;
      next.major = increment(next.major, self)?;
    }
    Ok(next)
  }
}

fn increment(component: u32, version: VersionTriple) -> Result<u32, VersionError> {
  component.checked_add(1).ok_or_else(|| VersionError::Malformed {
    version: version.to_string(),
    reason: "component out of range".to_string(),
  })
}

impl fmt::Display for VersionTriple {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
  }
}

impl FromStr for VersionTriple {
  type Err = VersionError;

  fn from_str(version: &str) -> Result<Self, Self::Err> {
    let malformed = |reason: &str| VersionError::Malformed {
      version: version.to_string(),
      reason: reason.to_string(),
    };

    let bare = strip_suffix(version.trim());
    let parts: Vec<&str> = bare.split('.').collect();
    if parts.len() != 3 {
      return Err(malformed("expected exactly three numeric components"));
    }

    let mut numbers = [0u32; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
      if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
        return Err(malformed("components must be non-negative integers"));
      }
      *slot = part.parse().map_err(|_| malformed("component out of range"))?;
    }

    Ok(Self::new(numbers[0], numbers[1], numbers[2]))
  }
}

/// Remove a trailing `-SNAPSHOT` or `-RELEASE` (case-insensitive)
pub fn strip_suffix(version: &str) -> &str {
  for suffix in [SNAPSHOT_SUFFIX, RELEASE_SUFFIX] {
    if version.len() >= suffix.len() {
      let split = version.len() - suffix.len();
      if version.is_char_boundary(split) && version[split..].eq_ignore_ascii_case(suffix) {
        return &version[..split];
      }
    }
  }
  version
}

/// Versions and tag for one repository's release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleasePlan {
  pub release_version: String,
  pub tag: String,
  pub development_version: String,
}

impl ReleasePlan {
  fn from_release(release: VersionTriple, carry: CarryPolicy) -> Result<Self, VersionError> {
    let release_version = release.to_string();
    Ok(Self {
      tag: format!("v{}", release_version),
      development_version: format!("{}{}", release.bump(carry)?, SNAPSHOT_SUFFIX),
      release_version,
    })
  }
}

/// Compute the release plan that follows `current`
///
/// A `forced_target` is taken as the release version as-is (alignment mode
/// converges every repository on it). Otherwise the release is `current`
/// bumped once. The development version is the release bumped once more.
pub fn next_version(current: &str, forced_target: Option<&str>, carry: CarryPolicy) -> SyncResult<ReleasePlan> {
  let release = match forced_target {
    Some(target) => target.parse::<VersionTriple>()?,
    None => current.parse::<VersionTriple>()?.bump(carry)?,
  };
  Ok(ReleasePlan::from_release(release, carry)?)
}
