//! pom.xml identity extraction
//!
//! Only the coordinates release-sync needs are read: `groupId`, `artifactId`
//! and `version` directly under `<project>`, plus `<parent><groupId>` as the
//! inherited fallback. When an element repeats, the last occurrence wins.

use crate::core::error::{ManifestError, SyncResult};
use xot::{Node, Xot};

/// Identity of a Maven project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
  pub group_id: Option<String>,
  pub artifact_id: Option<String>,
  pub version: Option<String>,
  pub parent_group_id: Option<String>,
}

impl Manifest {
  /// Parse manifest text
  pub fn parse(text: &str) -> SyncResult<Self> {
    let mut xot = Xot::new();
    let doc = xot
      .parse(text)
      .map_err(|e| ManifestError::Parse { reason: e.to_string() })?;

    let project = xot
      .children(doc)
      .find(|&n| xot.is_element(n))
      .ok_or_else(|| ManifestError::Parse {
        reason: "document has no root element".to_string(),
      })?;
    if local_name(&xot, project) != Some("project") {
      return Err(
        ManifestError::Parse {
          reason: "root element is not <project>".to_string(),
        }
        .into(),
      );
    }

    let mut manifest = Manifest::default();
    for child in xot.children(project) {
      match local_name(&xot, child) {
        Some("groupId") => manifest.group_id = Some(text_of(&xot, child)),
        Some("artifactId") => manifest.artifact_id = Some(text_of(&xot, child)),
        Some("version") => manifest.version = Some(text_of(&xot, child)),
        Some("parent") => {
          for parent_child in xot.children(child) {
            if local_name(&xot, parent_child) == Some("groupId") {
              manifest.parent_group_id = Some(text_of(&xot, parent_child));
            }
          }
        }
        _ => {}
      }
    }

    Ok(manifest)
  }

  /// The project's own version; required for releasing
  pub fn version(&self) -> SyncResult<&str> {
    self
      .version
      .as_deref()
      .filter(|v| !v.is_empty())
      .ok_or_else(|| ManifestError::MissingField { field: "version" }.into())
  }

  /// groupId, falling back to the parent's
  pub fn effective_group_id(&self) -> Option<&str> {
    self.group_id.as_deref().or(self.parent_group_id.as_deref())
  }

  /// `groupId:artifactId` when both are known
  pub fn coordinates(&self) -> Option<String> {
    match (self.effective_group_id(), self.artifact_id.as_deref()) {
      (Some(group), Some(artifact)) => Some(format!("{}:{}", group, artifact)),
      (None, Some(artifact)) => Some(artifact.to_string()),
      _ => None,
    }
  }
}

/// Whether the manifest text declares a publish target
pub fn is_publishable(text: &str, marker: &str) -> bool {
  !marker.is_empty() && text.contains(marker)
}

fn local_name(xot: &Xot, node: Node) -> Option<&str> {
  xot.element(node).map(|element| xot.local_name_str(element.name()))
}

fn text_of(xot: &Xot, node: Node) -> String {
  xot
    .children(node)
    .filter_map(|child| xot.text_str(child))
    .collect::<String>()
    .trim()
    .to_string()
}
