//! SSH key pair loaded once at startup and shared by every git transport call

use crate::core::config::CredentialsConfig;
use crate::core::error::{ConfigError, SyncResult};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Validated key pair
#[derive(Debug, Clone)]
pub struct Credentials {
  private_key: PathBuf,
}

impl Credentials {
  /// Read and validate the configured key pair
  ///
  /// Returns `None` when no keys are configured; git then falls back to the
  /// user's SSH agent and config.
  pub fn load(config: &CredentialsConfig) -> SyncResult<Option<Self>> {
    let (Some(public_key), Some(private_key)) = (&config.public_key, &config.private_key) else {
      return Ok(None);
    };

    let public = read_key(public_key)?;
    if !public.starts_with("ssh-") && !public.starts_with("ecdsa-") {
      return Err(credentials_error(public_key, "not an OpenSSH public key"));
    }

    let private = read_key(private_key)?;
    if !private.contains("PRIVATE KEY") {
      return Err(credentials_error(private_key, "not a PEM/OpenSSH private key"));
    }

    #[cfg(unix)]
    if let Ok(metadata) = fs::metadata(private_key) {
      let mode = metadata.permissions().mode() & 0o777;
      if mode & 0o077 != 0 {
        warn!(
          key = %private_key.display(),
          "private key has mode {:o}; ssh may refuse it (expected 600 or 400)",
          mode
        );
      }
    }

    info!(key = %public_key.display(), "loaded credentials");
    Ok(Some(Self {
      private_key: private_key.clone(),
    }))
  }

  /// `GIT_SSH_COMMAND` value forcing this identity
  pub fn ssh_command(&self) -> String {
    format!(
      "ssh -i '{}' -o IdentitiesOnly=yes -o BatchMode=yes",
      self.private_key.display()
    )
  }
}

fn read_key(path: &Path) -> SyncResult<String> {
  let content = fs::read_to_string(path).map_err(|e| credentials_error(path, &e.to_string()))?;
  let trimmed = content.trim();
  if trimmed.is_empty() {
    return Err(credentials_error(path, "file is empty"));
  }
  Ok(trimmed.to_string())
}

fn credentials_error(path: &Path, reason: &str) -> crate::core::error::SyncError {
  ConfigError::Credentials {
    path: path.to_path_buf(),
    reason: reason.to_string(),
  }
  .into()
}
