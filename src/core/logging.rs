//! Tracing subscriber setup
//!
//! Human-readable lines go to stderr. When `log_file` is configured the same
//! events are appended to it without ANSI colors. `RUST_LOG` overrides the
//! default level.

use crate::core::error::{ResultExt, SyncError, SyncResult};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber; call once at startup
pub fn init_tracing(verbose: bool, log_file: Option<&Path>) -> SyncResult<()> {
  let default_level = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  let file_layer = match log_file {
    Some(path) => {
      if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
          .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
      }
      let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
      Some(fmt::layer().with_ansi(false).with_target(false).with_writer(Mutex::new(file)))
    }
    None => None,
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
    .with(file_layer)
    .try_init()
    .map_err(|e| SyncError::message(format!("Failed to initialise logging: {}", e)))
}
