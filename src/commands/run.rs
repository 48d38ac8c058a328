use std::path::PathBuf;

use tracing::info;

use crate::core::config::{RunMode, RunOptions, SyncConfig};
use crate::core::credentials::Credentials;
use crate::core::discovery::discover;
use crate::core::error::{ConfigError, SyncResult};
use crate::core::logging::init_tracing;
use crate::core::orchestrator::{BatchReport, Orchestrator, RepoOutcome};
use crate::core::vcs::SystemGitBackend;
use crate::maven::MavenExecutor;
use crate::release::{GitTagRegistry, resolve_alignment_target};

/// Command-line inputs for one run
#[derive(Debug, Clone)]
pub struct RunArgs {
  pub mode: RunMode,
  pub config: PathBuf,
  /// Overrides `repos_location`
  pub root: Option<PathBuf>,
  pub json: bool,
  pub verbose: bool,
}

/// Discover, sync and release every repository under the configured root
///
/// Per-repository failures end up in the report; only batch-level problems
/// (config, credentials, registry, discovery) are returned as errors.
pub fn run_release_sync(args: RunArgs) -> SyncResult<()> {
  let mut config = SyncConfig::load(&args.config)?;
  if let Some(root) = args.root {
    config.repos_location = root;
  }
  init_tracing(args.verbose, config.log_file.as_deref())?;

  let options = RunOptions::new(args.mode);
  let credentials = Credentials::load(&config.credentials)?;

  let target = match args.mode {
    RunMode::Align => Some(alignment_target(&config, credentials.as_ref())?),
    _ => None,
  };

  let vcs = SystemGitBackend::new(credentials.as_ref());
  let executor = MavenExecutor::new(&config.executor);

  let descriptors = discover(&config.repos_location, &config.discovery, &vcs, target.as_deref())?;
  info!(
    root = %config.repos_location.display(),
    repositories = descriptors.len(),
    "discovery finished"
  );

  let report = Orchestrator::new(&config, options, &vcs, &executor).run(&descriptors);

  if args.json {
    println!("{}", serde_json::to_string_pretty(&report)?);
  } else {
    print_report(&report);
  }

  Ok(())
}

fn alignment_target(config: &SyncConfig, credentials: Option<&Credentials>) -> SyncResult<String> {
  let url = config.align.registry.as_deref().ok_or_else(|| ConfigError::Invalid {
    field: "align.registry".to_string(),
    reason: "required when running with --align".to_string(),
  })?;
  let registry = GitTagRegistry::new(url, credentials.map(Credentials::ssh_command));
  resolve_alignment_target(&registry, config.carry_policy(RunMode::Align))
}

fn print_report(report: &BatchReport) {
  println!(
    "\nRelease run ({}, started {})\n",
    report.mode,
    report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
  );

  println!("{:<40} {:<12} DETAIL", "REPOSITORY", "STATUS");
  println!("{:-<100}", "");

  for repo in &report.repositories {
    let (status, detail) = match &repo.outcome {
      RepoOutcome::Released {
        plan,
        reason,
        forced_push,
      } => (
        "released",
        format!(
          "{} (next {}), {}{}",
          plan.tag,
          plan.development_version,
          reason,
          if *forced_push { ", force pushed" } else { "" }
        ),
      ),
      RepoOutcome::UpToDate => ("up-to-date", String::new()),
      RepoOutcome::Reported { decision } => (
        if decision.release { "would release" } else { "up-to-date" },
        decision.reason.to_string(),
      ),
      RepoOutcome::Skipped { reason } => ("skipped", reason.clone()),
      RepoOutcome::Failed { error } => ("failed", error.lines().next().unwrap_or_default().to_string()),
    };
    println!("{:<40} {:<12} {}", truncate(&repo.name, 40), status, detail);
  }

  println!(
    "\n{} released, {} up to date, {} skipped, {} failed\n",
    report.released(),
    report.up_to_date(),
    report.skipped(),
    report.failed()
  );
}

/// Keep the end of long names, which carries the artifact id
fn truncate(name: &str, width: usize) -> String {
  let count = name.chars().count();
  if count <= width {
    return name.to_string();
  }
  let tail: String = name.chars().skip(count - (width - 3)).collect();
  format!("...{}", tail)
}
