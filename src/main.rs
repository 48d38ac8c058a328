mod commands;
mod core;
mod maven;
mod release;

use clap::Parser;
use commands::RunArgs;
use core::config::{DEFAULT_CONFIG_FILE, RunMode};
use core::error::{SyncError, print_error};
use std::path::PathBuf;

/// Sync a tree of Maven checkouts with their remotes and release them when dependencies move
#[derive(Parser)]
#[command(name = "release-sync")]
#[command(version, about, long_about = None)]
#[command(styles = get_styles())]
struct Cli {
  /// Release every repository, skipping the release decision
  #[arg(long, conflicts_with = "align")]
  force: bool,

  /// Sync and report only: no builds, commits, tags or pushes
  #[arg(long, conflicts_with_all = ["force", "align"])]
  fetch: bool,

  /// Release every repository at the next version of the version registry
  #[arg(long)]
  align: bool,

  /// Path to the configuration file
  #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
  config: PathBuf,

  /// Root of the checkout tree (overrides `repos_location`)
  #[arg(long)]
  root: Option<PathBuf>,

  /// Print the batch report as JSON
  #[arg(long)]
  json: bool,

  /// Log at debug level unless RUST_LOG says otherwise
  #[arg(short, long)]
  verbose: bool,
}

impl Cli {
  fn mode(&self) -> RunMode {
    if self.force {
      RunMode::Force
    } else if self.fetch {
      RunMode::Fetch
    } else if self.align {
      RunMode::Align
    } else {
      RunMode::Normal
    }
  }
}

fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .usage(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .literal(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))))
    .invalid(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .error(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .valid(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .placeholder(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))))
}

fn main() {
  let cli = Cli::parse();

  let args = RunArgs {
    mode: cli.mode(),
    config: cli.config,
    root: cli.root,
    json: cli.json,
    verbose: cli.verbose,
  };

  if let Err(err) = commands::run_release_sync(args) {
    handle_error(err);
  }
}

fn handle_error(err: SyncError) -> ! {
  print_error(&err);
  std::process::exit(err.exit_code().as_i32());
}
