//! CLI commands for release-sync
//!
//! - **run**: discover checkouts, sync them, release what needs releasing

pub mod run;

pub use run::{RunArgs, run_release_sync};
