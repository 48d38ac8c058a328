//! Core engine for release-sync
//!
//! - **config**: release-sync.toml parsing, local overlay and validation
//! - **credentials**: SSH key pair loaded once per run
//! - **discovery**: walk the checkout tree into repository descriptors
//! - **error**: error types with contextual help messages and exit codes
//! - **logging**: tracing subscriber for stderr and the optional log file
//! - **orchestrator**: per-repository release pipeline with recovery
//! - **sync**: sync & reset state machine
//! - **vcs**: git operations abstraction (SystemGit)

pub mod config;
pub mod credentials;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod sync;
pub mod vcs;
