//! Maven integration: manifest reading and the build executor

pub mod executor;
pub mod manifest;

pub use executor::{BuildExecutor, BuildTask, MavenExecutor};
pub use manifest::Manifest;
