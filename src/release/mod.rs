//! Release planning
//!
//! - **version**: next release/development version with carry propagation
//! - **decision**: whether a synced repository needs a release
//! - **registry**: shared target version for alignment runs
//!
//! Nothing here touches a repository beyond reading history and the
//! manifest; committing, tagging and pushing live in the orchestrator.

pub mod decision;
pub mod registry;
pub mod version;

pub use decision::{DecisionReason, ReleaseDecision, must_release};
pub use registry::{GitTagRegistry, VersionRegistry, resolve_alignment_target};
pub use version::{CarryPolicy, ReleasePlan, VersionTriple, next_version};
