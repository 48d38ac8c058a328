//! Integration tests driving the release-sync binary against real git remotes
//!
//! The build tool is configured as `true`, so no Maven installation is needed.

#![cfg(unix)]

mod test_release;
