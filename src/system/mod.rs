//! Startup environment checks.
//!
//! Verifies the process can actually do its job before accepting traffic:
//! the docker CLI must be reachable on `PATH` and the temp root must be
//! writable for workspaces.

mod requirements;

pub use requirements::{SystemRequirements, check_all};
