//! Bounded subprocess execution.
//!
//! The engine never spawns processes directly; it goes through the
//! [`CommandRunner`] trait so tests can swap the real [`ProcessRunner`]
//! for the in-memory [`MemoryRunner`] recorder.
//!
//! The contract, for every implementation:
//!
//! - stdout and stderr are captured into independently bounded buffers of
//!   `noutput` bytes; excess bytes are discarded silently, and truncation
//!   is not an error.
//! - the wall-clock timeout kills the process and reports
//!   [`RunnerError::Timeout`].
//! - a non-zero exit code is not an error; it is reported through
//!   [`CmdOut::exit_code`]. Errors are reserved for spawn and I/O failures.

pub mod mock;
mod process;

pub use mock::{CannedOutput, MemoryRunner};
pub use process::ProcessRunner;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::RunnerError;

/// Capture and timing limits for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Per-stream byte cap on captured output.
    pub noutput: usize,
    /// Wall-clock timeout.
    pub timeout: Duration,
}

/// Captured output of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdOut {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CmdOut {
    /// Returns `true` if the process exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Spawns an argv and captures its bounded output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `argv`, optionally piping `stdin` to the process.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Timeout`] when the limit expires,
    /// [`RunnerError::Spawn`] when the process cannot be started, and
    /// [`RunnerError::Io`] when reading or writing the pipes fails.
    async fn run(
        &self,
        argv: &[String],
        stdin: Option<&[u8]>,
        limits: &Limits,
    ) -> std::result::Result<CmdOut, RunnerError>;
}
