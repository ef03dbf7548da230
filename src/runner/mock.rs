//! In-memory runner for tests.
//!
//! Records every invocation and answers from a table of canned outputs
//! keyed by argv *prefix*: the entry whose key is the longest prefix of the
//! space-joined argv wins. This mirrors how the engine is exercised in the
//! scenario tests: one canned entry for `"docker run"`, one for
//! `"docker exec"`, and so on.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CmdOut, CommandRunner, Limits};
use crate::error::RunnerError;

/// A canned answer for one argv prefix.
#[derive(Debug, Clone, Default)]
pub struct CannedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Answer with [`RunnerError::Timeout`] instead of output.
    pub timeout: bool,
}

impl CannedOutput {
    /// Canned success printing `stdout`.
    #[must_use]
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Self::default()
        }
    }

    /// Canned failure with `exit_code` and `stderr`.
    #[must_use]
    pub fn fail(exit_code: i32, stderr: &str) -> Self {
        Self {
            stderr: stderr.to_string(),
            exit_code,
            ..Self::default()
        }
    }
}

/// Recorder runner matching argv prefixes to canned outputs.
pub struct MemoryRunner {
    outputs: HashMap<String, CannedOutput>,
    calls: Mutex<Vec<String>>,
}

impl MemoryRunner {
    #[must_use]
    pub fn new<K>(outputs: impl IntoIterator<Item = (K, CannedOutput)>) -> Self
    where
        K: Into<String>,
    {
        Self {
            outputs: outputs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Space-joined argvs of every invocation so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Forgets all recorded invocations.
    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// Returns `true` if any recorded invocation contains `needle`.
    #[must_use]
    pub fn has_call(&self, needle: &str) -> bool {
        self.calls().iter().any(|call| call.contains(needle))
    }

    fn answer(&self, joined: &str) -> CmdOut {
        let canned = self
            .outputs
            .iter()
            .filter(|(prefix, _)| joined.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, out)| out);
        match canned {
            Some(out) => CmdOut {
                stdout: out.stdout.clone(),
                stderr: out.stderr.clone(),
                exit_code: out.exit_code,
            },
            None => CmdOut {
                stdout: String::new(),
                stderr: format!("no canned output for {joined:?}"),
                exit_code: 127,
            },
        }
    }

    fn is_timeout(&self, joined: &str) -> bool {
        self.outputs
            .iter()
            .filter(|(prefix, _)| joined.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .is_some_and(|(_, out)| out.timeout)
    }
}

#[async_trait]
impl CommandRunner for MemoryRunner {
    async fn run(
        &self,
        argv: &[String],
        _stdin: Option<&[u8]>,
        _limits: &Limits,
    ) -> std::result::Result<CmdOut, RunnerError> {
        let joined = argv.join(" ");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(joined.clone());
        }
        if self.is_timeout(&joined) {
            return Err(RunnerError::Timeout);
        }
        Ok(self.answer(&joined))
    }
}
