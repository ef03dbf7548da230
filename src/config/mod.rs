//! Immutable application configuration.
//!
//! The config tree is read once at startup (see [`load::read`]) and never
//! mutated afterwards. Global defaults from `config.json` are folded into
//! every box and step during loading, so consumers always see fully
//! populated records and never consult the defaults again.
//!
//! # Layout on disk
//!
//! ```text
//! <config dir>/
//! ├── config.json            # pool size, request limits, box/step defaults
//! ├── boxes/<name>.json      # one box per file (or a single boxes.json map)
//! └── commands/<sandbox>.json  # command map for one sandbox
//! ```

mod load;
mod validation;

pub use load::read;

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::error::ExecError;

/// The `:name` placeholder replaced with the request ID during execution.
pub const NAME_VAR: &str = ":name";

/// Commands of a single sandbox, keyed by command name.
pub type SandboxCommands = HashMap<String, Command>;

/// The immutable configuration tree.
#[derive(Debug, Clone)]
pub struct Config {
    /// Worker pool sizing.
    pub pool: PoolSettings,
    /// Per-request caps enforced by the validator.
    pub limits: RequestLimits,
    /// Declared boxes, including expanded `<name>:<version>` entries.
    pub boxes: HashMap<String, BoxSpec>,
    /// Command graphs keyed by sandbox name.
    pub commands: HashMap<String, SandboxCommands>,
}

impl Config {
    /// Looks up a command by `(sandbox, command)` pair.
    #[must_use]
    pub fn lookup(&self, sandbox: &str, command: &str) -> Option<&Command> {
        self.commands.get(sandbox).and_then(|cmds| cmds.get(command))
    }

    /// Resolves a box by name and version tag.
    ///
    /// An empty or `"latest"` version resolves to the base box; any other
    /// tag resolves to the box registered under `"<name>:<version>"`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::UnknownBox`] when no box is registered under
    /// the resolved key.
    pub fn resolve_box(&self, name: &str, version: &str) -> std::result::Result<&BoxSpec, ExecError> {
        let found = if version.is_empty() || version == "latest" {
            self.boxes.get(name)
        } else {
            self.boxes.get(&format!("{name}:{version}"))
        };
        found.ok_or_else(|| ExecError::UnknownBox {
            name: name.to_string(),
            version: if version.is_empty() {
                "latest".to_string()
            } else {
                version.to_string()
            },
        })
    }
}

/// Worker pool sizing, from `config.json`.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    /// Number of concurrently executing requests.
    pub workers: usize,
    /// Extra requests admitted to the FIFO queue before `busy`.
    pub queue: usize,
}

/// Per-request caps, from `config.json`.
#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    /// Maximum number of files per request.
    pub max_files: usize,
    /// Maximum size of a single file, in bytes.
    pub max_file_size: usize,
    /// Wall-clock budget for the whole step list of one request.
    pub request_timeout: Duration,
}

/// A named container image plus its host resource envelope.
#[derive(Debug, Clone)]
pub struct BoxSpec {
    /// Box name; versioned entries are keyed as `<name>:<tag>`.
    pub name: String,
    /// Container image, including the tag for versioned entries.
    pub image: String,
    /// Container runtime passed as `--runtime`.
    pub runtime: String,
    /// Host resource envelope passed through to the container runtime.
    pub host: Host,
}

/// Host-side resource limits for a box.
///
/// The engine passes these through to the container runtime unchanged; it
/// never interprets them.
#[derive(Debug, Clone)]
pub struct Host {
    /// CPU cores (`--cpus`).
    pub cpu: u32,
    /// Memory in MiB (`--memory <n>m`).
    pub memory: u32,
    /// Network mode (`--network`).
    pub network: String,
    /// Volume template (`--volume`); `%s` is replaced with the workspace path.
    pub volume: String,
    /// Process count limit (`--pids-limit`).
    pub nproc: u32,
}

/// Which engine executes a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Container pipeline driven through the docker CLI.
    Docker,
    /// Single upstream HTTP endpoint.
    Http,
}

/// An ordered pipeline of steps with optional before/after hooks.
#[derive(Debug, Clone)]
pub struct Command {
    pub engine: EngineKind,
    /// Filename the request's entry file (`files[""]`) is stored under;
    /// empty when the command takes no entry file.
    pub entry: String,
    pub before: Option<Step>,
    pub steps: Vec<Step>,
    pub after: Option<Step>,
}

/// What a step asks the container runtime to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Run,
    Exec,
    Stop,
}

/// A single container invocation, fully populated after the defaults fold.
#[derive(Debug, Clone)]
pub struct Step {
    /// Target box name, or [`NAME_VAR`] for the request's ephemeral container.
    pub box_name: String,
    /// Version tag pinned by this step; empty defers to the request.
    pub version: String,
    /// User inside the container (`--user`).
    pub user: String,
    pub action: Action,
    /// Command argv appended after the image / container name.
    pub command: Vec<String>,
    /// Pipe the entry file's contents to the step's stdin.
    pub stdin: bool,
    /// Start the container detached and leave it running.
    pub detach: bool,
    /// Per-stream byte cap on captured output.
    pub noutput: usize,
    /// Wall-clock timeout for this step.
    pub timeout: Duration,
    /// Extra environment passed as `--env` pairs; ordered for stable argv.
    pub env: BTreeMap<String, String>,
}
