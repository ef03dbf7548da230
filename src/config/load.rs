//! Config loading and defaults fold-down.
//!
//! Reads `config.json`, the boxes and the commands from a config directory
//! and produces a fully folded [`Config`]: every optional field of every
//! box and step is resolved here, against the global defaults first and the
//! hard fallbacks second. The engine never sees an unset field.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::validation;
use super::{
    Action, BoxSpec, Command, Config, EngineKind, Host, PoolSettings, RequestLimits, SandboxCommands,
    Step,
};
use crate::error::ConfigError;

const CONFIG_FILENAME: &str = "config.json";
const BOXES_DIRNAME: &str = "boxes";
const COMMANDS_DIRNAME: &str = "commands";

// Hard fallbacks, used when config.json does not override them.
const DEFAULT_USER: &str = "sandbox";
const DEFAULT_NOUTPUT: usize = 4096;
const DEFAULT_STEP_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MAX_FILES: usize = 10;
const DEFAULT_MAX_FILE_SIZE: usize = 64 * 1024;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RUNTIME: &str = "runc";
const DEFAULT_CPU: u32 = 1;
const DEFAULT_MEMORY_MIB: u32 = 64;
const DEFAULT_NETWORK: &str = "none";
const DEFAULT_VOLUME: &str = "%s:/sandbox:ro";
const DEFAULT_NPROC: u32 = 64;

/// Reads the application config from a directory.
///
/// # Errors
///
/// Returns [`ConfigError`] when a file cannot be read or parsed, or when
/// the loaded tree fails cross-validation.
pub fn read(dir: &Path) -> std::result::Result<Config, ConfigError> {
    let root: RawRoot = read_json(&dir.join(CONFIG_FILENAME))?;

    let host_defaults = fold_host(&root.box_defaults, None);
    let step_defaults = root.step.clone();

    let boxes = read_boxes(&dir.join(BOXES_DIRNAME), &host_defaults)?;
    let commands = read_commands(&dir.join(COMMANDS_DIRNAME), &step_defaults)?;

    let workers = root.pool_size.unwrap_or_else(default_pool_size).max(1);
    let cfg = Config {
        pool: PoolSettings {
            workers,
            queue: root.queue_size.unwrap_or(workers * 2),
        },
        limits: RequestLimits {
            max_files: root.max_files.unwrap_or(DEFAULT_MAX_FILES),
            max_file_size: root.max_file_size.unwrap_or(DEFAULT_MAX_FILE_SIZE),
            request_timeout: Duration::from_secs(
                root.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        },
        boxes,
        commands,
    };

    validation::validate(&cfg)?;
    Ok(cfg)
}

fn default_pool_size() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> std::result::Result<T, ConfigError> {
    let data = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Lists `*.json` files in a directory, sorted for deterministic loading.
fn json_files(dir: &Path) -> std::result::Result<Vec<PathBuf>, ConfigError> {
    let entries = fs::read_dir(dir).map_err(|e| ConfigError::Read {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Reads boxes from the boxes dir, or from a `boxes.json` file next to it
/// when the dir does not exist.
fn read_boxes(
    dir: &Path,
    host_defaults: &Host,
) -> std::result::Result<HashMap<String, BoxSpec>, ConfigError> {
    let mut raw: Vec<(String, RawBox)> = Vec::new();

    if dir.is_dir() {
        for path in json_files(dir)? {
            let rb: RawBox = read_json(&path)?;
            // the filename is the box name unless the file sets one
            let name = if rb.name.is_empty() { file_stem(&path) } else { rb.name.clone() };
            raw.push((name, rb));
        }
    } else {
        let path = dir.with_extension("json");
        let map: HashMap<String, RawBox> = read_json(&path)?;
        for (name, rb) in map {
            let name = if rb.name.is_empty() { name } else { rb.name.clone() };
            raw.push((name, rb));
        }
    }

    let mut boxes = HashMap::with_capacity(raw.len());
    for (name, rb) in raw {
        let base = BoxSpec {
            name: name.clone(),
            image: rb.image.clone(),
            runtime: if rb.runtime.is_empty() {
                DEFAULT_RUNTIME.to_string()
            } else {
                rb.runtime.clone()
            },
            host: fold_host(&rb.host, Some(host_defaults)),
        };
        // every declared version tag registers a "<name>:<tag>" sibling
        for tag in &rb.versions {
            let versioned = BoxSpec {
                name: format!("{name}:{tag}"),
                image: format!("{}:{}", base.image, tag),
                ..base.clone()
            };
            boxes.insert(versioned.name.clone(), versioned);
        }
        boxes.insert(name, base);
    }

    debug!(count = boxes.len(), "loaded boxes");
    Ok(boxes)
}

/// Reads one `SandboxCommands` map per file; the file stem is the sandbox name.
fn read_commands(
    dir: &Path,
    defaults: &RawStepDefaults,
) -> std::result::Result<HashMap<String, SandboxCommands>, ConfigError> {
    let mut commands = HashMap::new();
    for path in json_files(dir)? {
        let sandbox = file_stem(&path);
        let raw: HashMap<String, RawCommand> = read_json(&path)?;
        let mut folded = HashMap::with_capacity(raw.len());
        for (name, rc) in raw {
            folded.insert(name.clone(), fold_command(&sandbox, &name, rc, defaults)?);
        }
        commands.insert(sandbox, folded);
    }
    debug!(count = commands.len(), "loaded sandboxes");
    Ok(commands)
}

fn fold_command(
    sandbox: &str,
    name: &str,
    raw: RawCommand,
    defaults: &RawStepDefaults,
) -> std::result::Result<Command, ConfigError> {
    let engine = match raw.engine.as_str() {
        "" | "docker" => EngineKind::Docker,
        "http" => EngineKind::Http,
        other => {
            return Err(ConfigError::UnknownEngine {
                sandbox: sandbox.to_string(),
                command: name.to_string(),
                engine: other.to_string(),
            })
        }
    };
    Ok(Command {
        engine,
        entry: raw.entry,
        before: raw.before.map(|s| fold_step(s, defaults)),
        steps: raw.steps.into_iter().map(|s| fold_step(s, defaults)).collect(),
        after: raw.after.map(|s| fold_step(s, defaults)),
    })
}

fn fold_step(raw: RawStep, defaults: &RawStepDefaults) -> Step {
    let action = raw
        .action
        .or(defaults.action)
        .unwrap_or(RawAction::Run)
        .into();
    Step {
        box_name: raw.box_name,
        version: raw.version,
        user: raw
            .user
            .or_else(|| defaults.user.clone())
            .unwrap_or_else(|| DEFAULT_USER.to_string()),
        action,
        command: raw.command,
        stdin: raw.stdin,
        detach: raw.detach,
        noutput: raw.noutput.or(defaults.noutput).unwrap_or(DEFAULT_NOUTPUT),
        timeout: Duration::from_secs(
            raw.timeout
                .or(defaults.timeout)
                .unwrap_or(DEFAULT_STEP_TIMEOUT_SECS),
        ),
        env: raw.env,
    }
}

fn fold_host(raw: &RawHost, defaults: Option<&Host>) -> Host {
    Host {
        cpu: raw
            .cpu
            .unwrap_or_else(|| defaults.map_or(DEFAULT_CPU, |d| d.cpu)),
        memory: raw
            .memory
            .unwrap_or_else(|| defaults.map_or(DEFAULT_MEMORY_MIB, |d| d.memory)),
        network: raw
            .network
            .clone()
            .unwrap_or_else(|| defaults.map_or_else(|| DEFAULT_NETWORK.to_string(), |d| d.network.clone())),
        volume: raw
            .volume
            .clone()
            .unwrap_or_else(|| defaults.map_or_else(|| DEFAULT_VOLUME.to_string(), |d| d.volume.clone())),
        nproc: raw
            .nproc
            .unwrap_or_else(|| defaults.map_or(DEFAULT_NPROC, |d| d.nproc)),
    }
}

// ===== On-disk (raw) schema =====

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawRoot {
    pool_size: Option<usize>,
    queue_size: Option<usize>,
    max_files: Option<usize>,
    max_file_size: Option<usize>,
    /// Whole-request wall-clock budget, seconds.
    request_timeout: Option<u64>,
    #[serde(rename = "box")]
    box_defaults: RawHost,
    step: RawStepDefaults,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawHost {
    cpu: Option<u32>,
    memory: Option<u32>,
    network: Option<String>,
    volume: Option<String>,
    nproc: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawBox {
    name: String,
    image: String,
    runtime: String,
    host: RawHost,
    versions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawStepDefaults {
    user: Option<String>,
    action: Option<RawAction>,
    noutput: Option<usize>,
    /// Seconds.
    timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawAction {
    Run,
    Exec,
    Stop,
}

impl From<RawAction> for Action {
    fn from(raw: RawAction) -> Self {
        match raw {
            RawAction::Run => Action::Run,
            RawAction::Exec => Action::Exec,
            RawAction::Stop => Action::Stop,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawCommand {
    engine: String,
    entry: String,
    before: Option<RawStep>,
    steps: Vec<RawStep>,
    after: Option<RawStep>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawStep {
    #[serde(rename = "box")]
    box_name: String,
    version: String,
    user: Option<String>,
    action: Option<RawAction>,
    command: Vec<String>,
    stdin: bool,
    detach: bool,
    noutput: Option<usize>,
    /// Seconds.
    timeout: Option<u64>,
    env: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_step_applies_hard_fallbacks() {
        let step = fold_step(RawStep::default(), &RawStepDefaults::default());
        assert_eq!(step.user, "sandbox");
        assert_eq!(step.action, Action::Run);
        assert_eq!(step.noutput, 4096);
        assert_eq!(step.timeout, Duration::from_secs(5));
    }

    #[test]
    fn fold_step_prefers_global_defaults_over_fallbacks() {
        let defaults = RawStepDefaults {
            user: Some("runner".to_string()),
            action: Some(RawAction::Exec),
            noutput: Some(1024),
            timeout: Some(9),
        };
        let step = fold_step(RawStep::default(), &defaults);
        assert_eq!(step.user, "runner");
        assert_eq!(step.action, Action::Exec);
        assert_eq!(step.noutput, 1024);
        assert_eq!(step.timeout, Duration::from_secs(9));
    }

    #[test]
    fn fold_step_keeps_explicit_values() {
        let raw = RawStep {
            user: Some("root".to_string()),
            noutput: Some(16),
            timeout: Some(1),
            ..RawStep::default()
        };
        let defaults = RawStepDefaults {
            user: Some("runner".to_string()),
            noutput: Some(1024),
            timeout: Some(9),
            ..RawStepDefaults::default()
        };
        let step = fold_step(raw, &defaults);
        assert_eq!(step.user, "root");
        assert_eq!(step.noutput, 16);
        assert_eq!(step.timeout, Duration::from_secs(1));
    }

    #[test]
    fn fold_host_layers_box_over_defaults() {
        let defaults = fold_host(&RawHost::default(), None);
        assert_eq!(defaults.cpu, 1);
        assert_eq!(defaults.volume, "%s:/sandbox:ro");

        let raw = RawHost {
            memory: Some(256),
            network: Some("bridge".to_string()),
            ..RawHost::default()
        };
        let host = fold_host(&raw, Some(&defaults));
        assert_eq!(host.cpu, 1);
        assert_eq!(host.memory, 256);
        assert_eq!(host.network, "bridge");
        assert_eq!(host.nproc, 64);
    }

    #[test]
    fn unknown_engine_is_a_load_error() {
        let raw = RawCommand {
            engine: "wasm".to_string(),
            steps: vec![RawStep::default()],
            ..RawCommand::default()
        };
        let err = fold_command("python", "run", raw, &RawStepDefaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEngine { .. }));
    }
}
