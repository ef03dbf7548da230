//! Load-time cross checks over the folded config tree.
//!
//! Request handling assumes these hold, so they are enforced once here
//! rather than on the hot path: every command has at least one step, every
//! step box resolves (or is the `:name` placeholder), and output caps are
//! positive. A command that starts a detached box but never stops it is a
//! container leak; that is reported as a warning at load time, not at
//! request time.

use tracing::warn;

use super::{Action, Command, Config, NAME_VAR, Step};
use crate::error::ConfigError;

pub(super) fn validate(cfg: &Config) -> std::result::Result<(), ConfigError> {
    for (sandbox, commands) in &cfg.commands {
        for (name, command) in commands {
            validate_command(cfg, sandbox, name, command)?;
        }
    }
    Ok(())
}

fn validate_command(
    cfg: &Config,
    sandbox: &str,
    name: &str,
    command: &Command,
) -> std::result::Result<(), ConfigError> {
    if command.steps.is_empty() {
        return Err(ConfigError::NoSteps {
            sandbox: sandbox.to_string(),
            command: name.to_string(),
        });
    }

    for step in all_steps(command) {
        if step.noutput == 0 {
            return Err(ConfigError::ZeroOutputCap {
                sandbox: sandbox.to_string(),
                command: name.to_string(),
            });
        }
        if step.box_name != NAME_VAR && !cfg.boxes.contains_key(&step.box_name) {
            return Err(ConfigError::UnknownStepBox {
                sandbox: sandbox.to_string(),
                command: name.to_string(),
                box_name: step.box_name.clone(),
            });
        }
    }

    let detaches = all_steps(command).any(|s| s.detach);
    let stops = all_steps(command).any(|s| s.action == Action::Stop);
    if detaches && !stops {
        warn!(
            sandbox,
            command = name,
            "command starts a detached box but never stops it; containers will leak"
        );
    }

    Ok(())
}

fn all_steps(command: &Command) -> impl Iterator<Item = &Step> {
    command
        .before
        .iter()
        .chain(command.steps.iter())
        .chain(command.after.iter())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::config::{BoxSpec, EngineKind, Host, PoolSettings, RequestLimits};

    fn step(box_name: &str) -> Step {
        Step {
            box_name: box_name.to_string(),
            version: String::new(),
            user: "sandbox".to_string(),
            action: Action::Run,
            command: vec!["true".to_string()],
            stdin: false,
            detach: false,
            noutput: 4096,
            timeout: Duration::from_secs(5),
            env: Default::default(),
        }
    }

    fn config_with(command: Command) -> Config {
        let mut commands = HashMap::new();
        commands.insert(
            "python".to_string(),
            HashMap::from([("run".to_string(), command)]),
        );
        let mut boxes = HashMap::new();
        boxes.insert(
            "python".to_string(),
            BoxSpec {
                name: "python".to_string(),
                image: "codapi/python".to_string(),
                runtime: "runc".to_string(),
                host: Host {
                    cpu: 1,
                    memory: 64,
                    network: "none".to_string(),
                    volume: "%s:/sandbox:ro".to_string(),
                    nproc: 64,
                },
            },
        );
        Config {
            pool: PoolSettings { workers: 1, queue: 1 },
            limits: RequestLimits {
                max_files: 10,
                max_file_size: 1024,
                request_timeout: Duration::from_secs(30),
            },
            boxes,
            commands,
        }
    }

    #[test]
    fn accepts_resolvable_steps() {
        let cfg = config_with(Command {
            engine: EngineKind::Docker,
            entry: "main.py".to_string(),
            before: None,
            steps: vec![step("python")],
            after: None,
        });
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn accepts_name_placeholder() {
        let cfg = config_with(Command {
            engine: EngineKind::Docker,
            entry: String::new(),
            before: None,
            steps: vec![step(NAME_VAR)],
            after: None,
        });
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn rejects_empty_step_list() {
        let cfg = config_with(Command {
            engine: EngineKind::Docker,
            entry: String::new(),
            before: None,
            steps: vec![],
            after: None,
        });
        assert!(matches!(
            validate(&cfg),
            Err(ConfigError::NoSteps { .. })
        ));
    }

    #[test]
    fn rejects_undeclared_box() {
        let cfg = config_with(Command {
            engine: EngineKind::Docker,
            entry: String::new(),
            before: None,
            steps: vec![step("rust")],
            after: None,
        });
        assert!(matches!(
            validate(&cfg),
            Err(ConfigError::UnknownStepBox { box_name, .. }) if box_name == "rust"
        ));
    }

    #[test]
    fn rejects_zero_output_cap() {
        let mut bad = step("python");
        bad.noutput = 0;
        let cfg = config_with(Command {
            engine: EngineKind::Docker,
            entry: String::new(),
            before: None,
            steps: vec![bad],
            after: None,
        });
        assert!(matches!(
            validate(&cfg),
            Err(ConfigError::ZeroOutputCap { .. })
        ));
    }
}
