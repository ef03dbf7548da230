//! Request validation.
//!
//! Runs before a request is queued, so bad requests never consume a worker
//! or touch the filesystem. Checks are ordered: sandbox existence, command
//! existence, file count cap, per-file size cap, filename safety, entry
//! presence. The first failure wins and bypasses the engine entirely.

use crate::config::Config;
use crate::engine::Request;
use crate::error::ExecError;
use crate::workspace;

/// Validates a request against the loaded config.
///
/// # Errors
///
/// Returns the specific [`ExecError`] kind for the first violated check.
pub fn validate(cfg: &Config, req: &Request) -> std::result::Result<(), ExecError> {
    let commands = cfg
        .commands
        .get(&req.sandbox)
        .ok_or_else(|| ExecError::UnknownSandbox(req.sandbox.clone()))?;
    let command = commands
        .get(&req.command)
        .ok_or_else(|| ExecError::UnknownCommand(req.command.clone()))?;

    if req.files.len() > cfg.limits.max_files {
        return Err(ExecError::TooManyFiles(cfg.limits.max_files));
    }
    for (name, content) in &req.files {
        if content.len() > cfg.limits.max_file_size {
            return Err(ExecError::FileTooLarge {
                name: name.clone(),
                max: cfg.limits.max_file_size,
            });
        }
    }
    for name in req.files.keys() {
        if name.is_empty() {
            // the entry file needs a declared name to be stored under
            if command.entry.is_empty() {
                return Err(ExecError::InvalidFilename(String::new()));
            }
        } else if !workspace::is_safe_name(name) {
            return Err(ExecError::InvalidFilename(name.clone()));
        }
    }

    if req.files.is_empty() {
        return Err(ExecError::MissingEntry);
    }
    if !command.entry.is_empty() && !req.files.contains_key("") {
        return Err(ExecError::MissingEntry);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::config::{
        Action, BoxSpec, Command, EngineKind, Host, PoolSettings, RequestLimits, Step,
    };

    fn config() -> Config {
        let step = Step {
            box_name: "python".to_string(),
            version: String::new(),
            user: "sandbox".to_string(),
            action: Action::Run,
            command: vec!["python".to_string(), "main.py".to_string()],
            stdin: false,
            detach: false,
            noutput: 4096,
            timeout: Duration::from_secs(5),
            env: Default::default(),
        };
        let command = Command {
            engine: EngineKind::Docker,
            entry: "main.py".to_string(),
            before: None,
            steps: vec![step],
            after: None,
        };
        Config {
            pool: PoolSettings { workers: 1, queue: 1 },
            limits: RequestLimits {
                max_files: 2,
                max_file_size: 16,
                request_timeout: Duration::from_secs(30),
            },
            boxes: HashMap::from([(
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
            )]),
            commands: HashMap::from([(
                "python".to_string(),
                HashMap::from([("run".to_string(), command)]),
            )]),
        }
    }

    fn request(files: &[(&str, &str)]) -> Request {
        Request {
            id: "http_42".to_string(),
            sandbox: "python".to_string(),
            version: String::new(),
            command: "run".to_string(),
            files: files
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn accepts_a_well_formed_request() {
        assert!(validate(&config(), &request(&[("", "print(1)")])).is_ok());
    }

    #[test]
    fn rejects_unknown_sandbox() {
        let mut req = request(&[("", "x")]);
        req.sandbox = "rust".to_string();
        let err = validate(&config(), &req).unwrap_err();
        assert_eq!(err.to_string(), "unknown sandbox rust");
    }

    #[test]
    fn rejects_unknown_command() {
        let mut req = request(&[("", "x")]);
        req.command = "test".to_string();
        let err = validate(&config(), &req).unwrap_err();
        assert_eq!(err.to_string(), "unknown command test");
    }

    #[test]
    fn rejects_too_many_files() {
        let req = request(&[("", "x"), ("a.txt", "1"), ("b.txt", "2")]);
        assert_eq!(
            validate(&config(), &req).unwrap_err(),
            ExecError::TooManyFiles(2)
        );
    }

    #[test]
    fn rejects_oversized_file() {
        let req = request(&[("", "this is seventeen")]);
        assert!(matches!(
            validate(&config(), &req).unwrap_err(),
            ExecError::FileTooLarge { max: 16, .. }
        ));
    }

    #[test]
    fn rejects_traversal_name() {
        let req = request(&[("", "x"), ("../evil", "y")]);
        let err = validate(&config(), &req).unwrap_err();
        assert_eq!(err.to_string(), "files[../evil]: invalid name");
    }

    #[test]
    fn rejects_empty_files_map() {
        assert_eq!(
            validate(&config(), &request(&[])).unwrap_err(),
            ExecError::MissingEntry
        );
    }

    #[test]
    fn rejects_missing_entry_when_declared() {
        let req = request(&[("data.txt", "1 2 3")]);
        assert_eq!(
            validate(&config(), &req).unwrap_err(),
            ExecError::MissingEntry
        );
    }
}
