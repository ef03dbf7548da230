//! Container pipeline engine.
//!
//! This is the core of the service: it turns a declarative command (an
//! optional `before` hook, a list of steps, an optional `after` hook) into
//! a sequence of bounded `docker run|exec|stop` invocations against the
//! request's ephemeral container and workspace.
//!
//! # Lifecycle of a detached box
//!
//! ```text
//!  NONE ──run --detach──► RUNNING ──exec──► RUNNING ──stop / after──► STOPPED
//! ```
//!
//! The container is named after the request ID, so concurrent requests
//! never collide. The `after` hook is the release action for the detached
//! container: it runs whenever the `before` hook succeeded (or is absent),
//! regardless of step outcomes — with one exception: an `after` whose
//! action is `stop` is skipped unless a detached container was actually
//! started, since there would be nothing to stop.
//!
//! # Output aggregation
//!
//! Response stdout/stderr aggregate the primary steps only; hook stdout is
//! discarded and only `after`'s stderr is appended. A failing `after` is
//! logged, and flips the response to failure only when the primary outcome
//! was success.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use super::{Engine, Request, Response};
use crate::config::{Action, Config, NAME_VAR, Step};
use crate::error::{ExecError, RunnerError};
use crate::runner::{CmdOut, CommandRunner, Limits};
use crate::workspace;

/// Replaces every occurrence of the `:name` token inside argv elements.
///
/// This is the whole template mechanism: a literal scan-and-replace, run
/// once after argv assembly. Argv without the token passes through
/// unchanged.
#[must_use]
pub fn expand_vars(argv: &[String], name: &str) -> Vec<String> {
    argv.iter().map(|arg| arg.replace(NAME_VAR, name)).collect()
}

/// Engine driving a command pipeline through the docker CLI.
pub struct DockerEngine {
    cfg: Arc<Config>,
    runner: Arc<dyn CommandRunner>,
    sandbox: String,
    command: String,
}

/// Output accumulated from the primary steps (plus `after`'s stderr).
#[derive(Default)]
struct Captured {
    stdout: String,
    stderr: String,
}

impl DockerEngine {
    #[must_use]
    pub fn new(
        cfg: Arc<Config>,
        runner: Arc<dyn CommandRunner>,
        sandbox: &str,
        command: &str,
    ) -> Self {
        Self {
            cfg,
            runner,
            sandbox: sandbox.to_string(),
            command: command.to_string(),
        }
    }

    async fn run_pipeline(
        &self,
        req: &Request,
        acc: &mut Captured,
    ) -> std::result::Result<(), ExecError> {
        let command = self
            .cfg
            .lookup(&self.sandbox, &self.command)
            .ok_or_else(|| ExecError::UnknownCommand(self.command.clone()))?;

        // held for the whole step list; dropped (and removed) on every exit path
        let ws = workspace::materialize(&req.files, &command.entry).await?;

        let deadline = Instant::now() + self.cfg.limits.request_timeout;
        let mut detached = false;
        let mut primary: std::result::Result<(), ExecError> = Ok(());

        if let Some(before) = &command.before {
            match self.exec_step(before, req, ws.path(), Some(deadline)).await {
                Ok(out) if out.success() => {
                    if before.detach {
                        detached = true;
                    }
                }
                Ok(out) => {
                    acc.stderr.push_str(&out.stderr);
                    primary = Err(ExecError::StepFailed(out.exit_code));
                }
                Err(e) => primary = Err(e),
            }
            if primary.is_err() {
                // the hook never produced a container, so there is nothing
                // for `after` to release
                return primary;
            }
        }

        for step in &command.steps {
            match self.exec_step(step, req, ws.path(), Some(deadline)).await {
                Ok(out) => {
                    acc.stdout.push_str(&out.stdout);
                    acc.stderr.push_str(&out.stderr);
                    if step.detach && out.success() {
                        detached = true;
                    }
                    if !out.success() {
                        primary = Err(ExecError::StepFailed(out.exit_code));
                        break;
                    }
                }
                Err(e) => {
                    primary = Err(e);
                    break;
                }
            }
        }

        if let Some(after) = &command.after {
            if after.action != Action::Stop || detached {
                // no deadline here: the release action gets its own full
                // timeout even when the request budget is spent
                match self.exec_step(after, req, ws.path(), None).await {
                    Ok(out) if out.success() => acc.stderr.push_str(&out.stderr),
                    Ok(out) => {
                        warn!(
                            sandbox = %self.sandbox,
                            command = %self.command,
                            exit_code = out.exit_code,
                            stderr = %out.stderr,
                            "after hook failed"
                        );
                        if primary.is_ok() {
                            acc.stderr.push_str(&out.stderr);
                            primary = Err(ExecError::StepFailed(out.exit_code));
                        }
                    }
                    Err(e) => {
                        warn!(
                            sandbox = %self.sandbox,
                            command = %self.command,
                            error = %e,
                            "after hook errored"
                        );
                        if primary.is_ok() {
                            primary = Err(e);
                        }
                    }
                }
            }
        }

        primary
    }

    async fn exec_step(
        &self,
        step: &Step,
        req: &Request,
        dir: &Path,
        deadline: Option<Instant>,
    ) -> std::result::Result<CmdOut, ExecError> {
        let timeout = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(ExecError::Timeout);
                }
                step.timeout.min(remaining)
            }
            None => step.timeout,
        };

        let argv = self.step_argv(step, req, dir)?;
        let argv = expand_vars(&argv, &req.id);
        debug!(argv = %argv.join(" "), "executing step");

        let stdin: Option<&[u8]> = if step.stdin {
            req.files.get("").map(String::as_bytes)
        } else {
            None
        };

        let limits = Limits {
            noutput: step.noutput,
            timeout,
        };
        match self.runner.run(&argv, stdin, &limits).await {
            Ok(out) => Ok(out),
            Err(RunnerError::Timeout) => Err(ExecError::Timeout),
            Err(e) => {
                warn!(error = %e, "runner failed");
                Err(ExecError::Internal(e.to_string()))
            }
        }
    }

    fn step_argv(
        &self,
        step: &Step,
        req: &Request,
        dir: &Path,
    ) -> std::result::Result<Vec<String>, ExecError> {
        match step.action {
            Action::Run => self.run_argv(step, req, dir),
            Action::Exec => Ok(exec_argv(step)),
            Action::Stop => Ok(vec![
                "docker".to_string(),
                "stop".to_string(),
                step.box_name.clone(),
            ]),
        }
    }

    /// Assembles `docker run` argv from the resolved box envelope.
    ///
    /// The resource flags pass through the box's host envelope unchanged;
    /// the engine never interprets them.
    fn run_argv(
        &self,
        step: &Step,
        req: &Request,
        dir: &Path,
    ) -> std::result::Result<Vec<String>, ExecError> {
        let version = if step.version.is_empty() {
            &req.version
        } else {
            &step.version
        };
        let bx = self.cfg.resolve_box(&step.box_name, version)?;
        let host = &bx.host;

        let mut argv = vec![
            "docker".to_string(),
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            req.id.clone(),
            "--runtime".to_string(),
            bx.runtime.clone(),
            "--network".to_string(),
            host.network.clone(),
            "--cpus".to_string(),
            host.cpu.to_string(),
            "--memory".to_string(),
            format!("{}m", host.memory),
            "--pids-limit".to_string(),
            host.nproc.to_string(),
            "--volume".to_string(),
            host.volume.replacen("%s", &dir.display().to_string(), 1),
        ];
        for (key, value) in &step.env {
            argv.push("--env".to_string());
            argv.push(format!("{key}={value}"));
        }
        if step.detach {
            argv.push("--detach".to_string());
        }
        if step.stdin {
            argv.push("--interactive".to_string());
        }
        argv.push("--user".to_string());
        argv.push(step.user.clone());
        argv.push(bx.image.clone());
        argv.extend(step.command.iter().cloned());
        Ok(argv)
    }
}

/// Assembles `docker exec` argv targeting a running container by name.
///
/// No box resolution happens here: the step's box field *is* the container
/// name (usually the `:name` placeholder, expanded later).
fn exec_argv(step: &Step) -> Vec<String> {
    let mut argv = vec![
        "docker".to_string(),
        "exec".to_string(),
        "--interactive".to_string(),
    ];
    for (key, value) in &step.env {
        argv.push("--env".to_string());
        argv.push(format!("{key}={value}"));
    }
    argv.push("--user".to_string());
    argv.push(step.user.clone());
    argv.push(step.box_name.clone());
    argv.extend(step.command.iter().cloned());
    argv
}

#[async_trait]
impl Engine for DockerEngine {
    #[instrument(skip(self, req), fields(id = %req.id, sandbox = %self.sandbox, command = %self.command))]
    async fn exec(&self, req: Request) -> Response {
        let started = Instant::now();
        let mut acc = Captured::default();
        let err = self.run_pipeline(&req, &mut acc).await.err();

        let stderr = match &err {
            // a failed step already put its stderr into the accumulator
            None | Some(ExecError::StepFailed(_)) => acc.stderr,
            // other kinds report their own message
            Some(e) => e.to_string(),
        };

        Response {
            id: req.id,
            ok: err.is_none(),
            duration: started.elapsed().as_millis() as u64,
            stdout: acc.stdout,
            stderr,
            err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn expands_name_token() {
        let cases = [
            (vec!["python", "main.py"], "python main.py"),
            (vec!["sh", "create.sh", ":name"], "sh create.sh codebox_01"),
            (
                vec!["sh", "copy.sh", ":name", "new-:name"],
                "sh copy.sh codebox_01 new-codebox_01",
            ),
            (vec!["psql", "--user=:name"], "psql --user=codebox_01"),
        ];
        for (src, want) in cases {
            let expanded = expand_vars(&argv(&src), "codebox_01");
            assert_eq!(expanded.join(" "), want);
        }
    }

    #[test]
    fn expansion_is_idempotent_without_the_token() {
        let src = argv(&["docker", "run", "--rm", "codapi/python", "python", "main.py"]);
        let once = expand_vars(&src, "http_42");
        let twice = expand_vars(&once, "http_42");
        assert_eq!(once, src);
        assert_eq!(twice, src);
    }
}
