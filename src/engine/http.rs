//! Upstream HTTP engine.
//!
//! The trivial engine variant: instead of driving containers, it forwards
//! the request to an external HTTP service and maps the reply onto the
//! usual response shape. The first step describes the upstream: its first
//! command element is the URL (`:name` expansion applies), its timeout and
//! output cap bound the exchange. Validation happened upstream; no
//! workspace is needed.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, instrument, warn};

use super::docker::expand_vars;
use super::{Engine, Request, Response};
use crate::config::Config;
use crate::error::ExecError;

/// Engine that forwards requests to an upstream HTTP endpoint.
pub struct HttpEngine {
    cfg: Arc<Config>,
    client: reqwest::Client,
    sandbox: String,
    command: String,
}

impl HttpEngine {
    #[must_use]
    pub fn new(cfg: Arc<Config>, sandbox: &str, command: &str) -> Self {
        Self {
            cfg,
            client: reqwest::Client::new(),
            sandbox: sandbox.to_string(),
            command: command.to_string(),
        }
    }

    async fn forward(&self, req: &Request) -> std::result::Result<(String, String, bool), ExecError> {
        let command = self
            .cfg
            .lookup(&self.sandbox, &self.command)
            .ok_or_else(|| ExecError::UnknownCommand(self.command.clone()))?;
        let step = command
            .steps
            .first()
            .ok_or_else(|| ExecError::Internal("http command has no steps".to_string()))?;
        let url = step
            .command
            .first()
            .ok_or_else(|| ExecError::Internal("http step has no url".to_string()))?;
        let url = expand_vars(std::slice::from_ref(url), &req.id).remove(0);

        let payload = json!({
            "id": req.id,
            "sandbox": req.sandbox,
            "command": req.command,
            "files": req.files,
        });

        debug!(url = %url, "forwarding to upstream");
        let reply = self
            .client
            .post(&url)
            .json(&payload)
            .timeout(step.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExecError::Timeout
                } else {
                    warn!(error = %e, "upstream request failed");
                    ExecError::Internal(e.to_string())
                }
            })?;

        let ok = reply.status().is_success();
        let body = reply
            .bytes()
            .await
            .map_err(|e| ExecError::Internal(e.to_string()))?;
        // same silent per-stream cap as the container path
        let capped = &body[..body.len().min(step.noutput)];
        let text = String::from_utf8_lossy(capped).into_owned();

        if ok {
            Ok((text, String::new(), true))
        } else {
            Ok((String::new(), text, false))
        }
    }
}

#[async_trait]
impl Engine for HttpEngine {
    #[instrument(skip(self, req), fields(id = %req.id, sandbox = %self.sandbox, command = %self.command))]
    async fn exec(&self, req: Request) -> Response {
        let started = Instant::now();
        match self.forward(&req).await {
            Ok((stdout, stderr, ok)) => Response {
                id: req.id,
                ok,
                duration: started.elapsed().as_millis() as u64,
                stdout,
                stderr,
                err: if ok { None } else { Some(ExecError::StepFailed(1)) },
            },
            Err(err) => Response::failure(req.id, err, started),
        }
    }
}
