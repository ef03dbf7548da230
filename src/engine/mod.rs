//! Execution engines.
//!
//! An engine turns a validated [`Request`] into a [`Response`] by driving a
//! configured command pipeline. Two kinds exist: [`DockerEngine`] runs the
//! pipeline as container invocations (the common case), [`HttpEngine`]
//! forwards the request to an upstream HTTP service. The set is closed; the
//! [`Dispatcher`] picks the engine for each `(sandbox, command)` pair from
//! the config, so an unknown engine kind cannot occur at request time.

mod docker;
mod http;

pub use docker::{DockerEngine, expand_vars};
pub use http::HttpEngine;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{Config, EngineKind};
use crate::error::ExecError;
use crate::runner::CommandRunner;

/// A validated execution request.
///
/// `id` doubles as the name of the request's ephemeral container, so it is
/// restricted to container-name-safe characters by its allocator. The entry
/// file is stored under the empty key and renamed on materialization.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub id: String,
    pub sandbox: String,
    /// Version tag applied to steps that do not pin their own.
    pub version: String,
    pub command: String,
    pub files: HashMap<String, String>,
}

/// The outcome of one executed request.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub id: String,
    pub ok: bool,
    /// Wall-clock duration of the whole pipeline, milliseconds.
    pub duration: u64,
    pub stdout: String,
    pub stderr: String,
    /// Error kind, for callers inside the process; the wire sees only
    /// `ok` and `stderr`.
    #[serde(skip)]
    pub err: Option<ExecError>,
}

impl Response {
    /// A failed response carrying the error's message as stderr.
    #[must_use]
    pub fn failure(id: String, err: ExecError, started: Instant) -> Self {
        Self {
            id,
            ok: false,
            duration: started.elapsed().as_millis() as u64,
            stdout: String::new(),
            stderr: err.to_string(),
            err: Some(err),
        }
    }
}

/// A single-operation capability: execute a request to completion.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn exec(&self, req: Request) -> Response;
}

/// Routes requests to the engine configured for their command.
///
/// Built once at startup; engine kinds were validated at config load, so
/// every configured `(sandbox, command)` pair has an instance here.
pub struct Dispatcher {
    engines: HashMap<String, HashMap<String, Arc<dyn Engine>>>,
}

impl Dispatcher {
    /// Builds one engine per configured `(sandbox, command)` pair.
    #[must_use]
    pub fn new(cfg: Arc<Config>, runner: Arc<dyn CommandRunner>) -> Self {
        let mut engines: HashMap<String, HashMap<String, Arc<dyn Engine>>> = HashMap::new();
        for (sandbox, commands) in &cfg.commands {
            let entry = engines.entry(sandbox.clone()).or_default();
            for (name, command) in commands {
                let engine: Arc<dyn Engine> = match command.engine {
                    EngineKind::Docker => Arc::new(DockerEngine::new(
                        cfg.clone(),
                        runner.clone(),
                        sandbox,
                        name,
                    )),
                    EngineKind::Http => Arc::new(HttpEngine::new(cfg.clone(), sandbox, name)),
                };
                entry.insert(name.clone(), engine);
            }
        }
        Self { engines }
    }

    /// Returns the engine for a `(sandbox, command)` pair, if configured.
    #[must_use]
    pub fn resolve(&self, sandbox: &str, command: &str) -> Option<Arc<dyn Engine>> {
        self.engines
            .get(sandbox)
            .and_then(|cmds| cmds.get(command))
            .cloned()
    }
}
