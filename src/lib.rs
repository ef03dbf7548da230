//! Codebox - multi-tenant code execution service.
//!
//! This crate receives source snippets over HTTP and runs them inside
//! disposable, resource-constrained containers. A client names a sandbox,
//! a command and a set of files; the service materializes the files into
//! an ephemeral workspace, drives the configured pipeline of container
//! invocations through the docker CLI, captures bounded stdout/stderr and
//! returns a structured result.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use codebox::engine::Dispatcher;
//! use codebox::pool::WorkerPool;
//! use codebox::runner::ProcessRunner;
//! use codebox::server::{self, AppState};
//!
//! #[tokio::main]
//! async fn main() -> miette::Result<()> {
//!     let config = Arc::new(codebox::config::read("config".as_ref())
//!         .map_err(codebox::Error::from)?);
//!     let dispatcher = Arc::new(Dispatcher::new(
//!         config.clone(),
//!         Arc::new(ProcessRunner::new()),
//!     ));
//!     let pool = Arc::new(WorkerPool::new(config.pool.workers, config.pool.queue));
//!
//!     server::serve("127.0.0.1:1313", AppState { config, dispatcher, pool })
//!         .await
//!         .map_err(codebox::Error::from)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod pool;
pub mod runner;
pub mod server;
pub mod system;
pub mod validator;
pub mod workspace;

// Re-export commonly used types
pub use engine::{Dispatcher, Engine, Request, Response};
pub use error::{Error, ExecError, Result};
