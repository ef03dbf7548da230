//! Error types for codebox.
//!
//! Uses thiserror for deriving std::error::Error and miette for rich diagnostics.
//!
//! There are two families here. `ConfigError`, `ServerError`, `SystemError`
//! and `RunnerError` abort startup or a single subprocess and flow through
//! `Result` as usual. `ExecError` is request-scoped and wire-visible: its
//! `Display` strings are returned verbatim in the response `stderr`, so
//! their exact wording is part of the service contract.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the application.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error")]
    #[diagnostic(code(codebox::config))]
    Config(#[from] ConfigError),

    /// HTTP server error
    #[error("HTTP server error")]
    #[diagnostic(code(codebox::server))]
    Server(#[from] ServerError),

    /// Startup environment checks failed
    #[error("Environment check failed")]
    #[diagnostic(code(codebox::system))]
    System(#[from] SystemError),

    /// I/O error
    #[error("I/O error: {0}")]
    #[diagnostic(code(codebox::io))]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading and validating the config tree.
#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    /// A config file could not be read
    #[error("cannot read {}", .path.display())]
    #[diagnostic(code(codebox::config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config file is not valid JSON (or does not match the schema)
    #[error("cannot parse {}", .path.display())]
    #[diagnostic(code(codebox::config::parse))]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A command has an empty step list
    #[error("command {sandbox}.{command} has no steps")]
    #[diagnostic(code(codebox::config::no_steps))]
    NoSteps { sandbox: String, command: String },

    /// A command names an engine this build does not provide
    #[error("command {sandbox}.{command} uses unknown engine {engine:?}")]
    #[diagnostic(
        code(codebox::config::unknown_engine),
        help("supported engines are \"docker\" and \"http\"")
    )]
    UnknownEngine {
        sandbox: String,
        command: String,
        engine: String,
    },

    /// A step references a box that is not declared
    #[error("command {sandbox}.{command} references undeclared box {box_name:?}")]
    #[diagnostic(
        code(codebox::config::unknown_box),
        help("declare the box under boxes/, or use the \":name\" placeholder")
    )]
    UnknownStepBox {
        sandbox: String,
        command: String,
        box_name: String,
    },

    /// A step has a zero output cap after defaults were folded in
    #[error("command {sandbox}.{command} has a step with a zero output cap")]
    #[diagnostic(code(codebox::config::zero_output_cap))]
    ZeroOutputCap { sandbox: String, command: String },
}

/// Errors related to the HTTP server.
#[derive(Error, Debug, Diagnostic)]
pub enum ServerError {
    /// Failed to bind the listen address
    #[error("cannot listen on {addr}")]
    #[diagnostic(code(codebox::server::bind))]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The server loop failed
    #[error("server failed")]
    #[diagnostic(code(codebox::server::serve))]
    Serve(#[source] std::io::Error),
}

/// Errors from the startup environment checks.
#[derive(Error, Debug, Diagnostic)]
pub enum SystemError {
    /// The container runtime client is missing
    #[error("docker binary not found on PATH")]
    #[diagnostic(
        code(codebox::system::docker),
        help("install docker, or run with --skip-checks if the runtime lives elsewhere")
    )]
    DockerNotFound,

    /// The workspace root is not writable
    #[error("temp root {} is not writable", .path.display())]
    #[diagnostic(code(codebox::system::temp_root))]
    TempRootUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from a single subprocess invocation.
#[derive(Error, Debug, Diagnostic)]
pub enum RunnerError {
    /// The wall-clock timeout fired before the process exited
    #[error("step timed out")]
    #[diagnostic(code(codebox::runner::timeout))]
    Timeout,

    /// The process could not be spawned at all
    #[error("cannot spawn {program}")]
    #[diagnostic(code(codebox::runner::spawn))]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O with the child process failed
    #[error("subprocess i/o failed")]
    #[diagnostic(code(codebox::runner::io))]
    Io(#[from] std::io::Error),
}

/// Request-scoped execution errors.
///
/// The `Display` output of every variant is wire-visible: the HTTP layer
/// returns it in the response `stderr` with `ok = false`. Tests assert the
/// exact strings, so changes here are breaking.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The request names a sandbox that is not configured
    #[error("unknown sandbox {0}")]
    #[diagnostic(code(codebox::exec::unknown_sandbox))]
    UnknownSandbox(String),

    /// The sandbox exists but has no such command
    #[error("unknown command {0}")]
    #[diagnostic(code(codebox::exec::unknown_command))]
    UnknownCommand(String),

    /// Box/version resolution failed
    #[error("unknown box {name}:{version}")]
    #[diagnostic(code(codebox::exec::unknown_box))]
    UnknownBox { name: String, version: String },

    /// A request file has an unsafe or empty name
    #[error("files[{0}]: invalid name")]
    #[diagnostic(code(codebox::exec::invalid_filename))]
    InvalidFilename(String),

    /// The request carries more files than the configured cap
    #[error("too many files (max {0})")]
    #[diagnostic(code(codebox::exec::too_many_files))]
    TooManyFiles(usize),

    /// A single file exceeds the configured byte cap
    #[error("files[{name}]: too large (max {max} bytes)")]
    #[diagnostic(code(codebox::exec::file_too_large))]
    FileTooLarge { name: String, max: usize },

    /// The command declares an entry file but the request has none
    #[error("missing entry file")]
    #[diagnostic(code(codebox::exec::missing_entry))]
    MissingEntry,

    /// A step hit its wall-clock timeout
    #[error("step timed out")]
    #[diagnostic(code(codebox::exec::timeout))]
    Timeout,

    /// A step exited with a non-zero code; its captured stderr is returned
    /// instead of this message
    #[error("step failed with exit code {0}")]
    #[diagnostic(code(codebox::exec::step_failed))]
    StepFailed(i32),

    /// The runner could not spawn the process or I/O failed. The detail is
    /// logged server-side; the wire message stays generic.
    #[error("internal error")]
    #[diagnostic(code(codebox::exec::internal))]
    Internal(String),

    /// The worker pool queue is full
    #[error("busy")]
    #[diagnostic(code(codebox::exec::busy))]
    Busy,
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
