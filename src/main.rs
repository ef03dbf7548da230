//! Codebox - Entry Point
//!
//! This is the main entry point for the service binary.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use codebox::engine::Dispatcher;
use codebox::pool::WorkerPool;
use codebox::runner::{CommandRunner, ProcessRunner};
use codebox::server::{self, AppState};
use codebox::{config, system};

/// Codebox - run code snippets in disposable containers.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding config.json, boxes/ and commands/
    #[arg(short, long, default_value = "config")]
    config: PathBuf,

    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:1313")]
    bind: String,

    /// Skip startup environment checks
    #[arg(long, default_value = "false")]
    skip_checks: bool,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    info!("codebox v{}", env!("CARGO_PKG_VERSION"));

    if args.skip_checks {
        warn!("Skipping environment checks (--skip-checks)");
    } else {
        let reqs = system::check_all().into_diagnostic()?;
        info!(
            "Environment ready: docker at {}, workspaces under {}",
            reqs.docker_path.display(),
            reqs.temp_root.display()
        );
    }

    let cfg = config::read(&args.config).into_diagnostic()?;
    info!(
        boxes = cfg.boxes.len(),
        sandboxes = cfg.commands.len(),
        workers = cfg.pool.workers,
        queue = cfg.pool.queue,
        "configuration loaded"
    );

    let config = Arc::new(cfg);
    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
    let dispatcher = Arc::new(Dispatcher::new(config.clone(), runner));
    let pool = Arc::new(WorkerPool::new(config.pool.workers, config.pool.queue));

    server::serve(
        &args.bind,
        AppState {
            config,
            dispatcher,
            pool,
        },
    )
    .await
    .into_diagnostic()
}
