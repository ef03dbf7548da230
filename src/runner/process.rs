//! Real subprocess runner on top of `tokio::process`.
//!
//! Both output pipes are drained to EOF even after the byte cap is reached:
//! if the reader stopped at the cap, a chatty child would fill the pipe and
//! block forever. Capping and draining are therefore separate concerns in
//! [`read_capped`].

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, instrument, trace};

use super::{CmdOut, CommandRunner, Limits};
use crate::error::RunnerError;

/// Runner that executes argv as a host subprocess.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

impl ProcessRunner {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    #[instrument(skip_all, fields(program = argv.first().map(String::as_str).unwrap_or_default()))]
    async fn run(
        &self,
        argv: &[String],
        stdin: Option<&[u8]>,
        limits: &Limits,
    ) -> std::result::Result<CmdOut, RunnerError> {
        let (program, args) = argv.split_first().ok_or_else(|| RunnerError::Spawn {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv"),
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        trace!(argv = %argv.join(" "), "spawning");
        let mut child = cmd.spawn().map_err(|e| RunnerError::Spawn {
            program: program.clone(),
            source: e,
        })?;

        let stdin_pipe = child.stdin.take();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let cap = limits.noutput;

        let work = async {
            let feed = async {
                if let (Some(mut pipe), Some(input)) = (stdin_pipe, stdin) {
                    pipe.write_all(input).await?;
                    pipe.shutdown().await?;
                }
                Ok::<_, std::io::Error>(())
            };
            let (_, stdout, stderr, status) = tokio::try_join!(
                feed,
                read_capped(stdout_pipe, cap),
                read_capped(stderr_pipe, cap),
                child.wait(),
            )?;
            Ok::<_, std::io::Error>((stdout, stderr, status))
        };

        let outcome = tokio::time::timeout(limits.timeout, work).await;
        match outcome {
            Ok(Ok((stdout, stderr, status))) => {
                let out = CmdOut {
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                    exit_code: status.code().unwrap_or(-1),
                };
                debug!(exit_code = out.exit_code, "process finished");
                Ok(out)
            }
            Ok(Err(e)) => Err(RunnerError::Io(e)),
            Err(_) => {
                debug!(timeout_ms = limits.timeout.as_millis() as u64, "killing timed-out process");
                let _ = child.start_kill();
                let _ = child.wait().await;
                Err(RunnerError::Timeout)
            }
        }
    }
}

/// Reads a stream to EOF, keeping only the first `cap` bytes.
async fn read_capped<R>(reader: Option<R>, cap: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };

    let mut kept = Vec::with_capacity(cap.min(8 * 1024));
    let mut chunk = [0u8; 8 * 1024];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if kept.len() < cap {
            let take = (cap - kept.len()).min(n);
            kept.extend_from_slice(&chunk[..take]);
        }
        // keep draining past the cap so the child never blocks on a full pipe
    }
    Ok(kept)
}
