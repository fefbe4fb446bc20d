//! Serve → wait → build → teardown orchestration.
//!
//! The dev server and the downstream build are opaque shell commands. The
//! server is killed once the pipeline finishes, whatever the outcome.

use std::process::Stdio;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::PollOptions;
use crate::fallback::CommandRunner;
use crate::poller::{self, Readiness};
use crate::target::ProbeTarget;

/// What the pipeline should run and wait for.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub target: ProbeTarget,
    pub options: PollOptions,
    /// Command that starts the server; omitted when something else owns it.
    pub serve: Option<String>,
    /// Command to run once the target is reachable.
    pub then: Option<String>,
}

/// Run the pipeline, propagating [`poller::TimeoutFailure`] unwrapped so callers can downcast it.
pub async fn run_pipeline<R: CommandRunner>(
    config: &PipelineConfig,
    runner: &R,
    cancel: CancellationToken,
) -> Result<Readiness> {
    let mut server = match config.serve.as_deref() {
        Some(cmd) => Some(spawn_server(cmd)?),
        None => None,
    };

    let result = drive(config, runner, &cancel, server.as_mut()).await;

    if let Some(child) = server.as_mut() {
        teardown(child).await;
    }
    result
}

async fn drive<R: CommandRunner>(
    config: &PipelineConfig,
    runner: &R,
    cancel: &CancellationToken,
    server: Option<&mut Child>,
) -> Result<Readiness> {
    let wait = poller::wait_until_ready_with(&config.target, &config.options, runner);
    let readiness = match server {
        Some(child) => tokio::select! {
            res = wait => res?,
            status = child.wait() => {
                let status = status.context("failed to monitor server process")?;
                bail!(
                    "server command exited before {} became reachable ({status})",
                    config.target
                );
            }
            () = cancel.cancelled() => bail!("cancelled while waiting for {}", config.target),
        },
        None => tokio::select! {
            res = wait => res?,
            () = cancel.cancelled() => bail!("cancelled while waiting for {}", config.target),
        },
    };

    if let Some(cmd) = config.then.as_deref() {
        info!(command = cmd, "running build step");
        let mut build = shell(cmd);
        build.kill_on_drop(true);
        let status = tokio::select! {
            status = build.status() => {
                status.with_context(|| format!("failed to run build command: {cmd}"))?
            }
            () = cancel.cancelled() => bail!("cancelled during build step"),
        };
        if !status.success() {
            bail!("build command failed ({status}): {cmd}");
        }
        info!(command = cmd, "build step finished");
    }

    Ok(readiness)
}

fn shell(cmd: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(cmd);
    command
}

/// Start the server with its output forwarded to the log.
fn spawn_server(cmd: &str) -> Result<Child> {
    let mut child = shell(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn server command: {cmd}"))?;
    info!(command = cmd, pid = ?child.id(), "server started");

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, "stdout"));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, "stderr"));
    }
    Ok(child)
}

async fn forward_lines<T: AsyncRead + Unpin>(reader: T, stream: &'static str) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(target: "server", stream, "{line}");
    }
}

async fn teardown(child: &mut Child) {
    match child.try_wait() {
        Ok(Some(status)) => {
            info!(%status, "server already exited");
            return;
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "failed to query server status"),
    }
    info!(pid = ?child.id(), "stopping server");
    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to stop server");
    }
}
