use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use portwait_rs::config::{self, PollOptions};
use portwait_rs::fallback::TokioCommandRunner;
use portwait_rs::pipeline::{self, PipelineConfig};
use portwait_rs::poller::TimeoutFailure;
use portwait_rs::target::ProbeTarget;
use portwait_rs::types::PollReport;

/// portwait-rs — wait for a TCP port to accept connections, then run a build step.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "portwait-rs",
    version,
    about = "Wait for a TCP port to accept connections, with OS-tool fallback detection, then run a build step.",
    long_about = None
)]
struct Cli {
    /// Host to probe.
    #[arg(long, env = "PORTWAIT_HOST", default_value = "localhost")]
    host: String,

    /// TCP port to probe.
    #[arg(
        long,
        env = "PORTWAIT_PORT",
        default_value_t = 1337,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    port: u16,

    /// Overall readiness budget in milliseconds.
    #[arg(long = "max-wait-ms", env = "PORTWAIT_MAX_WAIT_MS", default_value_t = config::DEFAULT_MAX_WAIT.as_millis() as u64)]
    max_wait_ms: u64,

    /// Delay between attempts in milliseconds.
    #[arg(long = "interval-ms", env = "PORTWAIT_INTERVAL_MS", default_value_t = config::DEFAULT_INTERVAL.as_millis() as u64)]
    interval_ms: u64,

    /// Socket connect timeout per attempt in milliseconds.
    #[arg(long = "probe-timeout-ms", env = "PORTWAIT_PROBE_TIMEOUT_MS", default_value_t = config::DEFAULT_PROBE_TIMEOUT.as_millis() as u64)]
    probe_timeout_ms: u64,

    /// Timeout for each fallback command (ss, netstat, lsof, /proc/net/tcp{,6}) in milliseconds.
    #[arg(long = "fallback-timeout-ms", env = "PORTWAIT_FALLBACK_TIMEOUT_MS", default_value_t = config::DEFAULT_FALLBACK_TIMEOUT.as_millis() as u64)]
    fallback_timeout_ms: u64,

    /// Only use the socket probe.
    #[arg(long = "no-fallback", env = "PORTWAIT_NO_FALLBACK", default_value_t = false)]
    no_fallback: bool,

    /// Shell command that starts the server. It is killed when portwait-rs finishes.
    #[arg(long, env = "PORTWAIT_SERVE")]
    serve: Option<String>,

    /// Shell command to run once the port is reachable.
    #[arg(long, env = "PORTWAIT_THEN")]
    then: Option<String>,

    /// Write a poll report as pretty JSON to this path (optional).
    #[arg(long, env = "PORTWAIT_OUTPUT")]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let target = ProbeTarget::new(cli.host.as_str(), cli.port)?;
    let options = PollOptions {
        max_wait: Duration::from_millis(cli.max_wait_ms),
        interval: Duration::from_millis(cli.interval_ms),
        probe_timeout: Duration::from_millis(cli.probe_timeout_ms),
        fallback: !cli.no_fallback,
    };

    info!(
        endpoint = %target,
        max_wait_ms = cli.max_wait_ms,
        interval_ms = cli.interval_ms,
        probe_timeout_ms = cli.probe_timeout_ms,
        fallback = options.fallback,
        serve = cli.serve.as_deref().unwrap_or("<none>"),
        then = cli.then.as_deref().unwrap_or("<none>"),
        "portwait-rs configuration"
    );

    // Ctrl-C cancels the pipeline, which still tears the server down.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    let config = PipelineConfig {
        target: target.clone(),
        options: options.clone(),
        serve: cli.serve,
        then: cli.then,
    };
    let runner = TokioCommandRunner::new(Duration::from_millis(cli.fallback_timeout_ms));

    let started = Instant::now();
    let result = pipeline::run_pipeline(&config, &runner, cancel).await;

    if let Some(path) = cli.output.as_deref() {
        let report = match &result {
            Ok(readiness) => Some(PollReport::ready(&target, readiness, cli.max_wait_ms)),
            Err(e) => e.downcast_ref::<TimeoutFailure>().map(|failure| {
                PollReport::timed_out(failure, started.elapsed().as_millis() as u64)
            }),
        };
        if let Some(report) = report {
            if let Err(e) = report.write_json(path) {
                error!(path = %path.display(), error = %e, "failed to write report");
            } else {
                info!(path = %path.display(), "wrote poll report");
            }
        }
    }

    let readiness = result?;
    info!(
        endpoint = %target,
        method = %readiness.method,
        attempts = readiness.attempts,
        "done"
    );
    Ok(())
}
