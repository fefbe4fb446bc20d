//! OS-level listener detection used when the direct socket probe fails.
//!
//! Minimal containers sometimes refuse a loopback connect even though the
//! server is bound, so we also ask the usual port-inspection tools. The checks
//! run in a fixed order and stop at the first one that exits cleanly with
//! output matching the port.

use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::DEFAULT_FALLBACK_TIMEOUT;
use crate::target::ProbeTarget;
use crate::types::{ProbeMethod, ProbeResult};

/// Kernel TCP socket state for LISTEN in `/proc/net/tcp`.
const PROC_TCP_LISTEN: &str = "0A";

/// Abstracts process execution so the checks can run against canned output.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run `program` with `args` and capture its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds the
    /// runner's timeout. On timeout the child must be killed.
    async fn run(&self, program: &str, args: &[String]) -> Result<Output>;
}

/// Production runner backed by `tokio::process`.
#[derive(Debug, Clone)]
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TokioCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_TIMEOUT)
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<Output> {
        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();
        // Dropping the future on timeout drops the child, which kills it.
        match tokio::time::timeout(self.timeout, output).await {
            Ok(res) => res.with_context(|| format!("failed to run {program}")),
            Err(_) => anyhow::bail!(
                "{program} timed out after {}ms",
                self.timeout.as_millis()
            ),
        }
    }
}

/// One OS command check: how to invoke it and how to read its output.
struct FallbackCheck {
    name: &'static str,
    program: &'static str,
    args: fn(u16) -> Vec<String>,
    matches: fn(&str, u16) -> bool,
}

const FALLBACK_CHECKS: [FallbackCheck; 5] = [
    FallbackCheck {
        name: "ss",
        program: "ss",
        args: |_| vec!["-tln".into()],
        matches: text_listing_matches,
    },
    FallbackCheck {
        name: "netstat",
        program: "netstat",
        args: |_| vec!["-tln".into()],
        matches: text_listing_matches,
    },
    FallbackCheck {
        name: "lsof",
        program: "lsof",
        args: |port| {
            vec![
                "-nP".into(),
                format!("-iTCP:{port}"),
                "-sTCP:LISTEN".into(),
            ]
        },
        matches: text_listing_matches,
    },
    FallbackCheck {
        name: "proc-net-tcp",
        program: "cat",
        args: |_| vec!["/proc/net/tcp".into()],
        matches: proc_net_tcp_matches,
    },
    // Dual-stack `[::]` listeners only show up in the IPv6 table.
    FallbackCheck {
        name: "proc-net-tcp6",
        program: "cat",
        args: |_| vec!["/proc/net/tcp6".into()],
        matches: proc_net_tcp_matches,
    },
];

/// Run the fallback checks with the default process runner.
pub async fn probe_fallback(target: &ProbeTarget) -> ProbeResult {
    probe_fallback_with(target, &TokioCommandRunner::default()).await
}

/// Run the fallback checks in order, stopping at the first match.
///
/// Spawn failures, non-zero exits, timeouts and unparseable output all count
/// as "no match" for that check; nothing here is surfaced as an error.
pub async fn probe_fallback_with<R: CommandRunner>(
    target: &ProbeTarget,
    runner: &R,
) -> ProbeResult {
    let port = target.port();
    for check in &FALLBACK_CHECKS {
        let args = (check.args)(port);
        let output = match runner.run(check.program, &args).await {
            Ok(output) => output,
            Err(e) => {
                debug!(check = check.name, error = %e, "fallback check unavailable");
                continue;
            }
        };
        if !output.status.success() {
            debug!(check = check.name, status = %output.status, "fallback check failed");
            continue;
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            debug!(check = check.name, "fallback check produced no output");
            continue;
        }
        if (check.matches)(&stdout, port) {
            debug!(check = check.name, endpoint = %target, "fallback check found listener");
            return ProbeResult::reachable(ProbeMethod::Fallback(check.name));
        }
        debug!(check = check.name, port, "fallback check found no listener");
    }
    ProbeResult::unreachable()
}

/// Match a `:PORT` token in `ss`/`netstat`/`lsof` text output.
///
/// The token must not be followed by another digit, so `:80` does not match `:8080`.
pub fn text_listing_matches(output: &str, port: u16) -> bool {
    let needle = format!(":{port}");
    output.lines().any(|line| {
        line.match_indices(&needle).any(|(idx, _)| {
            !line[idx + needle.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
        })
    })
}

/// Lowercase hex form of a port as used by the kernel TCP table.
pub fn port_to_hex(port: u16) -> String {
    format!("{port:04x}")
}

/// Match a LISTEN row for `port` in `/proc/net/tcp` or `/proc/net/tcp6` content.
///
/// Rows look like `0: 0100007F:1F90 00000000:0000 0A ...` (tcp6 rows carry a
/// 32-digit address before the same `:PORT` suffix); the kernel prints
/// hex in uppercase, so the comparison ignores case. Rows that do not parse
/// are skipped.
pub fn proc_net_tcp_matches(output: &str, port: u16) -> bool {
    let hex = port_to_hex(port);
    output.lines().skip(1).any(|line| {
        let mut fields = line.split_whitespace();
        let (Some(_slot), Some(local), Some(_remote), Some(state)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return false;
        };
        let Some((_, local_port)) = local.rsplit_once(':') else {
            return false;
        };
        local_port.eq_ignore_ascii_case(&hex) && state.eq_ignore_ascii_case(PROC_TCP_LISTEN)
    })
}
