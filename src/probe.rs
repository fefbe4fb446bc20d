use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::config::DEFAULT_PROBE_TIMEOUT;
use crate::target::ProbeTarget;
use crate::types::{ProbeMethod, ProbeResult};

/// Probe the target with a direct TCP connect bounded by the default timeout.
pub async fn probe_once(target: &ProbeTarget) -> ProbeResult {
    probe_once_with_timeout(target, DEFAULT_PROBE_TIMEOUT).await
}

/// Probe the target with a direct TCP connect bounded by `timeout`.
///
/// - Connect, error and timeout race inside `tokio::time::timeout`; only the first one counts.
/// - The timeout covers name resolution as well as the connect itself.
/// - No data is exchanged. The stream, or the pending connect on timeout, is dropped before returning.
pub async fn probe_once_with_timeout(target: &ProbeTarget, timeout: Duration) -> ProbeResult {
    let addr = target.connect_addr();
    let start = Instant::now();
    match time::timeout(timeout, TcpStream::connect(addr.as_str())).await {
        Ok(Ok(stream)) => {
            drop(stream);
            debug!(
                endpoint = %target,
                latency_ms = start.elapsed().as_millis() as u64,
                "socket connect succeeded"
            );
            ProbeResult::reachable(ProbeMethod::Socket)
        }
        Ok(Err(e)) => {
            debug!(endpoint = %target, error = %e, "socket connect failed");
            ProbeResult::unreachable()
        }
        Err(_) => {
            debug!(
                endpoint = %target,
                timeout_ms = timeout.as_millis() as u64,
                "socket connect timed out"
            );
            ProbeResult::unreachable()
        }
    }
}
