use std::time::Duration;

use thiserror::Error;
use tokio::time::{self, Instant};
use tracing::{debug, info};

use crate::config::PollOptions;
use crate::fallback::{self, CommandRunner, TokioCommandRunner};
use crate::probe;
use crate::target::ProbeTarget;
use crate::types::{ProbeMethod, ProbeResult};

/// The deadline passed without any probe reporting the target as reachable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{target} not reachable after {attempts} attempt(s) within {max_wait_ms}ms")]
pub struct TimeoutFailure {
    pub target: String,
    pub attempts: u32,
    pub max_wait_ms: u64,
}

/// Successful poll outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub method: ProbeMethod,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Bookkeeping for one call to [`wait_until_ready`].
#[derive(Debug)]
pub struct PollSession {
    started: Instant,
    deadline: Instant,
    attempts: u32,
    interval: Duration,
}

impl PollSession {
    pub fn start(max_wait: Duration, interval: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + max_wait,
            attempts: 0,
            interval,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn next_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Delay before the next attempt, never past the deadline.
    fn next_delay(&self) -> Duration {
        self.interval.min(self.remaining())
    }
}

/// Poll `target` until it accepts connections or `options.max_wait` elapses.
pub async fn wait_until_ready(
    target: &ProbeTarget,
    options: &PollOptions,
) -> Result<Readiness, TimeoutFailure> {
    wait_until_ready_with(target, options, &TokioCommandRunner::default()).await
}

/// Same as [`wait_until_ready`], running fallback checks through `runner`.
///
/// Each attempt tries the socket probe first and only falls back to OS
/// commands when it fails. Attempts are strictly sequential with a fixed
/// interval between them, and an attempt still running at the deadline is
/// dropped and counted as unreachable.
pub async fn wait_until_ready_with<R: CommandRunner>(
    target: &ProbeTarget,
    options: &PollOptions,
    runner: &R,
) -> Result<Readiness, TimeoutFailure> {
    let mut session = PollSession::start(options.max_wait, options.interval);
    info!(
        endpoint = %target,
        max_wait_ms = options.max_wait.as_millis() as u64,
        interval_ms = options.interval.as_millis() as u64,
        "waiting for endpoint"
    );

    while !session.is_expired() {
        let attempt = session.next_attempt();
        info!(
            attempt,
            endpoint = %target,
            elapsed_ms = session.elapsed().as_millis() as u64,
            remaining_ms = session.remaining().as_millis() as u64,
            "probing"
        );

        // The whole attempt, fallback commands included, ends at the deadline.
        let result = match time::timeout(
            session.remaining(),
            probe_attempt(target, options, runner, attempt),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                debug!(attempt, endpoint = %target, "attempt cut off at deadline");
                ProbeResult::unreachable()
            }
        };

        if result.reachable {
            let elapsed = session.elapsed();
            info!(
                attempt,
                endpoint = %target,
                method = %result.method,
                elapsed_ms = elapsed.as_millis() as u64,
                "endpoint is reachable"
            );
            return Ok(Readiness {
                method: result.method,
                attempts: attempt,
                elapsed,
            });
        }

        let delay = session.next_delay();
        info!(
            attempt,
            endpoint = %target,
            retry_in_ms = delay.as_millis() as u64,
            remaining_ms = session.remaining().as_millis() as u64,
            "endpoint not reachable yet"
        );
        if !delay.is_zero() {
            time::sleep(delay).await;
        }
    }

    Err(TimeoutFailure {
        target: target.to_string(),
        attempts: session.attempts(),
        max_wait_ms: options.max_wait.as_millis() as u64,
    })
}

/// Socket probe first, OS commands only when it fails.
async fn probe_attempt<R: CommandRunner>(
    target: &ProbeTarget,
    options: &PollOptions,
    runner: &R,
    attempt: u32,
) -> ProbeResult {
    let result = probe::probe_once_with_timeout(target, options.probe_timeout).await;
    debug!(attempt, method = %result.method, reachable = result.reachable, "socket probe done");
    if result.reachable || !options.fallback {
        return result;
    }
    let result = fallback::probe_fallback_with(target, runner).await;
    debug!(attempt, method = %result.method, reachable = result.reachable, "fallback probe done");
    result
}
