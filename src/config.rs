use std::time::Duration;

/// Default overall readiness budget.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(120);
/// Default delay between attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
/// Per-attempt socket connect timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(3_000);
/// Upper bound for a single fallback command.
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Knobs for [`crate::poller::wait_until_ready`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    /// Overall deadline measured from the start of polling.
    pub max_wait: Duration,
    /// Fixed delay between unsuccessful attempts.
    pub interval: Duration,
    /// Timeout for each socket connect.
    pub probe_timeout: Duration,
    /// Run the OS command checks when the socket probe fails.
    pub fallback: bool,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            max_wait: DEFAULT_MAX_WAIT,
            interval: DEFAULT_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            fallback: true,
        }
    }
}

impl PollOptions {
    pub fn from_millis(max_wait_ms: u64, interval_ms: u64) -> Self {
        Self {
            max_wait: Duration::from_millis(max_wait_ms),
            interval: Duration::from_millis(interval_ms),
            ..Self::default()
        }
    }
}
