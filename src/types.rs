use std::fmt;
use std::fs::File;
use std::path::Path;

use ::time::{format_description::well_known, OffsetDateTime};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::poller::{Readiness, TimeoutFailure};
use crate::target::ProbeTarget;

/// Detection method that produced a probe outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMethod {
    /// Direct TCP connect.
    Socket,
    /// OS port-inspection command, named by its check (e.g. `ss`).
    Fallback(&'static str),
    /// Nothing detected a listener.
    None,
}

impl fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeMethod::Socket => f.write_str("socket"),
            ProbeMethod::Fallback(name) => write!(f, "fallback-{name}"),
            ProbeMethod::None => f.write_str("none"),
        }
    }
}

/// Outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub reachable: bool,
    pub method: ProbeMethod,
}

impl ProbeResult {
    pub fn reachable(method: ProbeMethod) -> Self {
        Self {
            reachable: true,
            method,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            method: ProbeMethod::None,
        }
    }
}

/// Summary of one poll run, written as JSON by the CLI.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub target: String,
    pub reachable: bool,
    pub method: String,
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub max_wait_ms: u64,
    pub timestamp: String,
}

impl PollReport {
    pub fn ready(target: &ProbeTarget, readiness: &Readiness, max_wait_ms: u64) -> Self {
        Self {
            target: target.to_string(),
            reachable: true,
            method: readiness.method.to_string(),
            attempts: readiness.attempts,
            elapsed_ms: readiness.elapsed.as_millis() as u64,
            max_wait_ms,
            timestamp: now_iso_like(),
        }
    }

    pub fn timed_out(failure: &TimeoutFailure, elapsed_ms: u64) -> Self {
        Self {
            target: failure.target.clone(),
            reachable: false,
            method: ProbeMethod::None.to_string(),
            attempts: failure.attempts,
            elapsed_ms,
            max_wait_ms: failure.max_wait_ms,
            timestamp: now_iso_like(),
        }
    }

    /// Write the report as pretty JSON, replacing any existing file.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("failed to create report file: {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

fn now_iso_like() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
