use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced while building a [`ProbeTarget`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("host must not be empty")]
    EmptyHost,
    #[error("invalid port value: {0}")]
    InvalidPort(String),
    #[error("port out of range: {0}")]
    PortOutOfRange(u32),
    #[error("missing port in target: {0} (expected host:port)")]
    MissingPort(String),
}

/// The TCP endpoint being polled. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeTarget {
    host: String,
    port: u16,
}

impl ProbeTarget {
    /// Build a target, rejecting an empty host and port 0.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, TargetError> {
        let host = host.into();
        let host = host.trim();
        if host.is_empty() {
            return Err(TargetError::EmptyHost);
        }
        if port == 0 {
            return Err(TargetError::PortOutOfRange(0));
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address string accepted by `TcpStream::connect`; IPv6 literals are bracketed.
    pub fn connect_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.connect_addr())
    }
}

/// Parses `host:port`, `[v6]:port` or a bare IPv6 literal followed by `:port`.
impl FromStr for ProbeTarget {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| TargetError::MissingPort(s.to_string()))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        let port = parse_port_str(port.trim())?;
        Self::new(host, port)
    }
}

/// Parse a decimal port in 1..=65535.
pub fn parse_port_str(s: &str) -> Result<u16, TargetError> {
    let val: u32 = s
        .parse::<u32>()
        .map_err(|_| TargetError::InvalidPort(s.to_string()))?;
    if val == 0 || val > 65535 {
        return Err(TargetError::PortOutOfRange(val));
    }
    Ok(val as u16)
}
