//! Database model types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reachability of a host at probe time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Up,
    Down,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Up => "up",
            ProbeStatus::Down => "down",
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(ProbeStatus::Up),
            "down" => Ok(ProbeStatus::Down),
            other => Err(format!("unknown probe status: {}", other)),
        }
    }
}

/// One persisted probe result.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRecord {
    pub host: String,
    /// Seconds since the Unix epoch, fractional.
    pub timestamp: f64,
    /// Round-trip latency in milliseconds, 0 when the host was down.
    pub latency_ms: f64,
    pub status: ProbeStatus,
}

impl ProbeRecord {
    pub fn up(host: &str, timestamp: f64, latency_ms: f64) -> Self {
        Self {
            host: host.to_string(),
            timestamp,
            latency_ms,
            status: ProbeStatus::Up,
        }
    }

    pub fn down(host: &str, timestamp: f64) -> Self {
        Self {
            host: host.to_string(),
            timestamp,
            latency_ms: 0.0,
            status: ProbeStatus::Down,
        }
    }
}

/// A history row as returned by window reads.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPoint {
    pub timestamp: f64,
    pub latency_ms: f64,
    pub status: ProbeStatus,
}

/// A registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredHost {
    pub host: String,
}
