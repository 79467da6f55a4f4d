//! Probe module for reachability checks.
//!
//! A probe tries ICMP echo first and falls back to a TCP handshake, either on
//! the explicit port of an `address:port` host or across a candidate port list.

mod icmp;
mod target;
mod tcp;

pub use icmp::*;
pub use target::*;
pub use tcp::*;

use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::db::ProbeStatus;

/// Probe error types.
///
/// Unreachability is not an error; it is reported as a down outcome. These
/// variants are reserved for faults inside the prober itself.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe task failed: {0}")]
    Task(String),
}

/// How a host was found reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProbeMethod {
    #[serde(rename = "ICMP")]
    Icmp,
    #[serde(rename = "TCP")]
    Tcp,
}

/// Raw result of one probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub status: ProbeStatus,
    /// Round-trip time in milliseconds, 0 when down.
    pub latency_ms: f64,
    /// `None` for down outcomes.
    pub method: Option<ProbeMethod>,
}

impl ProbeOutcome {
    pub fn up(latency_ms: f64, method: ProbeMethod) -> Self {
        Self {
            status: ProbeStatus::Up,
            latency_ms,
            method: Some(method),
        }
    }

    pub fn down() -> Self {
        Self {
            status: ProbeStatus::Down,
            latency_ms: 0.0,
            method: None,
        }
    }
}

/// Probe tuning knobs.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub icmp_enabled: bool,
    pub icmp_timeout: Duration,
    pub tcp_timeout: Duration,
    /// Ports tried in order when the host has no explicit port.
    pub tcp_ports: Vec<u16>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            icmp_enabled: true,
            icmp_timeout: Duration::from_secs(2),
            tcp_timeout: Duration::from_secs(2),
            tcp_ports: vec![80, 443, 53, 8080],
        }
    }
}

impl ProbeSettings {
    /// The TCP ports to try for a target: its explicit port alone, else the candidate list.
    pub fn ports_for(&self, target: &HostTarget) -> Vec<u16> {
        match target.port {
            Some(port) => vec![port],
            None => self.tcp_ports.clone(),
        }
    }

    /// Upper bound on how long one probe can take.
    pub fn worst_case(&self) -> Duration {
        let icmp = if self.icmp_enabled {
            self.icmp_timeout
        } else {
            Duration::ZERO
        };
        let ports = self.tcp_ports.len().max(1) as u32;
        icmp + self.tcp_timeout * ports
    }
}

/// Something that can check one host.
pub trait Prober: Send + Sync + 'static {
    fn probe(&self, host: &str) -> impl Future<Output = Result<ProbeOutcome, ProbeError>> + Send;
}

/// Prober that talks to the network: ICMP first, then TCP.
#[derive(Debug, Clone, Default)]
pub struct NetworkProber {
    settings: ProbeSettings,
}

impl NetworkProber {
    pub fn new(settings: ProbeSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }
}

impl Prober for NetworkProber {
    async fn probe(&self, host: &str) -> Result<ProbeOutcome, ProbeError> {
        let target = HostTarget::parse(host);

        if self.settings.icmp_enabled {
            if let Some(latency) = icmp_probe(&target.address, self.settings.icmp_timeout).await? {
                return Ok(ProbeOutcome::up(latency, ProbeMethod::Icmp));
            }
        }

        let ports = self.settings.ports_for(&target);
        match tcp_probe_ports(&target.address, &ports, self.settings.tcp_timeout).await {
            Some((port, latency)) => {
                tracing::debug!("{} reachable over TCP port {}", host, port);
                Ok(ProbeOutcome::up(latency, ProbeMethod::Tcp))
            }
            None => Ok(ProbeOutcome::down()),
        }
    }
}
