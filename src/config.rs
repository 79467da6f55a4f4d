//! Configuration module for HostPulse.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

use crate::monitor::MonitorSettings;
use crate::probe::ProbeSettings;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8000)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "monitor.db")
    pub db_path: String,
    /// Hosts put into an empty registry at startup
    pub default_hosts: Vec<String>,
    pub probe: ProbeSettings,
    /// Interval of the in-process sweep; `None` leaves sweeping to an external trigger
    pub sweep_interval: Option<Duration>,
    pub sweep_concurrency: usize,
    /// Directory of the static frontend (default: "public")
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8000,
            db_path: "monitor.db".to_string(),
            default_hosts: vec![
                "8.8.8.8".to_string(),
                "1.1.1.1".to_string(),
                "google.com".to_string(),
            ],
            probe: ProbeSettings::default(),
            sweep_interval: None,
            sweep_concurrency: 8,
            static_dir: "public".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `HOSTPULSE_HTTP_PORT`: HTTP port (default: 8000)
    /// - `HOSTPULSE_DB_PATH`: Database file path (default: "monitor.db", or
    ///   "/tmp/monitor.db" when `VERCEL` is set)
    /// - `HOSTPULSE_DEFAULT_HOSTS`: comma-separated seed hosts
    /// - `HOSTPULSE_ICMP_ENABLED`: "false" or "0" disables ICMP
    /// - `HOSTPULSE_ICMP_TIMEOUT_MS`, `HOSTPULSE_TCP_TIMEOUT_MS`: per-attempt timeouts
    /// - `HOSTPULSE_TCP_PORTS`: comma-separated candidate ports
    /// - `HOSTPULSE_SWEEP_INTERVAL_SECS`: in-process sweep period, 0 disables
    /// - `HOSTPULSE_SWEEP_CONCURRENCY`: hosts probed at once per sweep
    /// - `HOSTPULSE_STATIC_DIR`: static frontend directory
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if get("VERCEL").is_some() {
            cfg.db_path = "/tmp/monitor.db".to_string();
        }

        if let Some(port) = get("HOSTPULSE_HTTP_PORT").and_then(|s| s.parse().ok()) {
            cfg.http_port = port;
        }

        if let Some(db_path) = get("HOSTPULSE_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(hosts) = get("HOSTPULSE_DEFAULT_HOSTS") {
            cfg.default_hosts = split_list(&hosts).map(str::to_string).collect();
        }

        if let Some(enabled) = get("HOSTPULSE_ICMP_ENABLED") {
            cfg.probe.icmp_enabled = !matches!(enabled.trim(), "0" | "false" | "no" | "off");
        }

        if let Some(ms) = get("HOSTPULSE_ICMP_TIMEOUT_MS").and_then(|s| s.parse::<u64>().ok()) {
            if ms > 0 {
                cfg.probe.icmp_timeout = Duration::from_millis(ms);
            }
        }

        if let Some(ms) = get("HOSTPULSE_TCP_TIMEOUT_MS").and_then(|s| s.parse::<u64>().ok()) {
            if ms > 0 {
                cfg.probe.tcp_timeout = Duration::from_millis(ms);
            }
        }

        if let Some(ports) = get("HOSTPULSE_TCP_PORTS") {
            let parsed: Option<Vec<u16>> = split_list(&ports).map(|p| p.parse().ok()).collect();
            match parsed {
                Some(ports) if !ports.is_empty() => cfg.probe.tcp_ports = ports,
                _ => tracing::warn!("Ignoring invalid HOSTPULSE_TCP_PORTS: {}", ports),
            }
        }

        if let Some(secs) = get("HOSTPULSE_SWEEP_INTERVAL_SECS").and_then(|s| s.parse::<u64>().ok()) {
            cfg.sweep_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(n) = get("HOSTPULSE_SWEEP_CONCURRENCY").and_then(|s| s.parse::<usize>().ok()) {
            if n > 0 {
                cfg.sweep_concurrency = n;
            }
        }

        if let Some(dir) = get("HOSTPULSE_STATIC_DIR") {
            cfg.static_dir = dir;
        }

        cfg
    }

    /// Monitor tuning derived from the probe settings.
    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            check_timeout: self.probe.worst_case() + Duration::from_secs(1),
            sweep_concurrency: self.sweep_concurrency,
        }
    }
}

fn split_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|s| !s.is_empty())
}
