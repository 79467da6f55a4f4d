//! HostPulse - reachability and latency monitor.
//!
//! Probes hosts over ICMP with a TCP fallback, keeps an append-only history
//! per host, and reports latency and jitter over a small JSON API.

mod config;
mod db;
mod monitor;
mod probe;
mod registry;
mod scheduler;
mod stats;
mod web;

use config::ServerConfig;
use db::Store;
use monitor::MonitorService;
use probe::NetworkProber;
use scheduler::Sweeper;
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hostpulse=info".parse()?),
        )
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting HostPulse on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let prober = NetworkProber::new(cfg.probe.clone());
    tracing::info!(
        "Probing with ICMP {}, TCP ports {:?}, worst case {:?} per host",
        if prober.settings().icmp_enabled { "enabled" } else { "disabled" },
        prober.settings().tcp_ports,
        prober.settings().worst_case()
    );

    let monitor = Arc::new(MonitorService::new(
        prober,
        store.clone(),
        cfg.monitor_settings(),
    ));

    // Seed default hosts into an empty registry
    monitor.registry().seed(&cfg.default_hosts)?;

    // Optional in-process sweep
    let sweeper = cfg
        .sweep_interval
        .map(|interval| Sweeper::new(monitor.clone(), interval));
    if let Some(sweeper) = &sweeper {
        sweeper.start().await;
    }

    // Start web server
    let server = Server::new(cfg, store, monitor);
    let result = server.start().await;

    if let Some(sweeper) = &sweeper {
        sweeper.stop().await;
    }

    result
}
