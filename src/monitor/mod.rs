//! Host checks: probe, record, and derive statistics.
//!
//! [`MonitorService`] is the single entry point used both for on-demand
//! checks and for sweeps over every registered host.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};

use crate::db::{ProbeRecord, ProbeStatus, Store};
use crate::probe::{ProbeError, ProbeMethod, ProbeOutcome, ProbeSettings, Prober};
use crate::registry::{HostRegistry, RegistryError};
use crate::stats::{round2, StatsEngine};

/// Monitor error types.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Outcome of checking one host.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorResult {
    pub host: String,
    pub status: ProbeStatus,
    pub latency_ms: f64,
    pub jitter: f64,
    pub method: Option<ProbeMethod>,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

/// One host's entry in a sweep.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepEntry {
    Checked(MonitorResult),
    /// The check itself failed; the sweep carried on without it.
    Failed { host: String, message: String },
}

impl SweepEntry {
    #[cfg(test)]
    pub(crate) fn host(&self) -> &str {
        match self {
            SweepEntry::Checked(r) => &r.host,
            SweepEntry::Failed { host, .. } => host,
        }
    }
}

/// Tuning for [`MonitorService`].
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Hard cap on a single probe; a probe still running after this counts as down.
    pub check_timeout: Duration,
    /// Maximum number of hosts probed at once during a sweep.
    pub sweep_concurrency: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_timeout: ProbeSettings::default().worst_case() + Duration::from_secs(1),
            sweep_concurrency: 8,
        }
    }
}

/// Composes prober, history, statistics and registry.
pub struct MonitorService<P: Prober> {
    prober: P,
    store: Arc<Store>,
    stats: StatsEngine,
    registry: HostRegistry,
    settings: MonitorSettings,
    host_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<P: Prober> MonitorService<P> {
    pub fn new(prober: P, store: Arc<Store>, settings: MonitorSettings) -> Self {
        Self {
            prober,
            stats: StatsEngine::new(store.clone()),
            registry: HostRegistry::new(store.clone()),
            store,
            settings,
            host_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &HostRegistry {
        &self.registry
    }

    /// Probe a host, append the result to its history and report it with current jitter.
    ///
    /// Storage failures are logged and do not fail the check. Only faults
    /// inside the prober are returned as errors.
    pub async fn check_host(&self, host: &str) -> Result<MonitorResult, MonitorError> {
        let lock = self.host_lock(host).await;
        let result = {
            let _guard = lock.lock().await;
            self.check_host_locked(host).await
        };
        self.release_host_lock(host, lock).await;
        result
    }

    async fn check_host_locked(&self, host: &str) -> Result<MonitorResult, MonitorError> {
        let outcome =
            match tokio::time::timeout(self.settings.check_timeout, self.prober.probe(host)).await {
                Ok(outcome) => outcome?,
                Err(_) => {
                    tracing::warn!(
                        "Probe for {} exceeded {:?}, recording as down",
                        host,
                        self.settings.check_timeout
                    );
                    ProbeOutcome::down()
                }
            };

        let timestamp = now_epoch_secs();
        let record = match outcome.status {
            ProbeStatus::Up => ProbeRecord::up(host, timestamp, round2(outcome.latency_ms)),
            ProbeStatus::Down => ProbeRecord::down(host, timestamp),
        };

        if let Err(e) = self.store.insert_record(&record) {
            tracing::error!("Failed to record probe result for {}: {}", host, e);
        }

        let jitter = self.stats.jitter(host).unwrap_or_else(|e| {
            tracing::warn!("Failed to compute jitter for {}: {}", host, e);
            0.0
        });

        Ok(MonitorResult {
            host: record.host,
            status: record.status,
            latency_ms: record.latency_ms,
            jitter,
            method: outcome.method,
            timestamp,
        })
    }

    /// Per-host lock so two checks of the same host never interleave.
    async fn host_lock(&self, host: &str) -> Arc<Mutex<()>> {
        let mut locks = self.host_locks.lock().await;
        locks.entry(host.to_string()).or_default().clone()
    }

    async fn release_host_lock(&self, host: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.host_locks.lock().await;
        // Only the map and this caller hold it: nobody is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(host);
        }
    }
}

impl<P: Prober> MonitorService<P> {
    /// Check every registered host and collect the results in registry order.
    ///
    /// A host whose check fails is reported as [`SweepEntry::Failed`] and the
    /// sweep continues.
    pub async fn sweep(self: &Arc<Self>) -> Result<Vec<SweepEntry>, MonitorError> {
        let hosts = self.registry.list()?;
        let semaphore = Arc::new(Semaphore::new(self.settings.sweep_concurrency.max(1)));

        let handles: Vec<_> = hosts
            .into_iter()
            .map(|entry| {
                let service = Arc::clone(self);
                let semaphore = semaphore.clone();
                let host = entry.host;
                let handle = tokio::spawn({
                    let host = host.clone();
                    async move {
                        let _permit = semaphore.acquire_owned().await.ok();
                        service.check_host(&host).await
                    }
                });
                (host, handle)
            })
            .collect();

        let mut entries = Vec::with_capacity(handles.len());
        for (host, handle) in handles {
            let entry = match handle.await {
                Ok(Ok(result)) => SweepEntry::Checked(result),
                Ok(Err(e)) => {
                    tracing::error!("Sweep: check failed for {}: {}", host, e);
                    SweepEntry::Failed {
                        host,
                        message: e.to_string(),
                    }
                }
                Err(e) => {
                    tracing::error!("Sweep: check task for {} aborted: {}", host, e);
                    SweepEntry::Failed {
                        host,
                        message: e.to_string(),
                    }
                }
            };
            entries.push(entry);
        }

        let up = entries
            .iter()
            .filter(|e| matches!(e, SweepEntry::Checked(r) if r.status == ProbeStatus::Up))
            .count();
        tracing::info!("Sweep finished: {}/{} hosts up", up, entries.len());

        Ok(entries)
    }
}

fn now_epoch_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
