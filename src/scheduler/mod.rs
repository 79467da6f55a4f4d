//! Periodic in-process sweep.
//!
//! Sweeps are normally triggered from outside (`GET /api/cron`). When an
//! interval is configured, [`Sweeper`] triggers them on a timer instead.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

use crate::monitor::{MonitorService, SweepEntry};
use crate::probe::Prober;

/// Runs [`MonitorService::sweep`] on a fixed interval until stopped.
pub struct Sweeper<P: Prober> {
    monitor: Arc<MonitorService<P>>,
    interval: Duration,
    stop: Arc<Mutex<Option<broadcast::Sender<()>>>>,
}

impl<P: Prober> Sweeper<P> {
    pub fn new(monitor: Arc<MonitorService<P>>, interval: Duration) -> Self {
        Self {
            monitor,
            interval,
            stop: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the background sweep task.
    pub async fn start(&self) {
        let (tx, mut rx) = broadcast::channel(1);
        {
            let mut stop_guard = self.stop.lock().await;
            if stop_guard.is_some() {
                return; // Already running
            }
            *stop_guard = Some(tx);
        }

        let monitor = self.monitor.clone();
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!("Sweeper: sweeping all hosts every {:?}", self.interval);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = interval.tick() => {
                        run_sweep(&monitor).await;
                    }
                }
            }
            tracing::info!("Sweeper: stopped");
        });
    }

    /// Stop the background sweep task.
    pub async fn stop(&self) {
        let mut stop = self.stop.lock().await;
        if let Some(tx) = stop.take() {
            let _ = tx.send(());
        }
    }
}

async fn run_sweep<P: Prober>(monitor: &Arc<MonitorService<P>>) {
    match monitor.sweep().await {
        Ok(entries) => {
            for entry in entries {
                if let SweepEntry::Failed { host, message } = entry {
                    tracing::warn!("Sweeper: {} failed: {}", host, message);
                }
            }
        }
        Err(e) => tracing::error!("Sweeper: sweep failed: {}", e),
    }
}
