//! The set of monitored hosts.

use std::sync::Arc;
use thiserror::Error;

use crate::db::{DbError, MonitoredHost, Store};

/// Registry error types.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("host must not be empty")]
    EmptyHost,
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Mutable set of host identifiers, backed by the `hosts` table.
#[derive(Clone)]
pub struct HostRegistry {
    store: Arc<Store>,
}

impl HostRegistry {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Result<Vec<MonitoredHost>, RegistryError> {
        Ok(self.store.list_hosts()?)
    }

    /// Add a host. Adding one that is already present is a no-op.
    pub fn add(&self, host: &str) -> Result<(), RegistryError> {
        let host = normalize(host)?;
        if self.store.add_host(host)? {
            tracing::info!("Registry: added host {}", host);
        }
        Ok(())
    }

    /// Remove a host. Removing one that is absent is a no-op.
    pub fn remove(&self, host: &str) -> Result<(), RegistryError> {
        let host = host.trim();
        if self.store.remove_host(host)? {
            tracing::info!("Registry: removed host {}", host);
        }
        Ok(())
    }

    /// Populate an empty registry with `defaults`. Run once at startup.
    pub fn seed(&self, defaults: &[String]) -> Result<usize, RegistryError> {
        let defaults: Vec<String> = defaults
            .iter()
            .filter_map(|h| normalize(h).ok())
            .map(str::to_string)
            .collect();

        let inserted = self.store.seed_hosts_if_empty(&defaults)?;
        if inserted > 0 {
            tracing::info!("Registry: seeded {} default hosts", inserted);
        }
        Ok(inserted)
    }
}

fn normalize(host: &str) -> Result<&str, RegistryError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(RegistryError::EmptyHost);
    }
    Ok(host)
}
