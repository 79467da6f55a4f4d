//! SQLite database store implementation.

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;

mod embedded {
    refinery::embed_migrations!("migrations");
}

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("database connection lock poisoned")]
    Poisoned,
}

/// Thread-safe database store.
///
/// Holds both the append-only probe history and the monitored host registry.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Create a store backed by a private in-memory database.
    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, DbError> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let mut conn = self.conn()?;

        // Readers should not block behind the single writer.
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |r| r.get(0))?;

        // Databases created before hosts were tracked have a host-less pings table,
        // which the host index migration needs upgraded first.
        ensure_host_column(&conn)?;

        let report = embedded::migrations::runner()
            .run(&mut *conn)
            .map_err(|e| DbError::Migration(e.to_string()))?;
        for migration in report.applied_migrations() {
            tracing::info!("Applied migration {}", migration);
        }

        Ok(())
    }

    // --- Probe history ---

    /// Append a probe record and return its sequence number.
    pub fn insert_record(&self, record: &ProbeRecord) -> Result<i64, DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO pings (host, timestamp, latency, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.host,
                record.timestamp,
                record.latency_ms,
                record.status.as_str(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Latencies of the most recent `up` records for a host, newest first.
    pub fn recent_up_latencies(&self, host: &str, limit: usize) -> Result<Vec<f64>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT latency FROM pings WHERE host = ?1 AND status = 'up' ORDER BY id DESC LIMIT ?2",
        )?;

        let latencies = stmt
            .query_map(params![host, limit as i64], |row| row.get(0))?
            .collect::<SqlResult<Vec<f64>>>()?;

        Ok(latencies)
    }

    /// The most recent records, for one host or across all hosts, oldest first.
    pub fn recent_history(
        &self,
        host: Option<&str>,
        limit: usize,
    ) -> Result<Vec<HistoryPoint>, DbError> {
        let conn = self.conn()?;

        let mut points = match host {
            Some(host) => {
                let mut stmt = conn.prepare_cached(
                    "SELECT timestamp, latency, status FROM pings WHERE host = ?1 ORDER BY id DESC LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![host, limit as i64], history_point_from_row)?
                    .collect::<SqlResult<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare_cached(
                    "SELECT timestamp, latency, status FROM pings ORDER BY id DESC LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(params![limit as i64], history_point_from_row)?
                    .collect::<SqlResult<Vec<_>>>()?;
                rows
            }
        };

        points.reverse();
        Ok(points)
    }

    /// Number of records stored for a host.
    #[cfg(test)]
    pub(crate) fn count_records(&self, host: &str) -> Result<i64, DbError> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM pings WHERE host = ?1",
            params![host],
            |r| r.get(0),
        )?)
    }

    // --- Host registry ---

    /// All monitored hosts in insertion order.
    pub fn list_hosts(&self) -> Result<Vec<MonitoredHost>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached("SELECT host FROM hosts ORDER BY rowid ASC")?;

        let hosts = stmt
            .query_map([], |row| Ok(MonitoredHost { host: row.get(0)? }))?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(hosts)
    }

    /// Insert a host, ignoring duplicates. Returns whether a row was added.
    pub fn add_host(&self, host: &str) -> Result<bool, DbError> {
        let conn = self.conn()?;
        let changed = conn.execute("INSERT OR IGNORE INTO hosts (host) VALUES (?1)", params![host])?;
        Ok(changed > 0)
    }

    /// Delete a host. Returns whether a row was removed.
    pub fn remove_host(&self, host: &str) -> Result<bool, DbError> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM hosts WHERE host = ?1", params![host])?;
        Ok(changed > 0)
    }

    /// Insert the given hosts only if the registry is currently empty.
    ///
    /// Returns the number of hosts inserted.
    pub fn seed_hosts_if_empty(&self, hosts: &[String]) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let existing: Option<i64> = tx
            .query_row("SELECT 1 FROM hosts LIMIT 1", [], |r| r.get(0))
            .optional()?;
        if existing.is_some() {
            return Ok(0);
        }

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO hosts (host) VALUES (?1)")?;
            for host in hosts {
                inserted += stmt.execute(params![host])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }
}

fn history_point_from_row(row: &rusqlite::Row<'_>) -> SqlResult<HistoryPoint> {
    let status: String = row.get(2)?;
    let status = status.parse::<ProbeStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
    })?;

    Ok(HistoryPoint {
        timestamp: row.get(0)?,
        latency_ms: row.get(1)?,
        status,
    })
}

/// Add the `host` column to a legacy `pings` table if it is missing.
fn ensure_host_column(conn: &Connection) -> Result<(), DbError> {
    let mut stmt = conn.prepare("PRAGMA table_info(pings)")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<SqlResult<Vec<_>>>()?;

    // No table yet: the init migration creates it with the column.
    if columns.is_empty() {
        return Ok(());
    }

    if !columns.iter().any(|c| c == "host") {
        tracing::info!("Migrating database: adding host column to pings");
        conn.execute_batch("ALTER TABLE pings ADD COLUMN host TEXT DEFAULT 'unknown'")
            .map_err(|e| DbError::Migration(format!("adding host column failed: {}", e)))?;
    }

    Ok(())
}
