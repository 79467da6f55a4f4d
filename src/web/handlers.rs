//! HTTP request handlers.
//!
//! Thin mapping between JSON requests and the monitor core. Timestamps are
//! formatted as local `HH:MM:SS` here and nowhere else.

use super::AppState;
use crate::db::{HistoryPoint, MonitoredHost, ProbeStatus};
use crate::monitor::{MonitorResult, SweepEntry};
use crate::probe::ProbeMethod;
use crate::registry::RegistryError;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Number of history rows returned by `/api/stats`.
const STATS_LIMIT: usize = 50;

// ============================================================================
// Response bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
}

fn error_response(code: StatusCode, message: impl Into<String>) -> Response {
    (
        code,
        Json(ErrorBody {
            status: "error",
            message: message.into(),
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub host: String,
    pub status: ProbeStatus,
    pub latency: f64,
    pub jitter: f64,
    pub method: Option<ProbeMethod>,
    pub timestamp: String,
}

impl From<MonitorResult> for PingResponse {
    fn from(r: MonitorResult) -> Self {
        Self {
            timestamp: format_clock(r.timestamp),
            host: r.host,
            status: r.status,
            latency: r.latency_ms,
            jitter: r.jitter,
            method: r.method,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsPoint {
    pub timestamp: String,
    pub latency: f64,
    pub status: ProbeStatus,
}

impl From<HistoryPoint> for StatsPoint {
    fn from(p: HistoryPoint) -> Self {
        Self {
            timestamp: format_clock(p.timestamp),
            latency: p.latency_ms,
            status: p.status,
        }
    }
}

/// One host in a `/api/cron` response.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CronEntry {
    Checked(PingResponse),
    Failed {
        host: String,
        status: &'static str,
        message: String,
    },
}

impl From<SweepEntry> for CronEntry {
    fn from(entry: SweepEntry) -> Self {
        match entry {
            SweepEntry::Checked(r) => CronEntry::Checked(r.into()),
            SweepEntry::Failed { host, message } => CronEntry::Failed {
                host,
                status: "failed",
                message,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CronResponse {
    pub checked: usize,
    pub results: Vec<CronEntry>,
}

/// Format epoch seconds as local wall-clock `HH:MM:SS`.
fn format_clock(timestamp: f64) -> String {
    let secs = timestamp.floor() as i64;
    let nanos = ((timestamp - timestamp.floor()) * 1e9) as u32;
    DateTime::from_timestamp(secs, nanos)
        .unwrap_or_default()
        .with_timezone(&Local)
        .format("%H:%M:%S")
        .to_string()
}

// ============================================================================
// Health
// ============================================================================

pub async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================================
// API: Probing
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PingRequest {
    pub host: String,
}

pub async fn handle_ping(
    State(state): State<AppState>,
    Json(req): Json<PingRequest>,
) -> Response {
    let host = req.host.trim();
    if host.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "host is required");
    }

    match state.monitor.check_host(host).await {
        Ok(result) => Json(PingResponse::from(result)).into_response(),
        Err(e) => {
            tracing::error!("Check of {} failed: {}", host, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub host: Option<String>,
}

pub async fn handle_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Response {
    let host = query.host.as_deref().map(str::trim).filter(|h| !h.is_empty());

    match state.store.recent_history(host, STATS_LIMIT) {
        Ok(points) => {
            let body: Vec<StatsPoint> = points.into_iter().map(StatsPoint::from).collect();
            Json(body).into_response()
        }
        Err(e) => {
            tracing::error!("Failed to read history: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub async fn handle_cron(State(state): State<AppState>) -> Response {
    match state.monitor.sweep().await {
        Ok(entries) => {
            let results: Vec<CronEntry> = entries.into_iter().map(CronEntry::from).collect();
            Json(CronResponse {
                checked: results.len(),
                results,
            })
            .into_response()
        }
        Err(e) => {
            tracing::error!("Sweep failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// ============================================================================
// API: Hosts
// ============================================================================

fn registry_error_response(e: RegistryError) -> Response {
    match e {
        RegistryError::EmptyHost => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        RegistryError::Db(_) => {
            tracing::error!("Registry failure: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub async fn handle_list_hosts(State(state): State<AppState>) -> Response {
    match state.monitor.registry().list() {
        Ok(hosts) => Json(hosts).into_response(),
        Err(e) => registry_error_response(e),
    }
}

pub async fn handle_add_host(
    State(state): State<AppState>,
    Json(req): Json<MonitoredHost>,
) -> Response {
    match state.monitor.registry().add(&req.host) {
        Ok(()) => (
            StatusCode::CREATED,
            Json(MonitoredHost {
                host: req.host.trim().to_string(),
            }),
        )
            .into_response(),
        Err(e) => registry_error_response(e),
    }
}

pub async fn handle_remove_host(
    State(state): State<AppState>,
    Path(host): Path<String>,
) -> Response {
    match state.monitor.registry().remove(&host) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => registry_error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::super::Server;
    use super::*;
    use crate::config::ServerConfig;
    use crate::db::{ProbeRecord, Store};
    use crate::monitor::MonitorService;
    use crate::probe::NetworkProber;

    use axum::body::Body;
    use axum::http::Request;
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn closed_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn app() -> (Router, Arc<Store>) {
        let mut config = ServerConfig {
            static_dir: "does-not-exist".to_string(),
            ..Default::default()
        };
        config.probe.icmp_enabled = false;
        config.probe.tcp_ports = vec![closed_port().await];

        let store = Arc::new(Store::open_in_memory().unwrap());
        let monitor = Arc::new(MonitorService::new(
            NetworkProber::new(config.probe.clone()),
            store.clone(),
            config.monitor_settings(),
        ));
        let server = Server::new(config, store.clone(), monitor);
        (server.routes(), store)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[test]
    fn test_format_clock_shape() {
        let clock = format_clock(1_700_000_000.75);
        assert_eq!(clock.len(), 8);
        assert_eq!(clock.as_bytes()[2], b':');
        assert_eq!(clock.as_bytes()[5], b':');
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app().await;
        let (status, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_ping_unreachable_host() {
        let (app, store) = app().await;
        let (status, body) =
            send(&app, "POST", "/api/ping", Some(serde_json::json!({ "host": "127.0.0.1" }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["host"], "127.0.0.1");
        assert_eq!(body["status"], "down");
        assert_eq!(body["latency"], 0.0);
        assert_eq!(body["jitter"], 0.0);
        assert!(body["method"].is_null());
        assert_eq!(body["timestamp"].as_str().unwrap().len(), 8);

        assert_eq!(store.count_records("127.0.0.1").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ping_requires_host() {
        let (app, _) = app().await;
        let (status, body) =
            send(&app, "POST", "/api/ping", Some(serde_json::json!({ "host": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_stats_chronological() {
        let (app, store) = app().await;
        store.insert_record(&ProbeRecord::up("a", 1_700_000_000.0, 10.0)).unwrap();
        store.insert_record(&ProbeRecord::down("b", 1_700_000_001.0)).unwrap();
        store.insert_record(&ProbeRecord::up("a", 1_700_000_002.0, 30.0)).unwrap();

        let (status, body) = send(&app, "GET", "/api/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["latency"], 10.0);
        assert_eq!(rows[1]["status"], "down");
        assert_eq!(rows[2]["latency"], 30.0);

        let (_, body) = send(&app, "GET", "/api/stats?host=a", None).await;
        let latencies: Vec<f64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["latency"].as_f64().unwrap())
            .collect();
        assert_eq!(latencies, vec![10.0, 30.0]);
    }

    #[tokio::test]
    async fn test_stats_capped_at_fifty() {
        let (app, store) = app().await;
        for i in 0..75 {
            store.insert_record(&ProbeRecord::up("a", i as f64, i as f64)).unwrap();
        }

        let (_, body) = send(&app, "GET", "/api/stats", None).await;
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 50);
        assert_eq!(rows[0]["latency"], 25.0);
        assert_eq!(rows[49]["latency"], 74.0);
    }

    #[tokio::test]
    async fn test_host_registry_routes() {
        let (app, _) = app().await;

        let (status, _) =
            send(&app, "POST", "/api/hosts", Some(serde_json::json!({ "host": "10.0.0.1:22" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) =
            send(&app, "POST", "/api/hosts", Some(serde_json::json!({ "host": "10.0.0.1:22" }))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, body) = send(&app, "GET", "/api/hosts", None).await;
        assert_eq!(body, serde_json::json!([{ "host": "10.0.0.1:22" }]));

        let (status, _) = send(&app, "DELETE", "/api/hosts/10.0.0.1:22", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "DELETE", "/api/hosts/10.0.0.1:22", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = send(&app, "GET", "/api/hosts", None).await;
        assert_eq!(body, serde_json::json!([]));

        let (status, _) =
            send(&app, "POST", "/api/hosts", Some(serde_json::json!({ "host": "" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cron_sweeps_registered_hosts() {
        let (app, store) = app().await;
        for host in ["127.0.0.1", "localhost"] {
            send(&app, "POST", "/api/hosts", Some(serde_json::json!({ "host": host }))).await;
        }

        let (status, body) = send(&app, "GET", "/api/cron", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checked"], 2);
        assert_eq!(body["results"][0]["host"], "127.0.0.1");
        assert_eq!(body["results"][1]["host"], "localhost");
        assert_eq!(store.count_records("127.0.0.1").unwrap(), 1);
    }
}
