//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::db::Store;
use crate::monitor::MonitorService;
use crate::probe::NetworkProber;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<Store>,
    pub monitor: Arc<MonitorService<NetworkProber>>,
}

/// Web server for HostPulse.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(
        config: ServerConfig,
        store: Arc<Store>,
        monitor: Arc<MonitorService<NetworkProber>>,
    ) -> Self {
        Self {
            state: AppState {
                config,
                store,
                monitor,
            },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let router = Router::new()
            .route("/api/health", get(handlers::handle_health))
            .route("/api/ping", post(handlers::handle_ping))
            .route("/api/stats", get(handlers::handle_stats))
            .route(
                "/api/hosts",
                get(handlers::handle_list_hosts).post(handlers::handle_add_host),
            )
            .route("/api/hosts/{host}", delete(handlers::handle_remove_host))
            .route("/api/cron", get(handlers::handle_cron));

        // Frontend assets, when present
        let static_dir = Path::new(&self.state.config.static_dir);
        let router = if static_dir.is_dir() {
            tracing::info!("Serving static files from {}", static_dir.display());
            router.fallback_service(ServeDir::new(static_dir))
        } else {
            router
        };

        router
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(64 * 1024))
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
