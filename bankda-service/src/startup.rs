//! Application startup and lifecycle management.

use crate::config::BankdaConfig;
use crate::handlers;
use crate::services::{BankdaProvider, Database, HttpBankdaProvider, SyncService};
use crate::services::{get_metrics, init_metrics};
use crate::workers::scheduler::run_sync_scheduler;
use axum::{
    extract::State, http::StatusCode, middleware, response::IntoResponse, routing::get,
    routing::post, Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: BankdaConfig,
    pub db: Arc<Database>,
    pub sync: Arc<SyncService>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "bankda-service",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "bankda-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration, talking to the
    /// real provider.
    pub async fn build(config: BankdaConfig) -> Result<Self, AppError> {
        let provider = HttpBankdaProvider::new(config.provider.clone()).map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Failed to build provider client: {}", e))
        })?;
        Self::build_with_provider(config, Arc::new(provider)).await
    }

    /// Build the application with an injected provider. Tests use this to
    /// substitute a scripted provider.
    pub async fn build_with_provider(
        config: BankdaConfig,
        provider: Arc<dyn BankdaProvider>,
    ) -> Result<Self, AppError> {
        // Initialize metrics
        init_metrics();

        // Connect to database
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        db.run_migrations().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            e
        })?;

        let db = Arc::new(db);
        let sync = Arc::new(SyncService::new(db.clone(), provider));

        let state = AppState {
            config: config.clone(),
            db,
            sync,
        };

        // Bind HTTP listener
        let host: IpAddr = config.common.host.parse().map_err(|_| {
            AppError::ConfigError(anyhow::anyhow!("Invalid host: {}", config.common.host))
        })?;
        let addr = SocketAddr::new(host, config.common.port);
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Bankda service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = Router::new()
            .route("/api/admin/bankda/summary", get(handlers::bankda::get_summary))
            .route(
                "/api/admin/bankda/transactions",
                get(handlers::bankda::list_transactions),
            )
            .route(
                "/api/admin/bankda/search-members",
                get(handlers::bankda::search_members),
            )
            .route("/api/admin/bankda/sync", post(handlers::bankda::trigger_sync))
            .route(
                "/api/admin/bankda/transactions/:id/manual-match",
                post(handlers::bankda::manual_match),
            )
            .route(
                "/api/admin/bankda/transactions/:id/ignore",
                post(handlers::bankda::ignore_transaction),
            )
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(self.state.clone());

        // Recurring sync cycles, when configured.
        let shutdown = CancellationToken::new();
        if self.state.config.sync.interval_secs > 0 {
            tokio::spawn(run_sync_scheduler(
                self.state.sync.clone(),
                Duration::from_secs(self.state.config.sync.interval_secs),
                shutdown.clone(),
            ));
        }

        tracing::info!(
            service = "bankda-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        let result = axum::serve(self.listener, router).await;
        shutdown.cancel();

        if let Err(e) = result {
            tracing::error!(error = %e, "HTTP server error");
            return Err(std::io::Error::other(format!("HTTP server error: {}", e)));
        }

        Ok(())
    }
}
