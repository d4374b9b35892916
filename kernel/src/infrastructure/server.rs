//! Operational control plane: health probes and Prometheus metrics.

use crate::infrastructure::config::Settings;
use axum::{extract::State, http::StatusCode, routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sqlx::SqlitePool;

async fn health_check() -> &'static str {
    "OK"
}

async fn readiness(State(pool): State<SqlitePool>) -> (StatusCode, &'static str) {
    match sqlx::query("SELECT 1").execute(&pool).await {
        Ok(_) => (StatusCode::OK, "OK"),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness probe failed");
            (StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
        }
    }
}

/// Installs the global Prometheus recorder.
///
/// Call once, before the engine records any metric.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn install_metrics() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {e}"))
}

/// Builds the control plane router.
pub fn router(pool: SqlitePool, metrics: PrometheusHandle) -> Router {
    Router::new()
        .route("/health/live", get(health_check))
        .route("/health/ready", get(readiness))
        .route("/metrics", get(move || std::future::ready(metrics.render())))
        .with_state(pool)
}

/// Runs the control plane HTTP server.
///
/// # Errors
///
/// Returns an error if the server fails to start or encounters an error while running.
pub async fn run_server(
    config: &Settings,
    pool: SqlitePool,
    metrics: PrometheusHandle,
) -> anyhow::Result<()> {
    let addr = config.server.bind_address().to_socket_addr()?;

    tracing::info!("Control Plane listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(pool, metrics)).await?;

    Ok(())
}
