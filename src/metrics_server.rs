// HTTP server for the Prometheus metrics endpoint and the operator dashboard
//
// Listens on /metrics (default: 0.0.0.0:9090) on a port separate from the
// rate-limited API so scrapes never consume client quota. The /limits
// dashboard names client addresses and is only served here.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use tracing::{error, info};

use crate::metrics;
use crate::rate_limit::dashboard::{DashboardData, DEFAULT_TOP_KEYS};
use crate::rate_limit::{AdmissionController, Clock};

/// Router serving `/metrics` and `/health`
pub fn metrics_router() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
}

/// Metrics router plus the `/limits` dashboard for `controller`
pub fn operator_router<C: Clock>(controller: AdmissionController<C>) -> Router {
    metrics_router().merge(
        Router::new()
            .route("/limits", get(limits_handler::<C>))
            .with_state(controller),
    )
}

/// Start the metrics HTTP server
///
/// # Arguments
/// * `port` - Port to listen on (default 9090)
/// * `controller` - Controller whose usage `/limits` reports
pub async fn start_metrics_server<C: Clock>(
    port: u16,
    controller: AdmissionController<C>,
) -> Result<()> {
    metrics::init().context("Failed to initialize metrics")?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("Starting metrics server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind metrics server")?;

    axum::serve(listener, operator_router(controller))
        .await
        .context("Metrics server error")?;

    Ok(())
}

/// Metrics endpoint handler
async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Admission totals and the busiest keys
async fn limits_handler<C: Clock>(
    State(controller): State<AdmissionController<C>>,
) -> Json<DashboardData> {
    Json(DashboardData::collect(&controller, DEFAULT_TOP_KEYS))
}
