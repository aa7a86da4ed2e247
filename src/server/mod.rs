//! HTTP API Server
//!
//! Exposes the admission controller in front of a small JSON API. Every
//! route passes through the rate limiting middleware, keyed by client
//! address. Proxy headers feed the key only when `trust_proxy_headers` is
//! set.

pub mod middleware;
pub mod routes;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::config::Config;
use crate::metrics_server;
use crate::rate_limit::{AdmissionController, Clock, SystemClock};
use middleware::{rate_limit_middleware, MakeRequestUuidV4};

/// Application state shared across handlers
pub struct AppState<C: Clock = SystemClock> {
    /// Admission controller shared by every request
    pub controller: AdmissionController<C>,

    /// Environment name reported by the health endpoint
    pub environment: String,

    /// Crate version reported by the health endpoint
    pub version: &'static str,

    /// Key clients by `X-Real-IP`/`X-Forwarded-For` instead of the peer address
    pub trust_proxy_headers: bool,
}

impl<C: Clock> AppState<C> {
    pub fn new(controller: AdmissionController<C>, environment: impl Into<String>) -> Self {
        Self {
            controller,
            environment: environment.into(),
            version: env!("CARGO_PKG_VERSION"),
            trust_proxy_headers: false,
        }
    }

    /// Trust proxy headers for client keys; only safe behind a proxy that
    /// overwrites them
    pub fn trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }
}

impl<C: Clock> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            environment: self.environment.clone(),
            version: self.version,
            trust_proxy_headers: self.trust_proxy_headers,
        }
    }
}

/// Create the application router with all routes and middleware
pub fn build_router<C: Clock>(state: AppState<C>) -> Router {
    Router::new()
        .route("/v1/health", get(routes::health::<C>))
        .route("/v1/test", get(routes::test_endpoint))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware::<C>,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

/// Serve on `listener` until `shutdown` resolves.
///
/// Runs the eviction sweeper for the lifetime of the server and stops it
/// once in-flight requests have drained.
pub async fn serve_with_shutdown<C, F>(
    listener: TcpListener,
    state: AppState<C>,
    shutdown: F,
) -> Result<()>
where
    C: Clock,
    F: Future<Output = ()> + Send + 'static,
{
    let sweeper = state
        .controller
        .spawn_sweeper(state.controller.policy().idle_horizon());

    let local_addr = listener
        .local_addr()
        .context("Failed to read listener address")?;
    info!(
        addr = %local_addr,
        limit = state.controller.policy().limit(),
        window_secs = state.controller.policy().window().as_secs_f64(),
        algorithm = %state.controller.algorithm(),
        "Starting throttlegate server"
    );

    let app = build_router(state);
    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("Server error");

    sweeper.stop().await;
    info!("Server stopped");

    result
}

/// Build the controller from `config`, bind, and serve until Ctrl-C
pub async fn serve(config: Config) -> Result<()> {
    let policy = config.rate_limit.quota_policy()?;
    let controller =
        AdmissionController::with_options(policy, config.rate_limit.controller_options())
            .context("Failed to create admission controller")?;

    crate::metrics::init().context("Failed to initialize metrics")?;
    let metrics_task = if config.metrics.enabled {
        let port = config.metrics.port;
        let controller = controller.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = metrics_server::start_metrics_server(port, controller).await {
                error!("Metrics server failed: {:#}", e);
            }
        }))
    } else {
        None
    };

    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let state = AppState::new(controller, config.server.environment.clone())
        .trust_proxy_headers(config.server.trust_proxy_headers);
    let result = serve_with_shutdown(listener, state, shutdown_signal()).await;

    if let Some(task) = metrics_task {
        task.abort();
    }

    result
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}
