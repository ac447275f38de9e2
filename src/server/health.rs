//! Health check endpoints for Kubernetes probes
//!
//! - `/healthz` - Liveness: Is the process alive?
//! - `/readyz` - Readiness: Is the controller ready to handle requests?
//! - `/metrics` - Prometheus text exposition

use super::metrics::SharedMetrics;
use axum::{
    extract::{FromRef, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Shared state for readiness tracking
///
/// The operator sets this to ready once the Kubernetes client is up
/// and the controller is about to start.
#[derive(Debug, Clone)]
pub struct ReadinessState {
    ready: Arc<std::sync::atomic::AtomicBool>,
}

impl ReadinessState {
    /// Create a new readiness state (initially not ready)
    pub fn new() -> Self {
        Self {
            ready: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// Mark the controller as ready
    pub fn set_ready(&self) {
        self.ready.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Check if the controller is ready
    pub fn is_ready(&self) -> bool {
        self.ready.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Default for ReadinessState {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared by the health routes
#[derive(Clone)]
struct ServerState {
    readiness: ReadinessState,
    metrics: SharedMetrics,
}

impl FromRef<ServerState> for ReadinessState {
    fn from_ref(state: &ServerState) -> Self {
        state.readiness.clone()
    }
}

impl FromRef<ServerState> for SharedMetrics {
    fn from_ref(state: &ServerState) -> Self {
        state.metrics.clone()
    }
}

/// Liveness probe handler
///
/// Always returns 200 OK - if this responds, the process is alive.
async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe handler
///
/// Returns 200 OK if ready, 503 Service Unavailable if not.
async fn readyz(State(readiness): State<ReadinessState>) -> StatusCode {
    if readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Metrics handler
///
/// Returns the Prometheus text format, or 500 if encoding fails.
async fn metrics(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
                String::new(),
            )
        }
    }
}

/// Router serving the probe and metrics endpoints
pub(super) fn health_router(readiness: ReadinessState, metrics_registry: SharedMetrics) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(ServerState {
            readiness,
            metrics: metrics_registry,
        })
}

/// Run the health server on the specified port
///
/// - GET /healthz - Always returns 200 OK (liveness)
/// - GET /readyz - 200 once the controller is wired, 503 before
/// - GET /metrics - Prometheus metrics
///
/// Runs until the server is shut down.
pub async fn run_health_server(
    port: u16,
    readiness: ReadinessState,
    metrics_registry: SharedMetrics,
) -> Result<(), std::io::Error> {
    let app = health_router(readiness, metrics_registry);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = %port, "Health server listening");

    axum::serve(listener, app)
        .await
        .map_err(std::io::Error::other)
}
