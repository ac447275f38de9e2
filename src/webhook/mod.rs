//! Mutating admission webhook for Pods
//!
//! Labels new pods in a governed namespace with the owning schedule's
//! persisted active-window flag, and injects the same value as an
//! environment variable into every container.
//!
//! The webhook never talks to the reconciler directly: it reads schedule
//! objects (and their last written status) through a `ScheduleLookup`.
//! Every failure is fail-open.

pub mod lookup;
pub mod pod;

use crate::server::SharedMetrics;
use axum::{routing::post, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub use lookup::ScheduleLookup;

/// Path the MutatingWebhookConfiguration points at
pub const MUTATE_POD_PATH: &str = "/mutate--v1-pod";

/// Shared state for webhook handlers
#[derive(Clone)]
pub struct WebhookState {
    /// Source of WorkloadSchedule objects
    pub lookup: Arc<dyn ScheduleLookup>,
    pub metrics: SharedMetrics,
}

impl WebhookState {
    pub fn new(lookup: Arc<dyn ScheduleLookup>, metrics: SharedMetrics) -> Self {
        Self { lookup, metrics }
    }
}

/// Create the webhook router
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(MUTATE_POD_PATH, post(pod::mutate_handler))
        .with_state(state)
}

/// Run the webhook server on the specified port
///
/// Serves plain HTTP; TLS is terminated in front of this listener.
pub async fn run_webhook_server(port: u16, state: Arc<WebhookState>) -> Result<(), std::io::Error> {
    let app = webhook_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = %port, path = MUTATE_POD_PATH, "Webhook server listening");

    axum::serve(listener, app)
        .await
        .map_err(std::io::Error::other)
}
