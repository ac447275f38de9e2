use futures::StreamExt;
use kube::runtime::{reflector, watcher, Controller, WatchStreamExt};
use kube::{Api, Client};
use std::sync::Arc;
use tracing::{error, info, warn};
use workload_schedule::config::OperatorConfig;
use workload_schedule::controller::spec_changes;
use workload_schedule::controller::time_source::WorldTimeClient;
use workload_schedule::crd::schedule::WorkloadSchedule;
use workload_schedule::server::{create_metrics, run_health_server, ReadinessState};
use workload_schedule::webhook::{run_webhook_server, WebhookState};
use workload_schedule::{error_policy, reconcile, Context};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting workload schedule operator");

    let config = OperatorConfig::from_env();
    info!(
        time_api_url = %config.time_api_url,
        requeue_secs = config.requeue_interval.as_secs(),
        webhook_enabled = config.webhook_enabled,
        "Configuration loaded"
    );

    let metrics = create_metrics()?;

    // Create readiness state (initially not ready)
    let readiness = ReadinessState::new();

    // Start health server in background
    let health_readiness = readiness.clone();
    let health_metrics = metrics.clone();
    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = run_health_server(health_port, health_readiness, health_metrics).await {
            warn!(error = %e, "Health server failed");
        }
    });
    info!(port = health_port, "Health server task spawned");

    // Create Kubernetes client
    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e.into());
        }
    };

    info!("Connected to Kubernetes cluster");

    let time_source = Arc::new(WorldTimeClient::new(
        config.time_api_url.clone(),
        config.time_api_timeout,
    )?);

    let ctx = Arc::new(Context::new(
        client.clone(),
        time_source,
        metrics.clone(),
        config.requeue_interval,
    ));

    // One watch feeds both the reconciler and the webhook's cache; the
    // reconciler only sees generation changes, the cache sees everything
    let (reader, writer) = reflector::store();
    let events = watcher(
        Api::<WorkloadSchedule>::all(client.clone()),
        watcher::Config::default(),
    )
    .default_backoff()
    .reflect(writer);
    let controller = Controller::for_stream(spec_changes(events), reader);

    // The webhook reads schedules from the controller's own cache
    if config.webhook_enabled {
        let state = Arc::new(WebhookState::new(
            Arc::new(controller.store()),
            metrics.clone(),
        ));
        let webhook_port = config.webhook_port;
        tokio::spawn(async move {
            if let Err(e) = run_webhook_server(webhook_port, state).await {
                warn!(error = %e, "Webhook server failed");
            }
        });
        info!(port = webhook_port, "Webhook server task spawned");
    }

    // Mark as ready - controller is initialized and about to start
    readiness.set_ready();
    info!("Controller ready, starting reconciliation loop");

    // Note: error_policy already logs errors with warn!, so we only log success here
    controller
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            if let Ok(o) = res {
                info!("Reconciled: {:?}", o);
            }
        })
        .await;

    Ok(())
}
