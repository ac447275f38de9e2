use super::cluster::{KubeCluster, ScheduleStore, WorkloadApi};
use super::conditions::set_condition;
use super::lifecycle::{apply_lifecycle, LifecycleStep};
use super::scaling::{scale_deployment, ScaleError};
use super::time_source::{TimeError, TimeSource};
use super::window::is_within_active_window;
use crate::crd::schedule::{
    ConditionStatus, WorkloadSchedule, WorkloadScheduleStatus, CONDITION_READY, CONDITION_SYNCED,
};
use crate::server::SharedMetrics;
use chrono::{SecondsFormat, Utc};
use futures::Stream;
use kube::runtime::controller::Action;
use kube::runtime::{predicates, watcher, WatchStreamExt};
use kube::ResourceExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

/// Default fixed interval between reconciliations, successful or not
pub const DEFAULT_REQUEUE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("WorkloadSchedule missing namespace")]
    MissingNamespace,

    #[error("failed to update finalizers: {0}")]
    Finalizer(kube::Error),

    #[error("failed to ensure namespace {namespace}: {source}")]
    Namespace {
        namespace: String,
        source: kube::Error,
    },

    #[error("failed to get current time: {0}")]
    TimeApi(#[from] TimeError),

    #[error(transparent)]
    Scale(#[from] ScaleError),

    #[error("failed to update status: {0}")]
    Status(kube::Error),
}

/// Shared controller state
pub struct Context {
    pub store: Arc<dyn ScheduleStore>,
    pub workloads: Arc<dyn WorkloadApi>,
    pub time_source: Arc<dyn TimeSource>,
    pub metrics: SharedMetrics,
    pub requeue_interval: Duration,
}

impl Context {
    /// Context backed by a live Kubernetes client
    pub fn new(
        client: kube::Client,
        time_source: Arc<dyn TimeSource>,
        metrics: SharedMetrics,
        requeue_interval: Duration,
    ) -> Self {
        let cluster = Arc::new(KubeCluster::new(client));
        Context {
            store: cluster.clone(),
            workloads: cluster,
            time_source,
            metrics,
            requeue_interval,
        }
    }
}

/// How a reconcile pass ended when it did not fail
#[derive(Debug)]
enum Outcome {
    /// Full pass: time fetched, workload converged, status written
    Synced,
    /// Stopped early (object gone or finalizer step)
    Stopped(Action),
}

/// Reconcile a WorkloadSchedule resource
///
/// Entry point for `kube::runtime::Controller`. The object handed in by the
/// watch is only used for its identity; the current state is re-read.
pub async fn reconcile(
    schedule: Arc<WorkloadSchedule>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let namespace = schedule
        .namespace()
        .ok_or(ReconcileError::MissingNamespace)?;
    let name = schedule.name_any();

    reconcile_schedule(&ctx, &namespace, &name).await
}

/// Reconcile the schedule `namespace/name`
///
/// # Returns
/// * `Ok(Action)` - requeue after the fixed interval, or the lifecycle step's action
/// * `Err(ReconcileError)` - failure; status already carries a condition describing it
pub async fn reconcile_schedule(
    ctx: &Context,
    namespace: &str,
    name: &str,
) -> Result<Action, ReconcileError> {
    let started = Instant::now();
    let result = sync_schedule(ctx, namespace, name).await;
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(Outcome::Synced) => {
            ctx.metrics.record_reconciliation_success(elapsed);
            Ok(Action::requeue(ctx.requeue_interval))
        }
        Ok(Outcome::Stopped(action)) => {
            ctx.metrics.record_reconciliation_skipped();
            Ok(action)
        }
        Err(e) => {
            ctx.metrics.record_reconciliation_error(elapsed);
            Err(e)
        }
    }
}

async fn sync_schedule(
    ctx: &Context,
    namespace: &str,
    name: &str,
) -> Result<Outcome, ReconcileError> {
    info!(schedule = %name, namespace = %namespace, "Reconciling WorkloadSchedule");

    let Some(schedule) = ctx.store.get_schedule(namespace, name).await? else {
        info!(
            schedule = %name,
            namespace = %namespace,
            "WorkloadSchedule not found, assuming deleted"
        );
        ctx.metrics.forget_schedule(namespace, name);
        return Ok(Outcome::Stopped(Action::await_change()));
    };

    if schedule.metadata.deletion_timestamp.is_some() {
        ctx.metrics.forget_schedule(namespace, name);
    }
    match apply_lifecycle(ctx.store.as_ref(), &schedule)
        .await
        .map_err(|e| {
            error!(error = %e, schedule = %name, "Failed to update finalizers");
            ReconcileError::Finalizer(e)
        })? {
        LifecycleStep::Continue => {}
        LifecycleStep::Stop(action) => return Ok(Outcome::Stopped(action)),
    }

    let spec = &schedule.spec;
    let mut status = schedule.status.clone().unwrap_or_default();

    if let Err(e) = ctx.workloads.ensure_namespace(&spec.target_namespace).await {
        error!(
            error = %e,
            target_namespace = %spec.target_namespace,
            "Failed to ensure target namespace exists"
        );
        set_condition(
            &mut status.conditions,
            CONDITION_READY,
            ConditionStatus::False,
            "NamespaceError",
            &e.to_string(),
            &now_rfc3339(),
        );
        persist_failure_status(ctx, namespace, name, &status).await;
        return Err(ReconcileError::Namespace {
            namespace: spec.target_namespace.clone(),
            source: e,
        });
    }

    let snapshot = match ctx.time_source.current_time(&spec.timezone).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!(
                error = %e,
                timezone = %spec.timezone,
                "Failed to get current time from time API"
            );
            set_condition(
                &mut status.conditions,
                CONDITION_SYNCED,
                ConditionStatus::False,
                "TimeAPIError",
                &e.to_string(),
                &now_rfc3339(),
            );
            persist_failure_status(ctx, namespace, name, &status).await;
            return Err(e.into());
        }
    };

    let active = is_within_active_window(&snapshot.local, spec.start_hour, spec.end_hour);
    let local_time = snapshot.local.to_rfc3339_opts(SecondsFormat::Secs, true);
    info!(
        schedule = %name,
        current_time = %local_time,
        utc_offset = %snapshot.utc_offset,
        start_hour = spec.start_hour,
        end_hour = spec.end_hour,
        within_active_window = active,
        "Time check"
    );

    let desired = if active { spec.replicas_when_active } else { 0 };

    let outcome = match scale_deployment(
        ctx.workloads.as_ref(),
        &spec.target_namespace,
        &spec.target_deployment,
        desired,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(
                error = %e,
                action = e.action(),
                observed_replicas = e.observed_replicas(),
                target_namespace = %spec.target_namespace,
                target_deployment = %spec.target_deployment,
                "Failed to scale deployment"
            );
            set_condition(
                &mut status.conditions,
                CONDITION_READY,
                ConditionStatus::False,
                "ScaleError",
                &e.to_string(),
                &now_rfc3339(),
            );
            persist_failure_status(ctx, namespace, name, &status).await;
            return Err(e.into());
        }
    };

    let now = now_rfc3339();
    status.current_local_time = local_time;
    status.within_active_window = active;
    status.last_scale_action = outcome.action.clone();
    status.last_sync_time = Some(now.clone());
    status.current_replicas = outcome.replicas;
    set_condition(
        &mut status.conditions,
        CONDITION_READY,
        ConditionStatus::True,
        "Reconciled",
        "Successfully reconciled",
        &now,
    );
    set_condition(
        &mut status.conditions,
        CONDITION_SYNCED,
        ConditionStatus::True,
        "Synced",
        "Successfully synced with time API",
        &now,
    );

    ctx.store
        .update_status(namespace, name, &status)
        .await
        .map_err(|e| {
            error!(error = %e, schedule = %name, "Failed to update WorkloadSchedule status");
            ReconcileError::Status(e)
        })?;

    ctx.metrics
        .set_schedule_state(namespace, name, active, outcome.replicas);

    info!(
        schedule = %name,
        scale_action = %outcome.action,
        replicas = outcome.replicas,
        "Successfully reconciled WorkloadSchedule"
    );

    Ok(Outcome::Synced)
}

/// Best-effort status write on a failure path
///
/// A failing write here is logged; the original error is what gets returned.
async fn persist_failure_status(
    ctx: &Context,
    namespace: &str,
    name: &str,
    status: &WorkloadScheduleStatus,
) {
    if let Err(e) = ctx.store.update_status(namespace, name, status).await {
        error!(error = %e, schedule = %name, "Failed to update status");
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Error policy for the controller
///
/// Every failure is retried after the same fixed interval used for healthy
/// schedules; there is no backoff escalation.
///
/// Uses `warn!` since reconciliation errors are expected and trigger retries.
pub fn error_policy(
    _schedule: Arc<WorkloadSchedule>,
    error: &ReconcileError,
    ctx: Arc<Context>,
) -> Action {
    warn!(error = %error, "Reconcile error (will retry)");
    Action::requeue(ctx.requeue_interval)
}

/// Schedules whose generation changed, from a watch event stream
///
/// Status writes do not bump `metadata.generation`, so the reconciler's own
/// status updates never retrigger it; periodic runs come from the requeue.
/// Deletion bumps the generation and still gets through.
pub fn spec_changes<S>(
    events: S,
) -> impl Stream<Item = Result<WorkloadSchedule, watcher::Error>> + Send + 'static
where
    S: Stream<Item = Result<watcher::Event<WorkloadSchedule>, watcher::Error>> + Send + 'static,
{
    events
        .applied_objects()
        .predicate_filter(predicates::generation)
}

#[cfg(test)]
#[path = "schedule_test.rs"]
mod tests;
