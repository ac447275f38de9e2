//! Finalizer protocol for WorkloadSchedule
//!
//! ```text
//! Unregistered --add finalizer--> Registered --delete requested--> Deleting
//!                                                                     |
//!                                              cleanup + remove finalizer
//!                                                                     v
//!                                                                   Gone
//! ```

use super::cluster::ScheduleStore;
use crate::crd::schedule::{WorkloadSchedule, FINALIZER};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::time::Duration;
use tracing::info;

/// Requeue delay after the finalizer has been added
pub const FINALIZER_ADDED_REQUEUE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Live object without our finalizer
    Unregistered,
    /// Live object carrying our finalizer
    Registered,
    /// Deletion requested, finalizer still present
    Deleting,
    /// Deletion requested, finalizer removed
    Gone,
}

/// What the reconciler should do after the lifecycle step
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleStep {
    /// Object is registered and live, keep reconciling
    Continue,
    /// End this cycle with the given action
    Stop(Action),
}

pub fn lifecycle_state(schedule: &WorkloadSchedule) -> LifecycleState {
    let has_finalizer = schedule.finalizers().iter().any(|f| f == FINALIZER);
    let deleting = schedule.metadata.deletion_timestamp.is_some();

    match (deleting, has_finalizer) {
        (false, false) => LifecycleState::Unregistered,
        (false, true) => LifecycleState::Registered,
        (true, true) => LifecycleState::Deleting,
        (true, false) => LifecycleState::Gone,
    }
}

/// Drive the finalizer state machine one step
///
/// Finalizer write failures are returned unchanged so the caller's error
/// policy handles the retry.
pub async fn apply_lifecycle(
    store: &dyn ScheduleStore,
    schedule: &WorkloadSchedule,
) -> Result<LifecycleStep, kube::Error> {
    let namespace = schedule.namespace().unwrap_or_default();
    let name = schedule.name_any();

    match lifecycle_state(schedule) {
        LifecycleState::Registered => Ok(LifecycleStep::Continue),
        LifecycleState::Unregistered => {
            let mut finalizers = schedule.finalizers().to_vec();
            finalizers.push(FINALIZER.to_string());
            store.set_finalizers(&namespace, &name, finalizers).await?;

            info!(schedule = %name, namespace = %namespace, "Added finalizer");
            Ok(LifecycleStep::Stop(Action::requeue(FINALIZER_ADDED_REQUEUE)))
        }
        LifecycleState::Deleting => {
            cleanup(schedule);

            let finalizers: Vec<String> = schedule
                .finalizers()
                .iter()
                .filter(|f| f.as_str() != FINALIZER)
                .cloned()
                .collect();
            store.set_finalizers(&namespace, &name, finalizers).await?;

            info!(schedule = %name, namespace = %namespace, "Removed finalizer");
            Ok(LifecycleStep::Stop(Action::await_change()))
        }
        LifecycleState::Gone => Ok(LifecycleStep::Stop(Action::await_change())),
    }
}

/// Cleanup before the finalizer is released
///
/// The target Deployment is left at whatever scale it currently has.
fn cleanup(schedule: &WorkloadSchedule) {
    info!(
        schedule = %schedule.name_any(),
        target_namespace = %schedule.spec.target_namespace,
        target_deployment = %schedule.spec.target_deployment,
        "Cleaning up WorkloadSchedule"
    );
}
