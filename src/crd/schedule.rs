use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finalizer guarding WorkloadSchedule deletion until cleanup has run
pub const FINALIZER: &str = "workloadschedule.infra.workloadschedule.io/finalizer";

/// Label injected into pods created in a governed namespace
pub const ACTIVE_LABEL: &str = "schedule.workloadschedule.io/active";

/// Environment variable injected into every container of a governed pod
pub const ACTIVE_ENV_VAR: &str = "WORKLOAD_SCHEDULE_ACTIVE";

/// Condition type reporting whether the target workload was reconciled
pub const CONDITION_READY: &str = "Ready";

/// Condition type reporting whether the time source was reachable
pub const CONDITION_SYNCED: &str = "Synced";

/// WorkloadSchedule scales one Deployment up inside a daily hour window
/// and down to zero outside it
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "infra.workloadschedule.io",
    version = "v1alpha1",
    kind = "WorkloadSchedule",
    namespaced,
    status = "WorkloadScheduleStatus",
    printcolumn = r#"{"name":"Timezone", "type":"string", "jsonPath":".spec.timezone"}"#,
    printcolumn = r#"{"name":"Active", "type":"boolean", "jsonPath":".status.withinActiveWindow"}"#,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".status.currentReplicas"}"#,
    printcolumn = r#"{"name":"Last Sync", "type":"date", "jsonPath":".status.lastSyncTime"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadScheduleSpec {
    /// IANA timezone used to query the time API (e.g. "America/Toronto")
    #[schemars(length(min = 1))]
    pub timezone: String,

    /// Hour (0-23) when the active window begins, inclusive
    #[schemars(range(min = 0, max = 23))]
    pub start_hour: u32,

    /// Hour (0-24) when the active window ends, exclusive
    #[schemars(range(min = 0, max = 24))]
    pub end_hour: u32,

    /// Namespace of the target Deployment
    #[schemars(length(min = 1))]
    pub target_namespace: String,

    /// Name of the Deployment to scale
    #[schemars(length(min = 1))]
    pub target_deployment: String,

    /// Replica count while inside the active window
    #[schemars(range(min = 1))]
    pub replicas_when_active: i32,
}

/// Status of the WorkloadSchedule
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadScheduleStatus {
    /// Local time in the schedule's timezone at the last successful fetch (RFC3339)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_local_time: String,

    /// Whether the last successful sync fell inside the active window
    #[serde(default)]
    pub within_active_window: bool,

    /// Description of the last scaling action
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_scale_action: String,

    /// Timestamp of the last successful reconciliation (RFC3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<String>,

    /// Replica count of the target Deployment as last observed
    #[serde(default)]
    pub current_replicas: i32,

    /// At most one condition per type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Condition is a named, timestamped health signal
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (Ready, Synced)
    #[serde(rename = "type")]
    pub type_: String,

    pub status: ConditionStatus,

    /// Machine-readable reason in CamelCase
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the status value changed (RFC3339)
    pub last_transition_time: String,
}

impl WorkloadSchedule {
    /// Active-window flag as persisted by the last successful reconcile
    pub fn persisted_active(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.within_active_window)
            .unwrap_or(false)
    }
}

#[cfg(test)]
#[path = "schedule_test.rs"]
mod tests;
