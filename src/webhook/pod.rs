//! Pod mutation: label and env var carrying the schedule's active flag

use super::{ScheduleLookup, WebhookState};
use crate::crd::schedule::{WorkloadSchedule, ACTIVE_ENV_VAR, ACTIVE_LABEL};
use axum::{extract::State, Json};
use k8s_openapi::api::core::v1::{Container, EnvVar, Pod};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::{DynamicObject, Status, TypeMeta};
use kube::ResourceExt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

const ADMISSION_API_VERSION: &str = "admission.k8s.io/v1";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("failed to list WorkloadSchedules: {0}")]
    Lookup(#[from] kube::Error),

    #[error("failed to serialize pod: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// What to do with an incoming pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodDecision {
    /// Leave the pod untouched
    Skip(&'static str),
    /// Inject the active flag of `schedule`
    Inject { schedule: String, active: bool },
}

/// Pick the schedule governing `namespace`
///
/// Several schedules may target the same namespace; the oldest one
/// (creation timestamp, then namespace/name) wins so the answer does not
/// depend on listing order.
pub fn resolve_schedule<'a>(
    schedules: &'a [Arc<WorkloadSchedule>],
    namespace: &str,
) -> Option<&'a WorkloadSchedule> {
    let matching: Vec<&WorkloadSchedule> = schedules
        .iter()
        .map(|ws| ws.as_ref())
        .filter(|ws| ws.spec.target_namespace == namespace)
        .collect();

    if matching.len() > 1 {
        warn!(
            namespace = %namespace,
            count = matching.len(),
            "Multiple WorkloadSchedules target namespace, using the oldest"
        );
    }

    matching.into_iter().min_by(|a, b| {
        let key = |ws: &WorkloadSchedule| {
            (
                ws.metadata.creation_timestamp.clone(),
                ws.metadata.namespace.clone(),
                ws.metadata.name.clone(),
            )
        };
        key(a).cmp(&key(b))
    })
}

/// Decide whether and how to mutate a pod created in `namespace`
pub async fn decide(
    lookup: &dyn ScheduleLookup,
    namespace: Option<&str>,
) -> Result<PodDecision, WebhookError> {
    let Some(namespace) = namespace.filter(|ns| !ns.is_empty()) else {
        return Ok(PodDecision::Skip("namespace unknown"));
    };

    let schedules = lookup.list_schedules().await?;

    Ok(match resolve_schedule(&schedules, namespace) {
        Some(ws) => PodDecision::Inject {
            schedule: ws.name_any(),
            active: ws.persisted_active(),
        },
        None => PodDecision::Skip("no schedule targets namespace"),
    })
}

fn upsert_env(container: &mut Container, value: &str) {
    let env = container.env.get_or_insert_with(Vec::new);
    match env.iter_mut().find(|e| e.name == ACTIVE_ENV_VAR) {
        Some(existing) => {
            existing.value = Some(value.to_string());
            existing.value_from = None;
        }
        None => env.push(EnvVar {
            name: ACTIVE_ENV_VAR.to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        }),
    }
}

/// Apply the active label and env var to a pod in place
pub fn mutate_pod(pod: &mut Pod, active: bool) {
    let value = if active { "true" } else { "false" };

    pod.labels_mut()
        .insert(ACTIVE_LABEL.to_string(), value.to_string());

    if let Some(spec) = pod.spec.as_mut() {
        for container in spec.containers.iter_mut() {
            upsert_env(container, value);
        }
        for container in spec.init_containers.iter_mut().flatten() {
            upsert_env(container, value);
        }
    }
}

/// JSON patch turning `pod` into its mutated form
pub fn build_patch(pod: &Pod, active: bool) -> Result<json_patch::Patch, WebhookError> {
    let mut mutated = pod.clone();
    mutate_pod(&mut mutated, active);

    let before = serde_json::to_value(pod)?;
    let after = serde_json::to_value(&mutated)?;
    Ok(json_patch::diff(&before, &after))
}

/// Outcome label for metrics
fn outcome_label(result: &Result<PodDecision, WebhookError>) -> &'static str {
    match result {
        Ok(PodDecision::Inject { .. }) => "mutated",
        Ok(PodDecision::Skip(_)) => "skipped",
        Err(_) => "error",
    }
}

/// Handle one admission request; never denies
pub async fn admit(state: &WebhookState, req: &AdmissionRequest<Pod>) -> AdmissionResponse {
    let allowed = AdmissionResponse::from(req);

    let Some(pod) = req.object.as_ref() else {
        return allowed;
    };

    // Pods created via a controller often have no namespace in the object yet
    let namespace = pod
        .metadata
        .namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .or(req.namespace.as_deref());
    let pod_name = pod
        .metadata
        .name
        .clone()
        .or_else(|| pod.metadata.generate_name.clone())
        .unwrap_or_default();

    let decision = decide(state.lookup.as_ref(), namespace).await;
    state.metrics.record_pod_mutation(outcome_label(&decision));

    let (schedule, active) = match decision {
        Ok(PodDecision::Inject { schedule, active }) => (schedule, active),
        Ok(PodDecision::Skip(reason)) => {
            info!(pod = %pod_name, namespace = ?namespace, reason, "Skipping pod mutation");
            return allowed;
        }
        Err(e) => {
            // Never block pod creation on our own failures
            warn!(error = %e, pod = %pod_name, "Pod mutation failed, admitting unchanged");
            return allowed;
        }
    };

    let patch = match build_patch(pod, active) {
        Ok(patch) => patch,
        Err(e) => {
            warn!(error = %e, pod = %pod_name, "Failed to build pod patch");
            return allowed;
        }
    };

    match allowed.with_patch(patch) {
        Ok(response) => {
            info!(
                pod = %pod_name,
                namespace = ?namespace,
                schedule = %schedule,
                active,
                "Mutated pod"
            );
            response
        }
        Err(e) => {
            warn!(error = %e, pod = %pod_name, "Failed to attach pod patch");
            AdmissionResponse::from(req)
        }
    }
}

/// Allowed response for a review that cannot be read as a pod request
///
/// Echoes the request uid when one is present so the API server can still
/// match the answer.
fn allow_unreadable(body: &serde_json::Value, reason: &str) -> AdmissionResponse {
    let mut response = AdmissionResponse::invalid(reason);
    response.types = TypeMeta {
        api_version: ADMISSION_API_VERSION.to_string(),
        kind: "AdmissionReview".to_string(),
    };
    response.uid = body
        .pointer("/request/uid")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();
    response.allowed = true;
    response.result = Status::success();
    response
}

/// Axum handler for `POST /mutate--v1-pod`
///
/// The body is taken as raw JSON so that a review which fails to decode is
/// still admitted instead of rejected by the extractor.
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<serde_json::Value>,
) -> Json<AdmissionReview<DynamicObject>> {
    let review: AdmissionReview<Pod> = match serde_json::from_value(body.clone()) {
        Ok(review) => review,
        Err(e) => {
            warn!(error = %e, "Undecodable admission review, admitting unchanged");
            return Json(allow_unreadable(&body, &e.to_string()).into_review());
        }
    };

    let req: AdmissionRequest<Pod> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            warn!(error = %e, "Admission review without request, admitting unchanged");
            return Json(allow_unreadable(&body, &e.to_string()).into_review());
        }
    };

    Json(admit(&state, &req).await.into_review())
}

#[cfg(test)]
#[path = "pod_test.rs"]
mod tests;
