//! In-memory fakes shared by unit tests

#![allow(clippy::unwrap_used)]

use crate::controller::cluster::{ScheduleStore, WorkloadApi};
use crate::controller::time_source::{TimeError, TimeSnapshot, TimeSource};
use crate::crd::schedule::{WorkloadSchedule, WorkloadScheduleSpec, WorkloadScheduleStatus};
use crate::webhook::ScheduleLookup;
use async_trait::async_trait;
use chrono::DateTime;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::ObjectMeta;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// Build an API error with the given HTTP code
pub fn api_error(code: u16) -> kube::Error {
    kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("fake error {}", code),
        reason: "Fake".to_string(),
        code,
    })
}

/// Kubernetes timestamp from an RFC3339 string
pub fn timestamp(rfc3339: &str) -> Time {
    serde_json::from_value(serde_json::json!(rfc3339)).unwrap()
}

/// Schedule in namespace "default" targeting `target_namespace/web` with 3 active replicas
pub fn schedule(name: &str, target_namespace: &str, start_hour: u32, end_hour: u32) -> WorkloadSchedule {
    WorkloadSchedule {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: WorkloadScheduleSpec {
            timezone: "America/Toronto".to_string(),
            start_hour,
            end_hour,
            target_namespace: target_namespace.to_string(),
            target_deployment: "web".to_string(),
            replicas_when_active: 3,
        },
        status: None,
    }
}

/// Schedule with a persisted status carrying the given active flag
pub fn schedule_with_status(name: &str, target_namespace: &str, active: bool) -> WorkloadSchedule {
    let mut ws = schedule(name, target_namespace, 9, 17);
    ws.status = Some(WorkloadScheduleStatus {
        within_active_window: active,
        ..Default::default()
    });
    ws
}

#[derive(Default)]
struct State {
    schedules: HashMap<Key, WorkloadSchedule>,
    deployments: HashMap<Key, Option<i32>>,
    namespaces: HashSet<String>,
}

/// In-memory stand-in for the Kubernetes API
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
    scale_writes: AtomicUsize,
    finalizer_writes: AtomicUsize,
    status_writes: AtomicUsize,
    fail_scale_writes: AtomicBool,
    fail_finalizer_writes: AtomicBool,
    fail_status_writes: AtomicBool,
    fail_namespaces: AtomicBool,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schedule(self, ws: WorkloadSchedule) -> Self {
        let k = key(
            ws.metadata.namespace.as_deref().unwrap(),
            ws.metadata.name.as_deref().unwrap(),
        );
        self.state.lock().unwrap().schedules.insert(k, ws);
        self
    }

    pub fn with_deployment(self, namespace: &str, name: &str, replicas: Option<i32>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.namespaces.insert(namespace.to_string());
            state.deployments.insert(key(namespace, name), replicas);
        }
        self
    }

    pub fn schedule(&self, namespace: &str, name: &str) -> Option<WorkloadSchedule> {
        self.state
            .lock()
            .unwrap()
            .schedules
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn deployment_replicas(&self, namespace: &str, name: &str) -> Option<Option<i32>> {
        self.state
            .lock()
            .unwrap()
            .deployments
            .get(&key(namespace, name))
            .copied()
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.state.lock().unwrap().namespaces.contains(namespace)
    }

    pub fn scale_writes(&self) -> usize {
        self.scale_writes.load(Ordering::SeqCst)
    }

    pub fn finalizer_writes(&self) -> usize {
        self.finalizer_writes.load(Ordering::SeqCst)
    }

    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    pub fn fail_scale_writes(&self) {
        self.fail_scale_writes.store(true, Ordering::SeqCst);
    }

    pub fn fail_finalizer_writes(&self) {
        self.fail_finalizer_writes.store(true, Ordering::SeqCst);
    }

    pub fn fail_status_writes(&self) {
        self.fail_status_writes.store(true, Ordering::SeqCst);
    }

    pub fn fail_namespaces(&self) {
        self.fail_namespaces.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScheduleStore for FakeCluster {
    async fn get_schedule(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkloadSchedule>, kube::Error> {
        Ok(self.schedule(namespace, name))
    }

    async fn set_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), kube::Error> {
        if self.fail_finalizer_writes.load(Ordering::SeqCst) {
            return Err(api_error(409));
        }
        self.finalizer_writes.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        let k = key(namespace, name);
        let ws = state.schedules.get_mut(&k).ok_or_else(|| api_error(404))?;
        ws.metadata.finalizers = Some(finalizers);
        Ok(())
    }

    async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        status: &WorkloadScheduleStatus,
    ) -> Result<(), kube::Error> {
        if self.fail_status_writes.load(Ordering::SeqCst) {
            return Err(api_error(500));
        }
        self.status_writes.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        let ws = state
            .schedules
            .get_mut(&key(namespace, name))
            .ok_or_else(|| api_error(404))?;
        ws.status = Some(status.clone());
        Ok(())
    }
}

#[async_trait]
impl WorkloadApi for FakeCluster {
    async fn ensure_namespace(&self, namespace: &str) -> Result<(), kube::Error> {
        if self.fail_namespaces.load(Ordering::SeqCst) {
            return Err(api_error(403));
        }
        self.state
            .lock()
            .unwrap()
            .namespaces
            .insert(namespace.to_string());
        Ok(())
    }

    async fn get_replicas(&self, namespace: &str, name: &str) -> Result<Option<i32>, kube::Error> {
        self.deployment_replicas(namespace, name)
            .ok_or_else(|| api_error(404))
    }

    async fn set_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<(), kube::Error> {
        if self.fail_scale_writes.load(Ordering::SeqCst) {
            return Err(api_error(409));
        }
        self.scale_writes.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        let slot = state
            .deployments
            .get_mut(&key(namespace, name))
            .ok_or_else(|| api_error(404))?;
        *slot = Some(replicas);
        Ok(())
    }
}

/// Time source returning a fixed local hour (Toronto offset) or a fixed error status
pub struct FixedTime {
    hour: Mutex<Result<u32, u16>>,
    calls: AtomicUsize,
}

impl FixedTime {
    pub fn at_hour(hour: u32) -> Self {
        Self {
            hour: Mutex::new(Ok(hour)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            hour: Mutex::new(Err(status)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_hour(&self, hour: u32) {
        *self.hour.lock().unwrap() = Ok(hour);
    }

    pub fn set_failing(&self, status: u16) {
        *self.hour.lock().unwrap() = Err(status);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimeSource for FixedTime {
    async fn current_time(&self, timezone: &str) -> Result<TimeSnapshot, TimeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hour = (*self.hour.lock().unwrap()).map_err(TimeError::Status)?;

        let local =
            DateTime::parse_from_rfc3339(&format!("2025-03-10T{:02}:30:00-04:00", hour)).unwrap();
        Ok(TimeSnapshot {
            timezone: timezone.to_string(),
            local,
            utc_datetime: local.with_timezone(&chrono::Utc).to_rfc3339(),
            utc_offset: "-04:00".to_string(),
        })
    }
}

/// Fixed schedule listing for the webhook, optionally failing
pub struct StaticSchedules {
    schedules: Result<Vec<Arc<WorkloadSchedule>>, u16>,
    calls: AtomicUsize,
}

impl StaticSchedules {
    pub fn new(schedules: Vec<WorkloadSchedule>) -> Self {
        Self {
            schedules: Ok(schedules.into_iter().map(Arc::new).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(code: u16) -> Self {
        Self {
            schedules: Err(code),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScheduleLookup for StaticSchedules {
    async fn list_schedules(&self) -> Result<Vec<Arc<WorkloadSchedule>>, kube::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.schedules.clone().map_err(api_error)
    }
}
