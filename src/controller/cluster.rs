//! Cluster access used by the reconciler
//!
//! Split into the schedule's own object (`ScheduleStore`) and the external
//! workload side (`WorkloadApi`). `KubeCluster` implements both against the
//! Kubernetes API.

use crate::crd::schedule::{WorkloadSchedule, WorkloadScheduleStatus};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::info;

/// Reads and writes WorkloadSchedule objects
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Fetch a schedule; `Ok(None)` if it no longer exists
    async fn get_schedule(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkloadSchedule>, kube::Error>;

    /// Replace the schedule's finalizer list
    async fn set_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), kube::Error>;

    /// Write the status subresource
    async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        status: &WorkloadScheduleStatus,
    ) -> Result<(), kube::Error>;
}

/// Operations on the scaled workload and its namespace
#[async_trait]
pub trait WorkloadApi: Send + Sync {
    /// Create the namespace if it does not exist
    async fn ensure_namespace(&self, namespace: &str) -> Result<(), kube::Error>;

    /// Desired replica count of a Deployment (`None` when unset).
    /// A missing Deployment is reported as an API error with code 404.
    async fn get_replicas(&self, namespace: &str, name: &str) -> Result<Option<i32>, kube::Error>;

    /// Set a Deployment's desired replica count
    async fn set_replicas(&self, namespace: &str, name: &str, replicas: i32)
        -> Result<(), kube::Error>;
}

/// Check whether an API error is a 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}

/// Check whether an API error is a 409 AlreadyExists/Conflict
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 409)
}

/// Kubernetes-backed implementation of both cluster traits
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn schedules(&self, namespace: &str) -> Api<WorkloadSchedule> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ScheduleStore for KubeCluster {
    async fn get_schedule(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkloadSchedule>, kube::Error> {
        self.schedules(namespace).get_opt(name).await
    }

    async fn set_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), kube::Error> {
        let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
        self.schedules(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        status: &WorkloadScheduleStatus,
    ) -> Result<(), kube::Error> {
        let patch = serde_json::json!({ "status": status });
        self.schedules(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl WorkloadApi for KubeCluster {
    async fn ensure_namespace(&self, namespace: &str) -> Result<(), kube::Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());

        if api.get_opt(namespace).await?.is_some() {
            return Ok(());
        }

        info!(namespace = %namespace, "Creating target namespace");
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        match api.create(&PostParams::default(), &ns).await {
            Ok(_) => Ok(()),
            // Created concurrently by someone else
            Err(e) if is_conflict(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn get_replicas(&self, namespace: &str, name: &str) -> Result<Option<i32>, kube::Error> {
        let deployment = self.deployments(namespace).get(name).await?;
        Ok(deployment.spec.and_then(|s| s.replicas))
    }

    async fn set_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<(), kube::Error> {
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });
        self.deployments(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
