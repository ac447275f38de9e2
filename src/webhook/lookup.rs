//! Where the webhook finds WorkloadSchedules
//!
//! The operator binary hands the webhook the controller's reflector store,
//! a local mirror of the persisted objects kept current by the watch, so
//! admission never lists through the API server.

use crate::crd::schedule::WorkloadSchedule;
use async_trait::async_trait;
use kube::runtime::reflector::Store;
use std::sync::Arc;

#[async_trait]
pub trait ScheduleLookup: Send + Sync {
    /// All known schedules, with whatever status was last persisted
    async fn list_schedules(&self) -> Result<Vec<Arc<WorkloadSchedule>>, kube::Error>;
}

#[async_trait]
impl ScheduleLookup for Store<WorkloadSchedule> {
    async fn list_schedules(&self) -> Result<Vec<Arc<WorkloadSchedule>>, kube::Error> {
        Ok(self.state())
    }
}
