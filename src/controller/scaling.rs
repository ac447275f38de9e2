//! Converges a Deployment's replica count toward a desired value
//!
//! Idempotent: when the current count already matches, no write is issued.

use super::cluster::{is_not_found, WorkloadApi};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("deployment {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("failed to get deployment: {0}")]
    Read(kube::Error),

    #[error("failed to scale deployment: {source}")]
    Write {
        source: kube::Error,
        /// Replica count before the failed write
        observed: i32,
    },
}

impl ScaleError {
    /// Action description matching the failure, for logging
    pub fn action(&self) -> &'static str {
        match self {
            ScaleError::NotFound { .. } => "deployment not found",
            ScaleError::Read(_) => "error",
            ScaleError::Write { .. } => "scale failed",
        }
    }

    /// Replica count known at the time of failure
    pub fn observed_replicas(&self) -> i32 {
        match self {
            ScaleError::Write { observed, .. } => *observed,
            _ => 0,
        }
    }
}

/// Result of a successful scaling pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleOutcome {
    /// Human-readable description of what happened
    pub action: String,
    /// Replica count after this pass
    pub replicas: i32,
}

/// Scale `namespace/name` to `desired` replicas
pub async fn scale_deployment(
    api: &dyn WorkloadApi,
    namespace: &str,
    name: &str,
    desired: i32,
) -> Result<ScaleOutcome, ScaleError> {
    let current = match api.get_replicas(namespace, name).await {
        Ok(replicas) => replicas.unwrap_or(0),
        Err(e) if is_not_found(&e) => {
            return Err(ScaleError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
        }
        Err(e) => return Err(ScaleError::Read(e)),
    };

    if current == desired {
        return Ok(ScaleOutcome {
            action: format!("no change needed (replicas={})", desired),
            replicas: desired,
        });
    }

    info!(
        namespace = %namespace,
        deployment = %name,
        from = current,
        to = desired,
        "Scaling deployment"
    );

    api.set_replicas(namespace, name, desired)
        .await
        .map_err(|source| ScaleError::Write {
            source,
            observed: current,
        })?;

    Ok(ScaleOutcome {
        action: format!("scaled from {} to {}", current, desired),
        replicas: desired,
    })
}
