//! Deployment state probe
//!
//! A missing deployment is an expected answer, not an error: it is what
//! tells the engine to submit.

use crate::api::{RemoteDeployment, ResourceManager};
use crate::error::{DeploymentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a remote deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    NotFound,
    Running,
    Succeeded,
    Failed,
    /// Any provider state this engine does not recognize
    Unknown,
}

impl DeploymentStatus {
    /// Map a provider state string onto a status
    pub fn from_provisioning_state(state: &str) -> Self {
        match state {
            // The provider reports Accepted before work starts
            "Running" | "Accepted" => DeploymentStatus::Running,
            "Succeeded" => DeploymentStatus::Succeeded,
            "Failed" => DeploymentStatus::Failed,
            _ => DeploymentStatus::Unknown,
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentStatus::NotFound => write!(f, "not-found"),
            DeploymentStatus::Running => write!(f, "running"),
            DeploymentStatus::Succeeded => write!(f, "succeeded"),
            DeploymentStatus::Failed => write!(f, "failed"),
            DeploymentStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of probing a deployment
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub status: DeploymentStatus,

    /// The deployment record, absent when `status` is `NotFound`
    pub deployment: Option<RemoteDeployment>,
}

impl ProbeResult {
    /// Raw provider state, for error reporting
    pub fn provisioning_state(&self) -> &str {
        self.deployment
            .as_ref()
            .map(|d| d.provisioning_state.as_str())
            .unwrap_or("NotFound")
    }
}

/// Look up a deployment and report its status
pub async fn probe(
    api: &dyn ResourceManager,
    deployment: &str,
    resource_group: &str,
) -> Result<ProbeResult> {
    match api.get_deployment(resource_group, deployment).await {
        Ok(remote) => Ok(ProbeResult {
            status: DeploymentStatus::from_provisioning_state(&remote.provisioning_state),
            deployment: Some(remote),
        }),
        Err(e) if e.is_not_found() => Ok(ProbeResult {
            status: DeploymentStatus::NotFound,
            deployment: None,
        }),
        Err(source) => Err(DeploymentError::Api {
            operation: "probe",
            deployment: deployment.to_string(),
            resource_group: resource_group.to_string(),
            source,
        }),
    }
}
