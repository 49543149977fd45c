//! Resource manager seam
//!
//! Abstracts the cloud provider's asynchronous declarative deployment API so
//! the engine can be driven by a real client or by
//! [`InMemoryResourceManager`](crate::InMemoryResourceManager).

use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// A deployment record as reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDeployment {
    pub name: String,

    pub resource_group: String,

    /// Provider state string ("Running", "Succeeded", "Failed", ...)
    pub provisioning_state: String,

    /// Provider-form outputs: `{key: {type, value}}`
    #[serde(default)]
    pub outputs: Map<String, Value>,
}

/// Body of a deployment submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentProperties {
    /// Template document
    pub template: Value,

    /// Provider-form parameters: `{name: {value}}`
    pub parameters: Value,

    /// Deployment mode; the broker always deploys incrementally
    pub mode: DeploymentMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentMode {
    Incremental,
    Complete,
}

/// The provider's deployment API
#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Look up a deployment; [`ApiError::NotFound`] when it does not exist
    async fn get_deployment(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<RemoteDeployment, ApiError>;

    /// Create the resource group, or update it in place
    async fn create_or_update_resource_group(
        &self,
        name: &str,
        location: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), ApiError>;

    /// Submit a deployment and wait for the provider's long-running operation.
    ///
    /// Implementations must stop waiting once `cancel` fires.
    async fn create_deployment(
        &self,
        resource_group: &str,
        name: &str,
        properties: DeploymentProperties,
        cancel: CancellationToken,
    ) -> Result<RemoteDeployment, ApiError>;

    /// Delete a deployment and wait for the provider's long-running operation
    async fn delete_deployment(
        &self,
        resource_group: &str,
        name: &str,
        cancel: CancellationToken,
    ) -> Result<(), ApiError>;
}
