//! Idempotent deployment engine
//!
//! The remote deployment record is the only idempotency token. Every call to
//! [`DeploymentEngine::deploy`] starts by probing it:
//!
//! | probed status | action                                               |
//! |---------------|------------------------------------------------------|
//! | NotFound      | ensure resource group, submit, wait for completion   |
//! | Running       | poll until it settles                                |
//! | Succeeded     | return outputs, no side effect                       |
//! | Failed        | terminal error; retry needs a new deployment name    |
//! | Unknown       | terminal error                                       |
//!
//! A step that crashed after submitting therefore converges to polling on
//! re-run instead of submitting a second time.

use crate::api::{DeploymentMode, DeploymentProperties, ResourceManager};
use crate::error::{DeploymentError, Result};
use crate::probe::{probe, DeploymentStatus, ProbeResult};
use crate::template::{provider_parameters, DeploymentOutputs, DeploymentTemplate};
use crate::wait::{bounded, WaitError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Engine timing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bound on resource-group creation plus deployment submission
    #[serde(default = "default_timeout_secs")]
    pub submit_timeout_secs: u64,

    /// Bound on polling a deployment that is still running
    #[serde(default = "default_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Delay between polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Bound on deleting a deployment
    #[serde(default = "default_timeout_secs")]
    pub delete_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            submit_timeout_secs: default_timeout_secs(),
            poll_timeout_secs: default_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            delete_timeout_secs: default_timeout_secs(),
        }
    }
}

impl EngineConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    /// Never shorter than one second
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    20 * 60
}

fn default_poll_interval_secs() -> u64 {
    10
}

/// Everything needed to create one deployment
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    /// Deployment name; together with the resource group, the idempotency token
    pub name: String,

    pub resource_group: String,

    /// Location used if the resource group has to be created
    pub location: String,

    pub template: DeploymentTemplate,

    /// Plain template parameters, wrapped into provider form on submission
    pub parameters: Map<String, Value>,

    /// Tags applied to the resource group
    pub tags: BTreeMap<String, String>,
}

impl DeploymentRequest {
    pub fn new(
        name: impl Into<String>,
        resource_group: impl Into<String>,
        location: impl Into<String>,
        template: DeploymentTemplate,
    ) -> Self {
        Self {
            name: name.into(),
            resource_group: resource_group.into(),
            location: location.into(),
            template,
            parameters: Map::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Drives deployments to a terminal state without ever submitting twice
#[derive(Clone)]
pub struct DeploymentEngine {
    api: Arc<dyn ResourceManager>,
    config: EngineConfig,
}

impl DeploymentEngine {
    pub fn new(api: Arc<dyn ResourceManager>, config: EngineConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Probe a deployment's status
    pub async fn probe(&self, deployment: &str, resource_group: &str) -> Result<ProbeResult> {
        probe(self.api.as_ref(), deployment, resource_group).await
    }

    /// Create a deployment, or converge on the one that already exists
    #[instrument(
        skip(self, request, cancel),
        fields(deployment = %request.name, resource_group = %request.resource_group)
    )]
    pub async fn deploy(
        &self,
        request: &DeploymentRequest,
        cancel: &CancellationToken,
    ) -> Result<DeploymentOutputs> {
        let current = self.probe(&request.name, &request.resource_group).await?;
        debug!(status = %current.status, "Probed deployment");

        let settled = match current.status {
            DeploymentStatus::NotFound => {
                let submitted = self.submit(request, cancel).await?;
                if submitted.status == DeploymentStatus::Running {
                    self.poll_until_settled(&request.name, &request.resource_group, cancel)
                        .await?
                } else {
                    submitted
                }
            }
            DeploymentStatus::Running => {
                info!("Deployment already running; polling instead of resubmitting");
                self.poll_until_settled(&request.name, &request.resource_group, cancel)
                    .await?
            }
            DeploymentStatus::Succeeded => {
                debug!("Deployment already succeeded");
                current
            }
            DeploymentStatus::Failed | DeploymentStatus::Unknown => current,
        };

        conclude(&request.name, &request.resource_group, settled)
    }

    /// Delete a deployment, waiting at most the configured delete timeout.
    ///
    /// A deployment that no longer exists counts as deleted. On timeout the
    /// remote delete may still be in flight.
    #[instrument(skip(self, cancel))]
    pub async fn delete(
        &self,
        deployment: &str,
        resource_group: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let api = self.api.clone();
        let outcome = bounded(self.config.delete_timeout(), cancel, |token| async move {
            match api.delete_deployment(resource_group, deployment, token).await {
                Ok(()) => Ok(()),
                Err(e) if e.is_not_found() => {
                    debug!("Deployment already gone");
                    Ok(())
                }
                Err(source) => Err(DeploymentError::Api {
                    operation: "delete",
                    deployment: deployment.to_string(),
                    resource_group: resource_group.to_string(),
                    source,
                }),
            }
        })
        .await;

        outcome.map_err(|e| interrupted("delete", deployment, resource_group, e))?;
        info!("Deployment deleted");
        Ok(())
    }

    async fn submit(
        &self,
        request: &DeploymentRequest,
        cancel: &CancellationToken,
    ) -> Result<ProbeResult> {
        info!(location = %request.location, "Submitting new deployment");

        let api = self.api.clone();
        let properties = DeploymentProperties {
            template: request.template.as_value().clone(),
            parameters: provider_parameters(&request.parameters),
            mode: DeploymentMode::Incremental,
        };
        let api_error = |operation: &'static str| {
            move |source| DeploymentError::Api {
                operation,
                deployment: request.name.clone(),
                resource_group: request.resource_group.clone(),
                source,
            }
        };

        let outcome = bounded(self.config.submit_timeout(), cancel, |token| async move {
            api.create_or_update_resource_group(
                &request.resource_group,
                &request.location,
                &request.tags,
            )
            .await
            .map_err(api_error("create resource group"))?;

            api.create_deployment(&request.resource_group, &request.name, properties, token)
                .await
                .map_err(api_error("submit"))
        })
        .await;

        let remote = outcome
            .map_err(|e| interrupted("submit", &request.name, &request.resource_group, e))?;
        Ok(ProbeResult {
            status: DeploymentStatus::from_provisioning_state(&remote.provisioning_state),
            deployment: Some(remote),
        })
    }

    async fn poll_until_settled(
        &self,
        deployment: &str,
        resource_group: &str,
        cancel: &CancellationToken,
    ) -> Result<ProbeResult> {
        let interval = self.config.poll_interval();

        let outcome = bounded(self.config.poll_timeout(), cancel, |_| async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let current = self.probe(deployment, resource_group).await?;
                match current.status {
                    DeploymentStatus::Running => debug!("Deployment still running"),
                    DeploymentStatus::NotFound => {
                        return Err(DeploymentError::Vanished {
                            deployment: deployment.to_string(),
                            resource_group: resource_group.to_string(),
                        });
                    }
                    _ => return Ok(current),
                }
            }
        })
        .await;

        outcome.map_err(|e| interrupted("poll", deployment, resource_group, e))
    }
}

/// Turn a settled probe into outputs or a terminal error
fn conclude(
    deployment: &str,
    resource_group: &str,
    settled: ProbeResult,
) -> Result<DeploymentOutputs> {
    match (settled.status, settled.deployment) {
        (DeploymentStatus::Succeeded, Some(remote)) => {
            info!("Deployment succeeded");
            Ok(DeploymentOutputs::from_provider(deployment, &remote.outputs))
        }
        (DeploymentStatus::Failed, remote) => {
            warn!("Deployment failed");
            Err(DeploymentError::Failed {
                deployment: deployment.to_string(),
                resource_group: resource_group.to_string(),
                state: remote
                    .map(|r| r.provisioning_state)
                    .unwrap_or_else(|| "Failed".to_string()),
            })
        }
        (DeploymentStatus::NotFound, _) | (DeploymentStatus::Succeeded, None) => {
            Err(DeploymentError::Vanished {
                deployment: deployment.to_string(),
                resource_group: resource_group.to_string(),
            })
        }
        (DeploymentStatus::Running | DeploymentStatus::Unknown, remote) => {
            let state = remote.map(|r| r.provisioning_state).unwrap_or_default();
            warn!(state = %state, "Deployment in unrecognized state");
            Err(DeploymentError::UnknownState {
                deployment: deployment.to_string(),
                resource_group: resource_group.to_string(),
                state,
            })
        }
    }
}

fn interrupted(
    operation: &'static str,
    deployment: &str,
    resource_group: &str,
    error: WaitError<DeploymentError>,
) -> DeploymentError {
    match error {
        WaitError::Failed(e) => e,
        WaitError::TimedOut(after) => {
            warn!(operation, ?after, "Timed out; remote outcome unknown");
            DeploymentError::Timeout {
                operation,
                deployment: deployment.to_string(),
                resource_group: resource_group.to_string(),
                after,
            }
        }
        WaitError::Cancelled => DeploymentError::Cancelled {
            operation,
            deployment: deployment.to_string(),
            resource_group: resource_group.to_string(),
        },
    }
}
