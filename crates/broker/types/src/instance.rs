//! Service instances and bindings
//!
//! An [`Instance`] is one provisioned resource. Pipelines replace its details
//! wholesale after every step and record the step name in the
//! [`OperationCheckpoint`] so a crashed run can resume where it stopped.

use crate::{BindingId, DetailsDocument, InstanceId, PlanId, ServiceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Free-form request parameters
pub type Parameters = Map<String, Value>;

/// The three lifecycle pipelines an adapter provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    Provision,
    Update,
    Deprovision,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineKind::Provision => f.write_str("provision"),
            PipelineKind::Update => f.write_str("update"),
            PipelineKind::Deprovision => f.write_str("deprovision"),
        }
    }
}

/// Instance lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Provisioner is running or was interrupted
    Provisioning,
    /// Last provisioner step succeeded
    Provisioned,
    /// Updater is running or was interrupted
    Updating,
    /// Deprovisioner is running or was interrupted
    Deprovisioning,
    /// The last pipeline run returned an error; see `status_reason`
    Failed,
}

impl InstanceStatus {
    /// Status while `pipeline` is running or interrupted
    pub fn in_flight(pipeline: PipelineKind) -> Self {
        match pipeline {
            PipelineKind::Provision => InstanceStatus::Provisioning,
            PipelineKind::Update => InstanceStatus::Updating,
            PipelineKind::Deprovision => InstanceStatus::Deprovisioning,
        }
    }

    /// Pipeline that drives an instance out of this status, if any
    pub fn pending_pipeline(&self) -> Option<PipelineKind> {
        match self {
            InstanceStatus::Provisioning => Some(PipelineKind::Provision),
            InstanceStatus::Updating => Some(PipelineKind::Update),
            InstanceStatus::Deprovisioning => Some(PipelineKind::Deprovision),
            InstanceStatus::Provisioned | InstanceStatus::Failed => None,
        }
    }
}

/// Progress marker for the pipeline currently applied to an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCheckpoint {
    /// Which pipeline is being run
    pub pipeline: PipelineKind,

    /// Name of the last step whose result was persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed_step: Option<String>,
}

impl OperationCheckpoint {
    pub fn start(pipeline: PipelineKind) -> Self {
        Self {
            pipeline,
            last_completed_step: None,
        }
    }
}

/// A provisioned resource tracked by the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Immutable, consumer-chosen identifier
    pub id: InstanceId,

    /// Catalog service
    pub service_id: ServiceId,

    /// Catalog plan
    pub plan_id: PlanId,

    /// Cloud resource group holding the instance's resources
    pub resource_group: String,

    /// Cloud region
    pub location: String,

    /// Tags applied to created resources
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Non-sensitive provisioning parameters
    #[serde(default)]
    pub parameters: Parameters,

    /// Sensitive provisioning parameters (encrypted at rest)
    #[serde(default)]
    pub secure_parameters: Parameters,

    /// Adapter-defined, non-sensitive accumulated state
    #[serde(default)]
    pub details: DetailsDocument,

    /// Adapter-defined sensitive state (encrypted at rest)
    #[serde(default)]
    pub secure_details: DetailsDocument,

    /// Instance this one is nested inside (e.g. a database's server)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<InstanceId>,

    /// Lifecycle status
    pub status: InstanceStatus,

    /// Reason for the current status, set when a pipeline fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,

    /// Progress of the pipeline in flight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<OperationCheckpoint>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    /// Create a new instance record awaiting provisioning
    pub fn new(id: InstanceId, service_id: ServiceId, plan_id: PlanId) -> Self {
        let now = Utc::now();
        Self {
            id,
            service_id,
            plan_id,
            resource_group: String::new(),
            location: String::new(),
            tags: BTreeMap::new(),
            parameters: Parameters::new(),
            secure_parameters: Parameters::new(),
            details: DetailsDocument::empty(),
            secure_details: DetailsDocument::empty(),
            parent_id: None,
            status: InstanceStatus::Provisioning,
            status_reason: None,
            checkpoint: Some(OperationCheckpoint::start(PipelineKind::Provision)),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_resource_group(mut self, resource_group: impl Into<String>) -> Self {
        self.resource_group = resource_group.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_secure_parameters(mut self, parameters: Parameters) -> Self {
        self.secure_parameters = parameters;
        self
    }

    pub fn with_parent(mut self, parent_id: InstanceId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Look up a non-sensitive string parameter
    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    /// Look up a sensitive string parameter
    pub fn secure_parameter_str(&self, key: &str) -> Option<&str> {
        self.secure_parameters.get(key).and_then(Value::as_str)
    }

    /// Name of the last persisted step of the pipeline in flight
    pub fn last_completed_step(&self) -> Option<&str> {
        self.checkpoint
            .as_ref()
            .and_then(|c| c.last_completed_step.as_deref())
    }

    /// Enter a new pipeline, discarding any previous checkpoint
    pub fn begin(&mut self, pipeline: PipelineKind) {
        self.status = InstanceStatus::in_flight(pipeline);
        self.status_reason = None;
        self.checkpoint = Some(OperationCheckpoint::start(pipeline));
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Credentials granted against an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Identifier, unique within the instance
    pub id: BindingId,

    /// Instance the binding belongs to
    pub instance_id: InstanceId,

    /// Non-sensitive bind parameters
    #[serde(default)]
    pub parameters: Parameters,

    /// Adapter-defined, non-sensitive binding state
    #[serde(default)]
    pub details: DetailsDocument,

    /// Adapter-defined sensitive binding state (encrypted at rest)
    #[serde(default)]
    pub secure_details: DetailsDocument,

    /// Set once the adapter granted what the details describe
    #[serde(default)]
    pub bound: bool,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl Binding {
    pub fn new(id: BindingId, instance_id: InstanceId) -> Self {
        Self {
            id,
            instance_id,
            parameters: Parameters::new(),
            details: DetailsDocument::empty(),
            secure_details: DetailsDocument::empty(),
            bound: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }
}
