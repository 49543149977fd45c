//! Lifecycle requests

use broker_types::{InstanceId, Parameters, PlanId, ServiceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where instances land when a request does not say
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementDefaults {
    #[serde(default = "default_location")]
    pub location: String,

    #[serde(default = "default_resource_group")]
    pub resource_group: String,
}

fn default_location() -> String {
    "eastus".to_string()
}

fn default_resource_group() -> String {
    "stratus-instances".to_string()
}

impl Default for PlacementDefaults {
    fn default() -> Self {
        Self {
            location: default_location(),
            resource_group: default_resource_group(),
        }
    }
}

/// Request to provision a new instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub instance_id: InstanceId,
    pub service_id: ServiceId,
    pub plan_id: PlanId,

    /// Defaults to the parent's, then to the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default)]
    pub parameters: Parameters,

    #[serde(default)]
    pub secure_parameters: Parameters,

    /// Required exactly when the service nests inside a parent service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<InstanceId>,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl ProvisionRequest {
    pub fn new(
        instance_id: impl Into<String>,
        service_id: impl Into<String>,
        plan_id: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: InstanceId::new(instance_id),
            service_id: ServiceId::new(service_id),
            plan_id: PlanId::new(plan_id),
            resource_group: None,
            location: None,
            parameters: Parameters::new(),
            secure_parameters: Parameters::new(),
            parent_id: None,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_resource_group(mut self, resource_group: impl Into<String>) -> Self {
        self.resource_group = Some(resource_group.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
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

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(InstanceId::new(parent_id));
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Request to change an instance's plan or parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// New plan within the same service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<PlanId>,

    /// Replaces the instance's parameters when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_parameters: Option<Parameters>,
}

impl UpdateRequest {
    pub fn plan(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: Some(PlanId::new(plan_id)),
            ..Default::default()
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }
}
