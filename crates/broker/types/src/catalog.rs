//! Catalog types
//!
//! Adapters declare the services and plans they offer. The assembled
//! [`Catalog`] is what the broker advertises to platform consumers.

use crate::{PlanId, ServiceId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A service offering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Globally unique service identifier
    pub id: ServiceId,

    /// CLI-friendly name
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Whether instances of this service can be bound
    #[serde(default)]
    pub bindable: bool,

    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Service that instances of this service nest inside, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_service_id: Option<ServiceId>,

    /// Offered plans
    pub plans: Vec<Plan>,
}

impl Service {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ServiceId::new(id),
            name: name.into(),
            description: String::new(),
            bindable: false,
            tags: Vec::new(),
            parent_service_id: None,
            plans: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn bindable(mut self) -> Self {
        self.bindable = true;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_parent(mut self, parent: ServiceId) -> Self {
        self.parent_service_id = Some(parent);
        self
    }

    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.plans.push(plan);
        self
    }

    /// Find a plan of this service by ID
    pub fn plan(&self, plan_id: &PlanId) -> Option<&Plan> {
        self.plans.iter().find(|p| &p.id == plan_id)
    }
}

/// A plan within a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Globally unique plan identifier
    pub id: PlanId,

    /// CLI-friendly name
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Whether the plan is free of charge
    #[serde(default = "default_free")]
    pub free: bool,

    /// Adapter-specific template parameters (tier, sku, capacity, ...)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extended: Map<String, Value>,
}

fn default_free() -> bool {
    true
}

impl Plan {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: PlanId::new(id),
            name: name.into(),
            description: String::new(),
            free: true,
            extended: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn paid(mut self) -> Self {
        self.free = false;
        self
    }

    pub fn with_extended(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extended.insert(key.into(), value.into());
        self
    }

    /// Look up an adapter-specific string parameter
    pub fn extended_str(&self, key: &str) -> Option<&str> {
        self.extended.get(key).and_then(Value::as_str)
    }
}

/// The consolidated set of offered services
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub services: Vec<Service>,
}

impl Catalog {
    pub fn service(&self, id: &ServiceId) -> Option<&Service> {
        self.services.iter().find(|s| &s.id == id)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_lookup() {
        let service = Service::new("svc", "svc")
            .with_plan(Plan::new("p1", "basic").with_extended("sku", "Basic"))
            .with_plan(Plan::new("p2", "standard").paid());

        let basic = service.plan(&PlanId::new("p1")).unwrap();
        assert_eq!(basic.extended_str("sku"), Some("Basic"));
        assert!(!service.plan(&PlanId::new("p2")).unwrap().free);
        assert!(service.plan(&PlanId::new("p3")).is_none());
    }

    #[test]
    fn test_empty_extended_is_not_serialized() {
        let json = serde_json::to_value(Plan::new("p1", "basic")).unwrap();
        assert!(json.get("extended").is_none());
    }
}
