//! Redis cache adapter
//!
//! A single, non-nested service. Bindings share the cache's access key, so
//! bind and unbind have nothing to create remotely.

mod steps;
mod template;

use crate::common::{plan_table, PlanTable};
use async_trait::async_trait;
use broker_deployment::DeploymentEngine;
use broker_pipeline::{Pipeline, StepOutput};
use broker_registry::{AdapterError, BindContext, Credentials, ServiceAdapter};
use broker_types::{Binding, Instance, Parameters, PipelineKind, Plan, Service, ServiceId, TypedDetails};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use steps::{DeleteDeployments, DeployCache, DeployUpdate, Preprocess, PrepareUpdate};

pub const SERVICE_ID: &str = "redis-cache";
pub const BASIC_PLAN_ID: &str = "redis-cache-basic";
pub const STANDARD_PLAN_ID: &str = "redis-cache-standard";

/// Non-sensitive cache state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheDetails {
    /// Deployment that created the cache; empty until preprocessing ran
    #[serde(default)]
    pub deployment_name: String,

    #[serde(default)]
    pub cache_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_port: Option<u16>,

    /// Deployment of the update in flight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_deployment_name: Option<String>,

    /// Every update deployment started, deleted along with the instance
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update_deployments: Vec<String>,
}

impl TypedDetails for CacheDetails {
    const KIND: &'static str = "redis-cache";
    const VERSION: u32 = 1;
}

/// Sensitive cache state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSecureDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
}

impl TypedDetails for CacheSecureDetails {
    const KIND: &'static str = "redis-cache-secure";
    const VERSION: u32 = 1;
}

/// Adapter for the Redis cache service
pub struct CacheAdapter {
    engine: DeploymentEngine,
    plans: PlanTable,
}

impl CacheAdapter {
    pub fn new(engine: DeploymentEngine) -> Self {
        Self {
            engine,
            plans: plan_table(&cache_plans()),
        }
    }

    fn check_service(&self, service: &ServiceId) -> Result<(), AdapterError> {
        if service.as_str() == SERVICE_ID {
            Ok(())
        } else {
            Err(AdapterError::UnknownService {
                adapter: self.name().to_string(),
                service: service.clone(),
            })
        }
    }
}

fn cache_plans() -> Vec<Plan> {
    vec![
        Plan::new(BASIC_PLAN_ID, "basic")
            .with_description("Basic tier, 250 MB, no replication")
            .with_extended("skuName", "Basic")
            .with_extended("skuFamily", "C")
            .with_extended("skuCapacity", 0),
        Plan::new(STANDARD_PLAN_ID, "standard")
            .with_description("Standard tier, 1 GB, replicated")
            .paid()
            .with_extended("skuName", "Standard")
            .with_extended("skuFamily", "C")
            .with_extended("skuCapacity", 1),
    ]
}

#[async_trait]
impl ServiceAdapter for CacheAdapter {
    fn name(&self) -> &str {
        "cache"
    }

    fn services(&self) -> Vec<Service> {
        let service = Service::new(SERVICE_ID, "redis-cache")
            .with_description("Managed Redis cache")
            .bindable()
            .with_tag("redis")
            .with_tag("cache");
        vec![cache_plans().into_iter().fold(service, Service::with_plan)]
    }

    fn pipeline(&self, service: &ServiceId, kind: PipelineKind) -> Result<Pipeline, AdapterError> {
        self.check_service(service)?;

        let pipeline = match kind {
            PipelineKind::Provision => Pipeline::builder(kind)
                .step(Preprocess)
                .step(DeployCache::new(self.engine.clone(), self.plans.clone())),
            PipelineKind::Update => Pipeline::builder(kind)
                .step(PrepareUpdate)
                .step(DeployUpdate::new(self.engine.clone(), self.plans.clone())),
            PipelineKind::Deprovision => {
                Pipeline::builder(kind).step(DeleteDeployments::new(self.engine.clone()))
            }
        };
        Ok(pipeline.build()?)
    }

    fn validate_parameters(
        &self,
        _service: &Service,
        _plan: &Plan,
        parameters: &Parameters,
    ) -> Result<(), AdapterError> {
        match parameters.get("cacheName") {
            None => Ok(()),
            Some(Value::String(name))
                if !name.is_empty()
                    && name.len() <= 63
                    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') =>
            {
                Ok(())
            }
            Some(other) => Err(AdapterError::InvalidParameters(format!(
                "cacheName must be 1-63 letters, digits or hyphens, got {other}"
            ))),
        }
    }

    async fn bind(
        &self,
        _ctx: &BindContext,
        instance: &Instance,
        _binding: &Binding,
    ) -> Result<StepOutput, AdapterError> {
        let details: CacheDetails = instance.details.decode()?;
        if details.host_name.is_none() {
            return Err(AdapterError::NotReady(format!(
                "cache {} has not finished provisioning",
                instance.id
            )));
        }
        Ok(StepOutput::default())
    }

    async fn unbind(
        &self,
        _ctx: &BindContext,
        _instance: &Instance,
        _binding: &Binding,
    ) -> Result<(), AdapterError> {
        Ok(())
    }

    fn credentials(
        &self,
        instance: &Instance,
        _binding: &Binding,
    ) -> Result<Credentials, AdapterError> {
        let details: CacheDetails = instance.details.decode()?;
        let secure: CacheSecureDetails = instance.secure_details.decode()?;

        let (Some(host), Some(port), Some(password)) =
            (details.host_name, details.ssl_port, secure.primary_key)
        else {
            return Err(AdapterError::NotReady(format!(
                "cache {} has no connection details yet",
                instance.id
            )));
        };

        let mut credentials = Credentials::new();
        credentials.insert("uri".to_string(), json!(format!("rediss://:{password}@{host}:{port}")));
        credentials.insert("host".to_string(), json!(host));
        credentials.insert("port".to_string(), json!(port));
        credentials.insert("password".to_string(), json!(password));
        Ok(credentials)
    }
}

impl std::fmt::Debug for CacheAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheAdapter")
            .field("plans", &self.plans.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_deployment::{EngineConfig, InMemoryResourceManager};
    use broker_types::{BindingId, DetailsDocument, InstanceId, PlanId};
    use std::sync::Arc;

    fn names(pipeline: Pipeline) -> Vec<String> {
        pipeline.step_names().map(str::to_string).collect()
    }

    fn adapter() -> CacheAdapter {
        let engine = DeploymentEngine::new(
            Arc::new(InMemoryResourceManager::new()),
            EngineConfig::default(),
        );
        CacheAdapter::new(engine)
    }

    fn instance() -> Instance {
        Instance::new(
            InstanceId::new("c-1"),
            ServiceId::new(SERVICE_ID),
            PlanId::new(BASIC_PLAN_ID),
        )
    }

    #[test]
    fn test_pipelines_declare_steps_in_order() {
        let adapter = adapter();
        let id = ServiceId::new(SERVICE_ID);
        assert_eq!(
            names(adapter.provisioner(&id).unwrap()),
            vec!["preprocess", "deploy-cache"]
        );
        assert_eq!(
            names(adapter.updater(&id).unwrap()),
            vec!["prepare-update", "deploy-update"]
        );
        assert_eq!(
            names(adapter.deprovisioner(&id).unwrap()),
            vec!["delete-deployments"]
        );
        assert!(matches!(
            adapter.provisioner(&ServiceId::new("sql-server")),
            Err(AdapterError::UnknownService { .. })
        ));
    }

    #[test]
    fn test_cache_name_validation() {
        let adapter = adapter();
        let service = adapter.services().remove(0);
        let plan = service.plans[0].clone();

        let mut params = Parameters::new();
        assert!(adapter.validate_parameters(&service, &plan, &params).is_ok());

        params.insert("cacheName".to_string(), json!("my-cache-1"));
        assert!(adapter.validate_parameters(&service, &plan, &params).is_ok());

        params.insert("cacheName".to_string(), json!("bad name!"));
        assert!(matches!(
            adapter.validate_parameters(&service, &plan, &params),
            Err(AdapterError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_credentials_need_provisioned_details() {
        let adapter = adapter();
        let binding = Binding::new(BindingId::new("b-1"), InstanceId::new("c-1"));
        let mut instance = instance();
        assert!(matches!(
            adapter.credentials(&instance, &binding),
            Err(AdapterError::NotReady(_))
        ));

        instance.details = DetailsDocument::encode(&CacheDetails {
            deployment_name: "cache-1".to_string(),
            cache_name: "redis1".to_string(),
            host_name: Some("redis1.redis.cache.windows.net".to_string()),
            ssl_port: Some(6380),
            update_deployment_name: None,
            update_deployments: Vec::new(),
        })
        .unwrap();
        instance.secure_details = DetailsDocument::encode(&CacheSecureDetails {
            primary_key: Some("k3y".to_string()),
        })
        .unwrap();

        let credentials = adapter.credentials(&instance, &binding).unwrap();
        assert_eq!(credentials["port"], json!(6380));
        assert_eq!(
            credentials["uri"],
            json!("rediss://:k3y@redis1.redis.cache.windows.net:6380")
        );
    }
}
