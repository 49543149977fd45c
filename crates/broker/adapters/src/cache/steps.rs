//! Cache pipeline steps

use super::template::cache_template;
use super::{CacheDetails, CacheSecureDetails};
use crate::common::{
    deployment_name, plan_for, recorded_deployments, request_for, resource_name, PlanTable,
};
use async_trait::async_trait;
use broker_deployment::{DeploymentEngine, DeploymentOutputs};
use broker_pipeline::{Step, StepContext, StepError, StepOutput};
use broker_types::{Instance, Plan};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

const SKU_KEYS: [&str; 3] = ["skuName", "skuFamily", "skuCapacity"];

fn decode(instance: &Instance) -> Result<(CacheDetails, CacheSecureDetails), StepError> {
    Ok((instance.details.decode()?, instance.secure_details.decode()?))
}

fn template_parameters(
    instance: &Instance,
    plan: &Plan,
    details: &CacheDetails,
) -> Result<Map<String, Value>, StepError> {
    let mut parameters = Map::new();
    parameters.insert("cacheName".to_string(), json!(details.cache_name));
    parameters.insert("location".to_string(), json!(instance.location));
    parameters.insert("enableNonSslPort".to_string(), json!(false));
    for key in SKU_KEYS {
        let value = plan.extended.get(key).ok_or_else(|| {
            StepError::Precondition(format!("plan {} has no {key}", plan.id))
        })?;
        parameters.insert(key.to_string(), value.clone());
    }
    Ok(parameters)
}

fn apply_outputs(
    outputs: &DeploymentOutputs,
    details: &mut CacheDetails,
    secure: &mut CacheSecureDetails,
) -> Result<(), StepError> {
    details.host_name = Some(outputs.require_str("hostName")?.to_string());
    details.ssl_port = outputs
        .get("sslPort")
        .and_then(Value::as_u64)
        .and_then(|port| u16::try_from(port).ok());
    secure.primary_key = Some(outputs.require_str("primaryKey")?.to_string());
    Ok(())
}

/// Chooses the cache and deployment names
pub(super) struct Preprocess;

#[async_trait]
impl Step for Preprocess {
    fn name(&self) -> &str {
        "preprocess"
    }

    async fn execute(&self, _ctx: &StepContext, instance: &Instance) -> Result<StepOutput, StepError> {
        let (mut details, secure) = decode(instance)?;

        if details.deployment_name.is_empty() {
            details.deployment_name = deployment_name("cache");
            details.cache_name = resource_name(&instance.parameters, "cacheName", "redis");
        }
        debug!(cache = %details.cache_name, deployment = %details.deployment_name, "Cache names chosen");

        Ok(StepOutput::typed(&details, &secure)?)
    }
}

/// Deploys the cache and records its endpoint and key
pub(super) struct DeployCache {
    engine: DeploymentEngine,
    plans: PlanTable,
}

impl DeployCache {
    pub(super) fn new(engine: DeploymentEngine, plans: PlanTable) -> Self {
        Self { engine, plans }
    }
}

#[async_trait]
impl Step for DeployCache {
    fn name(&self) -> &str {
        "deploy-cache"
    }

    async fn execute(&self, ctx: &StepContext, instance: &Instance) -> Result<StepOutput, StepError> {
        let (mut details, mut secure) = decode(instance)?;
        if details.deployment_name.is_empty() {
            return Err(StepError::Precondition(
                "cache deployment name was never chosen".to_string(),
            ));
        }

        let plan = plan_for(&self.plans, instance)?;
        let parameters = template_parameters(instance, plan, &details)?;
        let request = request_for(instance, &details.deployment_name, cache_template()?, parameters);

        let outputs = self.engine.deploy(&request, ctx.cancel()).await?;
        apply_outputs(&outputs, &mut details, &mut secure)?;
        info!(cache = %details.cache_name, "Cache deployed");

        Ok(StepOutput::typed(&details, &secure)?)
    }
}

/// Picks a fresh deployment name for the update
pub(super) struct PrepareUpdate;

#[async_trait]
impl Step for PrepareUpdate {
    fn name(&self) -> &str {
        "prepare-update"
    }

    async fn execute(&self, _ctx: &StepContext, instance: &Instance) -> Result<StepOutput, StepError> {
        let (mut details, secure) = decode(instance)?;
        if details.cache_name.is_empty() {
            return Err(StepError::Precondition(format!(
                "cache {} was never provisioned",
                instance.id
            )));
        }

        // A failed update's deployment is terminal, so every update gets its own
        let name = deployment_name("cache-update");
        details.update_deployments.push(name.clone());
        details.update_deployment_name = Some(name);
        Ok(StepOutput::typed(&details, &secure)?)
    }
}

/// Redeploys the cache with the instance's current plan
pub(super) struct DeployUpdate {
    engine: DeploymentEngine,
    plans: PlanTable,
}

impl DeployUpdate {
    pub(super) fn new(engine: DeploymentEngine, plans: PlanTable) -> Self {
        Self { engine, plans }
    }
}

#[async_trait]
impl Step for DeployUpdate {
    fn name(&self) -> &str {
        "deploy-update"
    }

    async fn execute(&self, ctx: &StepContext, instance: &Instance) -> Result<StepOutput, StepError> {
        let (mut details, mut secure) = decode(instance)?;
        let Some(name) = details.update_deployment_name.clone() else {
            return Err(StepError::Precondition(
                "no update deployment name recorded".to_string(),
            ));
        };

        let plan = plan_for(&self.plans, instance)?;
        let parameters = template_parameters(instance, plan, &details)?;
        let request = request_for(instance, &name, cache_template()?, parameters);

        let outputs = self.engine.deploy(&request, ctx.cancel()).await?;
        apply_outputs(&outputs, &mut details, &mut secure)?;
        details.update_deployment_name = None;
        info!(cache = %details.cache_name, plan = %plan.id, "Cache updated");

        Ok(StepOutput::typed(&details, &secure)?)
    }
}

/// Deletes every deployment the instance recorded; tolerates none
pub(super) struct DeleteDeployments {
    engine: DeploymentEngine,
}

impl DeleteDeployments {
    pub(super) fn new(engine: DeploymentEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Step for DeleteDeployments {
    fn name(&self) -> &str {
        "delete-deployments"
    }

    async fn execute(&self, ctx: &StepContext, instance: &Instance) -> Result<StepOutput, StepError> {
        let (details, _) = decode(instance)?;

        let names = recorded_deployments(
            &details.deployment_name,
            &details.update_deployments,
            details.update_deployment_name.as_deref(),
        );
        for name in &names {
            self.engine
                .delete(name, &instance.resource_group, ctx.cancel())
                .await?;
        }
        debug!(deleted = names.len(), "Cache deployments deleted");

        Ok(StepOutput::unchanged(instance))
    }
}
