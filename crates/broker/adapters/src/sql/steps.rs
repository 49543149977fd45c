//! SQL pipeline steps
//!
//! Server and database pipelines have the same shape; each step switches on
//! the [`Tier`] it was built for.

use super::template::{database_template, server_template};
use super::{
    DatabaseDetails, DatabaseSecureDetails, ServerDetails, ServerSecureDetails,
    SERVER_SERVICE_ID,
};
use crate::common::{
    deployment_name, ensure_provisioned, generate_password, plan_for, recorded_deployments,
    request_for, resource_name, PlanTable,
};
use async_trait::async_trait;
use broker_deployment::DeploymentEngine;
use broker_pipeline::{Step, StepContext, StepError, StepOutput};
use broker_types::{Instance, Plan};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Tier {
    Server,
    Database,
}

/// Deployment to drive: the original one, or the pending update
fn target_deployment(
    update: bool,
    deployment_name: &str,
    update_deployment_name: Option<&str>,
) -> Result<String, StepError> {
    let name = if update {
        update_deployment_name
    } else {
        Some(deployment_name).filter(|name| !name.is_empty())
    };
    name.map(str::to_string).ok_or_else(|| {
        StepError::Precondition(if update {
            "no update deployment name recorded".to_string()
        } else {
            "deployment name was never chosen".to_string()
        })
    })
}

/// Copy plan-defined template parameters
fn plan_parameters(
    plan: &Plan,
    keys: &[&str],
    parameters: &mut Map<String, Value>,
) -> Result<(), StepError> {
    for key in keys {
        let value = plan.extended.get(*key).ok_or_else(|| {
            StepError::Precondition(format!("plan {} has no {key}", plan.id))
        })?;
        parameters.insert(key.to_string(), value.clone());
    }
    Ok(())
}

/// Chooses names and credentials, or copies the parent server's address
pub(super) struct Preprocess {
    tier: Tier,
}

impl Preprocess {
    pub(super) fn new(tier: Tier) -> Self {
        Self { tier }
    }

    fn server(instance: &Instance) -> Result<StepOutput, StepError> {
        let mut details: ServerDetails = instance.details.decode()?;
        let mut secure: ServerSecureDetails = instance.secure_details.decode()?;

        if details.deployment_name.is_empty() {
            details.deployment_name = deployment_name("sql-server");
            details.server_name = resource_name(&instance.parameters, "serverName", "sql");
            details.admin_login =
                resource_name(&instance.parameters, "administratorLogin", "admin");
        }
        if secure.admin_password.is_none() {
            let password = match instance.secure_parameter_str("administratorLoginPassword") {
                Some(password) => password.to_string(),
                None => generate_password(24),
            };
            secure.admin_password = Some(password);
        }
        debug!(server = %details.server_name, "Server names chosen");

        Ok(StepOutput::typed(&details, &secure)?)
    }

    async fn database(ctx: &StepContext, instance: &Instance) -> Result<StepOutput, StepError> {
        let server = ctx.require_parent().await?;
        if server.service_id.as_str() != SERVER_SERVICE_ID {
            return Err(StepError::Precondition(format!(
                "parent {} is a {}, not a sql server",
                server.id, server.service_id
            )));
        }
        ensure_provisioned(server, "server")?;

        let server_details: ServerDetails = server.details.decode()?;
        let Some(fqdn) = server_details.fqdn else {
            return Err(StepError::Precondition(format!(
                "server {} has no address",
                server.id
            )));
        };

        let mut details: DatabaseDetails = instance.details.decode()?;
        if details.deployment_name.is_empty() {
            details.deployment_name = deployment_name("sql-database");
            details.database_name = resource_name(&instance.parameters, "databaseName", "db");
        }
        details.server_name = server_details.server_name;
        details.fqdn = Some(fqdn);
        debug!(
            database = %details.database_name,
            server = %details.server_name,
            "Database names chosen"
        );

        Ok(StepOutput::typed(&details, &DatabaseSecureDetails::default())?)
    }
}

#[async_trait]
impl Step for Preprocess {
    fn name(&self) -> &str {
        "preprocess"
    }

    async fn execute(&self, ctx: &StepContext, instance: &Instance) -> Result<StepOutput, StepError> {
        match self.tier {
            Tier::Server => Self::server(instance),
            Tier::Database => Self::database(ctx, instance).await,
        }
    }
}

/// Deploys (or redeploys, for an update) the server
pub(super) struct DeployServer {
    engine: DeploymentEngine,
    plans: PlanTable,
    update: bool,
}

impl DeployServer {
    pub(super) fn new(engine: DeploymentEngine, plans: PlanTable, update: bool) -> Self {
        Self {
            engine,
            plans,
            update,
        }
    }
}

#[async_trait]
impl Step for DeployServer {
    fn name(&self) -> &str {
        if self.update {
            "deploy-update"
        } else {
            "deploy-server"
        }
    }

    async fn execute(&self, ctx: &StepContext, instance: &Instance) -> Result<StepOutput, StepError> {
        let mut details: ServerDetails = instance.details.decode()?;
        let secure: ServerSecureDetails = instance.secure_details.decode()?;
        let name = target_deployment(
            self.update,
            &details.deployment_name,
            details.update_deployment_name.as_deref(),
        )?;
        let Some(password) = secure.admin_password.as_deref() else {
            return Err(StepError::MissingParameter(
                "administratorLoginPassword".to_string(),
            ));
        };

        let plan = plan_for(&self.plans, instance)?;
        let mut parameters = Map::new();
        parameters.insert("serverName".to_string(), json!(details.server_name));
        parameters.insert("location".to_string(), json!(instance.location));
        parameters.insert("administratorLogin".to_string(), json!(details.admin_login));
        parameters.insert("administratorLoginPassword".to_string(), json!(password));
        plan_parameters(plan, &["version"], &mut parameters)?;

        let request = request_for(instance, &name, server_template()?, parameters);
        let outputs = self.engine.deploy(&request, ctx.cancel()).await?;

        details.fqdn = Some(outputs.require_str("fullyQualifiedDomainName")?.to_string());
        if self.update {
            details.update_deployment_name = None;
        }
        info!(server = %details.server_name, fqdn = ?details.fqdn, "Server deployed");

        Ok(StepOutput::typed(&details, &secure)?)
    }
}

/// Deploys (or redeploys, for an update) the database into its server
pub(super) struct DeployDatabase {
    engine: DeploymentEngine,
    plans: PlanTable,
    update: bool,
}

impl DeployDatabase {
    pub(super) fn new(engine: DeploymentEngine, plans: PlanTable, update: bool) -> Self {
        Self {
            engine,
            plans,
            update,
        }
    }
}

#[async_trait]
impl Step for DeployDatabase {
    fn name(&self) -> &str {
        if self.update {
            "deploy-update"
        } else {
            "deploy-database"
        }
    }

    async fn execute(&self, ctx: &StepContext, instance: &Instance) -> Result<StepOutput, StepError> {
        let mut details: DatabaseDetails = instance.details.decode()?;
        let name = target_deployment(
            self.update,
            &details.deployment_name,
            details.update_deployment_name.as_deref(),
        )?;

        let plan = plan_for(&self.plans, instance)?;
        let mut parameters = Map::new();
        parameters.insert("serverName".to_string(), json!(details.server_name));
        parameters.insert("databaseName".to_string(), json!(details.database_name));
        parameters.insert("location".to_string(), json!(instance.location));
        plan_parameters(
            plan,
            &["edition", "requestedServiceObjectiveName", "maxSizeBytes"],
            &mut parameters,
        )?;

        let request = request_for(instance, &name, database_template()?, parameters);
        let outputs = self.engine.deploy(&request, ctx.cancel()).await?;
        outputs.require_str("databaseName")?;

        details.deployed = true;
        if self.update {
            details.update_deployment_name = None;
        }
        info!(database = %details.database_name, plan = %plan.id, "Database deployed");

        Ok(StepOutput::typed(&details, &DatabaseSecureDetails::default())?)
    }
}

/// Picks a fresh deployment name for the update
pub(super) struct PrepareUpdate {
    tier: Tier,
}

impl PrepareUpdate {
    pub(super) fn new(tier: Tier) -> Self {
        Self { tier }
    }
}

#[async_trait]
impl Step for PrepareUpdate {
    fn name(&self) -> &str {
        "prepare-update"
    }

    async fn execute(&self, _ctx: &StepContext, instance: &Instance) -> Result<StepOutput, StepError> {
        let never_provisioned =
            || StepError::Precondition(format!("{} was never provisioned", instance.id));

        match self.tier {
            Tier::Server => {
                let mut details: ServerDetails = instance.details.decode()?;
                if details.deployment_name.is_empty() {
                    return Err(never_provisioned());
                }
                let name = deployment_name("sql-server-update");
                details.update_deployments.push(name.clone());
                details.update_deployment_name = Some(name);
                let secure: ServerSecureDetails = instance.secure_details.decode()?;
                Ok(StepOutput::typed(&details, &secure)?)
            }
            Tier::Database => {
                let mut details: DatabaseDetails = instance.details.decode()?;
                if details.deployment_name.is_empty() {
                    return Err(never_provisioned());
                }
                let name = deployment_name("sql-database-update");
                details.update_deployments.push(name.clone());
                details.update_deployment_name = Some(name);
                Ok(StepOutput::typed(&details, &DatabaseSecureDetails::default())?)
            }
        }
    }
}

/// Deletes every deployment the instance recorded; tolerates none
pub(super) struct DeleteDeployments {
    engine: DeploymentEngine,
    tier: Tier,
}

impl DeleteDeployments {
    pub(super) fn new(engine: DeploymentEngine, tier: Tier) -> Self {
        Self { engine, tier }
    }
}

#[async_trait]
impl Step for DeleteDeployments {
    fn name(&self) -> &str {
        "delete-deployments"
    }

    async fn execute(&self, ctx: &StepContext, instance: &Instance) -> Result<StepOutput, StepError> {
        let names = match self.tier {
            Tier::Server => {
                let details: ServerDetails = instance.details.decode()?;
                recorded_deployments(
                    &details.deployment_name,
                    &details.update_deployments,
                    details.update_deployment_name.as_deref(),
                )
            }
            Tier::Database => {
                let details: DatabaseDetails = instance.details.decode()?;
                recorded_deployments(
                    &details.deployment_name,
                    &details.update_deployments,
                    details.update_deployment_name.as_deref(),
                )
            }
        };

        for name in &names {
            self.engine
                .delete(name, &instance.resource_group, ctx.cancel())
                .await?;
        }

        Ok(StepOutput::unchanged(instance))
    }
}
