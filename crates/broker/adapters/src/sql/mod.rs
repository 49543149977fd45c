//! SQL server and database adapter
//!
//! Two services with a parent/child relationship: a database is provisioned
//! into an existing, provisioned server instance. Servers are not bindable;
//! binding a database ensures a login on it through [`SqlAdmin`].

mod admin;
mod steps;
mod template;

pub use admin::{InMemorySqlAdmin, LoginOutcome, SqlAdmin, SqlAdminError, SqlServerAccess};

use crate::common::{generate_password, plan_table, resource_name, PlanTable};
use async_trait::async_trait;
use broker_deployment::DeploymentEngine;
use broker_pipeline::{Pipeline, Step, StepOutput};
use broker_registry::{AdapterError, BindContext, Credentials, ServiceAdapter};
use broker_types::{
    Binding, Instance, Parameters, PipelineKind, Plan, Service, ServiceId, TypedDetails,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

use steps::{DeleteDeployments, DeployDatabase, DeployServer, PrepareUpdate, Preprocess, Tier};

pub const SERVER_SERVICE_ID: &str = "sql-server";
pub const SERVER_PLAN_ID: &str = "sql-server-standard";
pub const DATABASE_SERVICE_ID: &str = "sql-database";
pub const DATABASE_BASIC_PLAN_ID: &str = "sql-database-basic";
pub const DATABASE_S0_PLAN_ID: &str = "sql-database-s0";

const SQL_PORT: u16 = 1433;

/// Non-sensitive server state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerDetails {
    #[serde(default)]
    pub deployment_name: String,

    #[serde(default)]
    pub server_name: String,

    #[serde(default)]
    pub admin_login: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_deployment_name: Option<String>,

    /// Every update deployment started, deleted along with the instance
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update_deployments: Vec<String>,
}

impl TypedDetails for ServerDetails {
    const KIND: &'static str = "sql-server";
    const VERSION: u32 = 1;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerSecureDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_password: Option<String>,
}

impl TypedDetails for ServerSecureDetails {
    const KIND: &'static str = "sql-server-secure";
    const VERSION: u32 = 1;
}

/// Non-sensitive database state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseDetails {
    #[serde(default)]
    pub deployment_name: String,

    /// Copied from the parent server during preprocessing
    #[serde(default)]
    pub server_name: String,

    #[serde(default)]
    pub database_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,

    /// Set once the database deployment succeeded
    #[serde(default)]
    pub deployed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_deployment_name: Option<String>,

    /// Every update deployment started, deleted along with the instance
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update_deployments: Vec<String>,
}

impl TypedDetails for DatabaseDetails {
    const KIND: &'static str = "sql-database";
    const VERSION: u32 = 1;
}

/// Databases keep no secrets of their own; the server's admin password is
/// read from the parent when needed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSecureDetails {}

impl TypedDetails for DatabaseSecureDetails {
    const KIND: &'static str = "sql-database-secure";
    const VERSION: u32 = 1;
}

/// Login granted by a database binding
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginDetails {
    #[serde(default)]
    pub login: String,
}

impl TypedDetails for LoginDetails {
    const KIND: &'static str = "sql-login";
    const VERSION: u32 = 1;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginSecureDetails {
    #[serde(default)]
    pub password: String,
}

impl TypedDetails for LoginSecureDetails {
    const KIND: &'static str = "sql-login-secure";
    const VERSION: u32 = 1;
}

/// Adapter for SQL servers and their databases
pub struct SqlAdapter {
    engine: DeploymentEngine,
    admin: Arc<dyn SqlAdmin>,
    server_plans: PlanTable,
    database_plans: PlanTable,
}

impl SqlAdapter {
    pub fn new(engine: DeploymentEngine, admin: Arc<dyn SqlAdmin>) -> Self {
        Self {
            engine,
            admin,
            server_plans: plan_table(&server_plans()),
            database_plans: plan_table(&database_plans()),
        }
    }

    fn tier(&self, service: &ServiceId) -> Result<Tier, AdapterError> {
        match service.as_str() {
            SERVER_SERVICE_ID => Ok(Tier::Server),
            DATABASE_SERVICE_ID => Ok(Tier::Database),
            _ => Err(AdapterError::UnknownService {
                adapter: self.name().to_string(),
                service: service.clone(),
            }),
        }
    }

    /// Administrator access to the database's server, from the loaded parent
    fn server_access(ctx: &BindContext, instance: &Instance) -> Result<SqlServerAccess, AdapterError> {
        let Some(server) = &ctx.parent else {
            return Err(AdapterError::NotReady(format!(
                "parent server of {} was not loaded",
                instance.id
            )));
        };

        let details: ServerDetails = server.details.decode()?;
        let secure: ServerSecureDetails = server.secure_details.decode()?;
        match (details.fqdn, secure.admin_password) {
            (Some(fqdn), Some(password)) => Ok(SqlServerAccess {
                fqdn,
                admin_login: details.admin_login,
                admin_password: Zeroizing::new(password),
            }),
            _ => Err(AdapterError::NotReady(format!(
                "server {} has no administrator access recorded",
                server.id
            ))),
        }
    }

    fn bindable_database(&self, instance: &Instance) -> Result<DatabaseDetails, AdapterError> {
        if self.tier(&instance.service_id)? == Tier::Server {
            return Err(AdapterError::NotBindable(instance.service_id.clone()));
        }
        let details: DatabaseDetails = instance.details.decode()?;
        if !details.deployed {
            return Err(AdapterError::NotReady(format!(
                "database {} has not finished provisioning",
                instance.id
            )));
        }
        Ok(details)
    }
}

fn server_plans() -> Vec<Plan> {
    vec![Plan::new(SERVER_PLAN_ID, "standard")
        .with_description("Logical SQL server, version 12.0")
        .with_extended("version", "12.0")]
}

fn database_plans() -> Vec<Plan> {
    vec![
        Plan::new(DATABASE_BASIC_PLAN_ID, "basic")
            .with_description("Basic tier, 2 GB")
            .with_extended("edition", "Basic")
            .with_extended("requestedServiceObjectiveName", "Basic")
            .with_extended("maxSizeBytes", "2147483648"),
        Plan::new(DATABASE_S0_PLAN_ID, "S0")
            .with_description("Standard tier S0, 250 GB")
            .paid()
            .with_extended("edition", "Standard")
            .with_extended("requestedServiceObjectiveName", "S0")
            .with_extended("maxSizeBytes", "268435456000"),
    ]
}

fn check_name(parameters: &Parameters, key: &str, max: usize) -> Result<(), AdapterError> {
    match parameters.get(key) {
        None => Ok(()),
        Some(Value::String(name))
            if !name.is_empty()
                && name.len() <= max
                && !name.starts_with('-')
                && name
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') =>
        {
            Ok(())
        }
        Some(other) => Err(AdapterError::InvalidParameters(format!(
            "{key} must be 1-{max} lowercase letters, digits or hyphens, got {other}"
        ))),
    }
}

#[async_trait]
impl ServiceAdapter for SqlAdapter {
    fn name(&self) -> &str {
        "sql"
    }

    fn services(&self) -> Vec<Service> {
        let server = Service::new(SERVER_SERVICE_ID, "sql-server")
            .with_description("Logical SQL server hosting databases")
            .with_tag("sql");
        let database = Service::new(DATABASE_SERVICE_ID, "sql-database")
            .with_description("SQL database on an existing server")
            .bindable()
            .with_tag("sql")
            .with_parent(ServiceId::new(SERVER_SERVICE_ID));

        vec![
            server_plans().into_iter().fold(server, Service::with_plan),
            database_plans().into_iter().fold(database, Service::with_plan),
        ]
    }

    fn pipeline(&self, service: &ServiceId, kind: PipelineKind) -> Result<Pipeline, AdapterError> {
        let tier = self.tier(service)?;

        let deploy = |update: bool| -> Arc<dyn Step> {
            match tier {
                Tier::Server => Arc::new(DeployServer::new(
                    self.engine.clone(),
                    self.server_plans.clone(),
                    update,
                )),
                Tier::Database => Arc::new(DeployDatabase::new(
                    self.engine.clone(),
                    self.database_plans.clone(),
                    update,
                )),
            }
        };

        let steps: Vec<Arc<dyn Step>> = match kind {
            PipelineKind::Provision => vec![Arc::new(Preprocess::new(tier)), deploy(false)],
            PipelineKind::Update => vec![Arc::new(PrepareUpdate::new(tier)), deploy(true)],
            PipelineKind::Deprovision => {
                vec![Arc::new(DeleteDeployments::new(self.engine.clone(), tier))]
            }
        };
        Ok(Pipeline::new(kind, steps)?)
    }

    fn validate_parameters(
        &self,
        service: &Service,
        _plan: &Plan,
        parameters: &Parameters,
    ) -> Result<(), AdapterError> {
        match self.tier(&service.id)? {
            Tier::Server => {
                check_name(parameters, "serverName", 63)?;
                check_name(parameters, "administratorLogin", 128)
            }
            Tier::Database => check_name(parameters, "databaseName", 128),
        }
    }

    fn prepare_bind(
        &self,
        instance: &Instance,
        binding: &Binding,
    ) -> Result<StepOutput, AdapterError> {
        self.bindable_database(instance)?;

        let mut login: LoginDetails = binding.details.decode()?;
        let mut secure: LoginSecureDetails = binding.secure_details.decode()?;
        if login.login.is_empty() {
            login.login = resource_name(&binding.parameters, "username", "u");
        }
        if secure.password.is_empty() {
            secure.password = generate_password(24);
        }
        Ok(StepOutput::typed(&login, &secure)?)
    }

    async fn bind(
        &self,
        ctx: &BindContext,
        instance: &Instance,
        binding: &Binding,
    ) -> Result<StepOutput, AdapterError> {
        let database = self.bindable_database(instance)?;
        let login: LoginDetails = binding.details.decode()?;
        let secure: LoginSecureDetails = binding.secure_details.decode()?;
        if login.login.is_empty() || secure.password.is_empty() {
            return Err(AdapterError::NotReady(format!(
                "{} has no prepared login",
                binding.id
            )));
        }
        let access = Self::server_access(ctx, instance)?;

        let outcome = self
            .admin
            .ensure_login(
                &access,
                &database.database_name,
                &login.login,
                &secure.password,
                &ctx.cancel,
            )
            .await
            .map_err(|e| AdapterError::Remote {
                operation: "ensure login",
                message: e.to_string(),
            })?;
        info!(
            database = %database.database_name,
            login = %login.login,
            ?outcome,
            "Login ensured"
        );

        Ok(StepOutput::typed(&login, &secure)?)
    }

    async fn unbind(
        &self,
        ctx: &BindContext,
        instance: &Instance,
        binding: &Binding,
    ) -> Result<(), AdapterError> {
        let login: LoginDetails = binding.details.decode()?;
        if login.login.is_empty() {
            debug!(binding = %binding.id, "Binding never recorded a login");
            return Ok(());
        }

        let database: DatabaseDetails = instance.details.decode()?;
        let access = Self::server_access(ctx, instance)?;
        let existed = self
            .admin
            .drop_login(&access, &database.database_name, &login.login, &ctx.cancel)
            .await
            .map_err(|e| AdapterError::Remote {
                operation: "drop login",
                message: e.to_string(),
            })?;
        debug!(login = %login.login, existed, "Login dropped");
        Ok(())
    }

    fn credentials(
        &self,
        instance: &Instance,
        binding: &Binding,
    ) -> Result<Credentials, AdapterError> {
        let database = self.bindable_database(instance)?;
        let login: LoginDetails = binding.details.decode()?;
        let secure: LoginSecureDetails = binding.secure_details.decode()?;
        let Some(host) = database.fqdn else {
            return Err(AdapterError::NotReady(format!(
                "database {} has no server address",
                instance.id
            )));
        };
        if login.login.is_empty() {
            return Err(AdapterError::NotReady(format!(
                "{} has no login yet",
                binding.id
            )));
        }

        let name = &database.database_name;
        let (user, password) = (&login.login, &secure.password);
        let mut credentials = Credentials::new();
        credentials.insert("host".to_string(), json!(host));
        credentials.insert("port".to_string(), json!(SQL_PORT));
        credentials.insert("database".to_string(), json!(name));
        credentials.insert("username".to_string(), json!(user));
        credentials.insert("password".to_string(), json!(password));
        credentials.insert(
            "uri".to_string(),
            json!(format!(
                "mssql://{user}:{password}@{host}:{SQL_PORT}/{name}?encrypt=true"
            )),
        );
        credentials.insert(
            "jdbcUrl".to_string(),
            json!(format!(
                "jdbc:sqlserver://{host}:{SQL_PORT};database={name};user={user};password={password};encrypt=true"
            )),
        );
        Ok(credentials)
    }
}

impl std::fmt::Debug for SqlAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlAdapter")
            .field("server_plans", &self.server_plans.len())
            .field("database_plans", &self.database_plans.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_deployment::{EngineConfig, InMemoryResourceManager};
    use broker_types::{BindingId, InstanceId, PlanId};

    fn adapter() -> SqlAdapter {
        let engine = DeploymentEngine::new(
            Arc::new(InMemoryResourceManager::new()),
            EngineConfig::default(),
        );
        SqlAdapter::new(engine, Arc::new(InMemorySqlAdmin::new()))
    }

    #[test]
    fn test_database_nests_inside_server() {
        let services = adapter().services();
        assert_eq!(services.len(), 2);
        assert!(!services[0].bindable);
        assert_eq!(
            services[1].parent_service_id.as_ref().map(ServiceId::as_str),
            Some(SERVER_SERVICE_ID)
        );
    }

    #[test]
    fn test_pipeline_steps() {
        let adapter = adapter();
        let names = |service: &str, kind| -> Vec<String> {
            adapter
                .pipeline(&ServiceId::new(service), kind)
                .unwrap()
                .step_names()
                .map(str::to_string)
                .collect()
        };
        assert_eq!(
            names(SERVER_SERVICE_ID, PipelineKind::Provision),
            vec!["preprocess", "deploy-server"]
        );
        assert_eq!(
            names(DATABASE_SERVICE_ID, PipelineKind::Provision),
            vec!["preprocess", "deploy-database"]
        );
        assert_eq!(
            names(DATABASE_SERVICE_ID, PipelineKind::Update),
            vec!["prepare-update", "deploy-update"]
        );
        assert_eq!(
            names(SERVER_SERVICE_ID, PipelineKind::Deprovision),
            vec!["delete-deployments"]
        );
    }

    #[test]
    fn test_server_name_validation() {
        let adapter = adapter();
        let server = adapter.services().remove(0);
        let plan = server.plans[0].clone();
        let mut params = Parameters::new();
        params.insert("serverName".to_string(), json!("Srv_1"));
        assert!(matches!(
            adapter.validate_parameters(&server, &plan, &params),
            Err(AdapterError::InvalidParameters(_))
        ));
        params.insert("serverName".to_string(), json!("srv-1"));
        assert!(adapter.validate_parameters(&server, &plan, &params).is_ok());
    }

    #[tokio::test]
    async fn test_server_is_not_bindable() {
        let adapter = adapter();
        let server = Instance::new(
            InstanceId::new("s-1"),
            ServiceId::new(SERVER_SERVICE_ID),
            PlanId::new(SERVER_PLAN_ID),
        );
        let binding = Binding::new(BindingId::new("b-1"), server.id.clone());
        let err = adapter
            .bind(&BindContext::default(), &server, &binding)
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::NotBindable(_)));
    }
}
