//! Broker assembly and the in-memory lifecycle simulation

use crate::config::{BrokerConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use broker_adapters::{CacheAdapter, InMemorySqlAdmin, SqlAdapter};
use broker_control::{Broker, ProvisionRequest};
use broker_crypto::build_codec;
use broker_deployment::{DeploymentEngine, InMemoryResourceManager};
use broker_registry::{AdapterRegistry, Credentials};
use broker_state::{InMemoryRecordStore, InstanceStore, RecordStore, SealedStore};
use broker_types::{BindingId, InstanceId, Parameters, PlanId, ServiceId};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A fully assembled broker backed by simulated providers
pub struct Runtime {
    broker: Broker,
    api: Arc<InMemoryResourceManager>,
    admin: Arc<InMemorySqlAdmin>,
}

/// Outcome of one simulated lifecycle
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Instances provisioned, parents first
    pub instances: Vec<InstanceId>,

    /// Credentials handed out by the binding
    pub credentials: Credentials,

    /// Deployments submitted to the provider
    pub submissions: usize,

    /// Deployments deleted from the provider
    pub deletions: usize,
}

impl Runtime {
    /// Assemble codec, store, adapters and broker from configuration
    pub fn new(config: &BrokerConfig) -> DaemonResult<Self> {
        let codec = build_codec(&config.crypto)?;
        let records: Arc<dyn RecordStore> = match config.storage {
            StorageConfig::Memory => Arc::new(InMemoryRecordStore::new()),
        };
        let store: Arc<dyn InstanceStore> = Arc::new(SealedStore::new(records, codec.clone()));

        let api = Arc::new(InMemoryResourceManager::new());
        let admin = Arc::new(InMemorySqlAdmin::new());
        let engine = DeploymentEngine::new(api.clone(), config.engine.clone());
        let registry = AdapterRegistry::builder()
            .register(CacheAdapter::new(engine.clone()))
            .register(SqlAdapter::new(engine, admin.clone()))
            .build()?;

        info!(
            codec = codec.name(),
            services = registry.catalog().len(),
            "Broker assembled"
        );

        let broker =
            Broker::new(Arc::new(registry), store).with_defaults(config.defaults.clone());
        Ok(Self { broker, api, admin })
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Run provision, bind, unbind and deprovision for one plan.
    ///
    /// A nested service gets its parent provisioned first on the parent's
    /// first plan, and torn down after it.
    pub async fn simulate(
        &self,
        service_id: &ServiceId,
        plan_id: &PlanId,
        parameters: Parameters,
        cancel: &CancellationToken,
    ) -> DaemonResult<SimulationReport> {
        let catalog = self.broker.catalog();
        let service = catalog.service(service_id).ok_or_else(|| {
            DaemonError::Simulation(format!("unknown service {}", service_id))
        })?;

        let mut chain = Vec::new();
        if let Some(parent_service_id) = &service.parent_service_id {
            let parent = catalog.service(parent_service_id).ok_or_else(|| {
                DaemonError::Simulation(format!("unknown parent service {}", parent_service_id))
            })?;
            let parent_plan = parent.plans.first().ok_or_else(|| {
                DaemonError::Simulation(format!("parent service {} has no plans", parent.id))
            })?;
            chain.push(
                ProvisionRequest::new(
                    format!("sim-{}", parent.id),
                    parent.id.as_str(),
                    parent_plan.id.as_str(),
                )
                .with_parameters(parameters.clone()),
            );
        }

        let mut request =
            ProvisionRequest::new(format!("sim-{}", service.id), service.id.as_str(), plan_id.as_str())
                .with_parameters(parameters);
        if let Some(parent) = chain.first() {
            request = request.with_parent(parent.instance_id.as_str());
        }
        chain.push(request);

        let mut instances = Vec::with_capacity(chain.len());
        for request in chain {
            let instance = self.broker.provision(request, cancel).await?;
            info!(instance = %instance.id, status = ?instance.status, "Simulated provision");
            instances.push(instance.id);
        }

        let target = instances
            .last()
            .cloned()
            .ok_or_else(|| DaemonError::Simulation("nothing was provisioned".to_string()))?;

        let credentials = if service.bindable {
            let binding_id = BindingId::new("sim-binding");
            self.broker
                .bind(&target, &binding_id, Parameters::new(), cancel)
                .await?;
            let credentials = self.broker.credentials(&target, &binding_id).await?;
            self.broker.unbind(&target, &binding_id, cancel).await?;
            credentials
        } else {
            Credentials::new()
        };

        for instance_id in instances.iter().rev() {
            self.broker.deprovision(instance_id, cancel).await?;
            info!(instance = %instance_id, "Simulated deprovision");
        }

        Ok(SimulationReport {
            instances,
            credentials,
            submissions: self.api.submissions(),
            deletions: self.api.deletions(),
        })
    }

    /// Logins currently held by the simulated SQL servers
    pub fn sql_logins(&self) -> usize {
        self.admin.login_count()
    }
}
