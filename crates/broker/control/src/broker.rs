//! The lifecycle facade
//!
//! [`Broker`] is the single entry point for provisioning, updating, binding
//! and deprovisioning. It validates requests against the catalog before
//! anything is written, hands pipelines to the runner and records failures
//! on the instance so a later [`Broker::resume`] can pick up where the
//! failed step left off.

use crate::error::{BrokerError, Result};
use crate::request::{PlacementDefaults, ProvisionRequest, UpdateRequest};
use broker_pipeline::{PipelineError, PipelineRunner, RunOutcome};
use broker_registry::{
    AdapterError, AdapterRegistry, BindContext, CatalogError, Credentials, ServiceAdapter,
};
use broker_state::{InstanceStore, StoreError};
use broker_types::{
    Binding, BindingId, Catalog, Instance, InstanceId, InstanceStatus, Parameters, PipelineKind,
    Service,
};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Tag written on every resource so it can be traced back to its instance
pub const INSTANCE_TAG: &str = "stratus-instance";

/// Outcome of resuming one interrupted instance
#[derive(Debug)]
pub struct Resumed {
    pub instance_id: InstanceId,
    /// The instance as left by its pipeline; `None` once deprovisioned
    pub result: Result<Option<Instance>>,
}

/// Lifecycle facade over the registry, the store and the runner
#[derive(Clone)]
pub struct Broker {
    registry: Arc<AdapterRegistry>,
    store: Arc<dyn InstanceStore>,
    runner: PipelineRunner,
    defaults: PlacementDefaults,
}

impl Broker {
    pub fn new(registry: Arc<AdapterRegistry>, store: Arc<dyn InstanceStore>) -> Self {
        Self {
            runner: PipelineRunner::new(store.clone()),
            registry,
            store,
            defaults: PlacementDefaults::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: PlacementDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        self.registry.catalog()
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Provision a new instance.
    ///
    /// Repeating a request for an existing instance with identical service,
    /// plan, parameters and parent returns the instance (resuming its
    /// provisioner if it was interrupted); anything else is a conflict.
    #[instrument(
        skip(self, request, cancel),
        fields(instance = %request.instance_id, service = %request.service_id, plan = %request.plan_id)
    )]
    pub async fn provision(
        &self,
        request: ProvisionRequest,
        cancel: &CancellationToken,
    ) -> Result<Instance> {
        let resolved = self.registry.resolve(&request.service_id, &request.plan_id)?;
        resolved
            .adapter
            .validate_parameters(resolved.service, resolved.plan, &request.parameters)?;
        let parent = self
            .check_parent(resolved.service, request.parent_id.as_ref())
            .await?;

        if let Some(existing) = self.store.get_instance(&request.instance_id).await? {
            if !same_provision(&existing, &request) {
                return Err(BrokerError::Conflict(format!(
                    "instance {} already exists with different attributes",
                    request.instance_id.as_str()
                )));
            }

            return match existing.checkpoint.as_ref().map(|c| c.pipeline) {
                Some(PipelineKind::Provision) => {
                    info!("Resuming interrupted provision");
                    let outcome = self
                        .execute(resolved.adapter.as_ref(), PipelineKind::Provision, existing, cancel)
                        .await?;
                    Ok(outcome.into_instance())
                }
                Some(other) => Err(BrokerError::Conflict(format!(
                    "instance {} is mid-{other}",
                    request.instance_id.as_str()
                ))),
                None => {
                    debug!("Instance already provisioned with identical attributes");
                    Ok(existing)
                }
            };
        }

        let instance = self.new_instance(request, parent.as_ref());
        self.store.put_instance(&instance).await?;
        info!(
            resource_group = %instance.resource_group,
            location = %instance.location,
            "Instance recorded"
        );

        let outcome = self
            .execute(resolved.adapter.as_ref(), PipelineKind::Provision, instance, cancel)
            .await?;
        Ok(outcome.into_instance())
    }

    /// Change a provisioned instance's plan or parameters.
    ///
    /// An instance whose last update failed may be updated again; the update
    /// pipeline then starts from its first step.
    #[instrument(skip(self, request, cancel), fields(instance = %instance_id))]
    pub async fn update(
        &self,
        instance_id: &InstanceId,
        request: UpdateRequest,
        cancel: &CancellationToken,
    ) -> Result<Instance> {
        let mut instance = self.get_instance(instance_id).await?;
        // A failed update starts over, so it gets a fresh deployment
        let restarting = match &instance.checkpoint {
            None => false,
            Some(checkpoint)
                if checkpoint.pipeline == PipelineKind::Update
                    && instance.status == InstanceStatus::Failed =>
            {
                true
            }
            Some(checkpoint) => {
                return Err(BrokerError::Conflict(format!(
                    "instance {} is mid-{}; resume it first",
                    instance_id.as_str(),
                    checkpoint.pipeline
                )));
            }
        };
        if !restarting && instance.status != InstanceStatus::Provisioned {
            return Err(BrokerError::Conflict(format!(
                "instance {} is {:?}",
                instance_id.as_str(),
                instance.status
            )));
        }

        let plan_id = request.plan_id.unwrap_or_else(|| instance.plan_id.clone());
        let resolved = self.registry.resolve(&instance.service_id, &plan_id)?;
        let parameters = request
            .parameters
            .unwrap_or_else(|| instance.parameters.clone());
        resolved
            .adapter
            .validate_parameters(resolved.service, resolved.plan, &parameters)?;

        instance.plan_id = plan_id;
        instance.parameters = parameters;
        if let Some(secure) = request.secure_parameters {
            instance.secure_parameters = secure;
        }
        instance.begin(PipelineKind::Update);
        self.store.put_instance(&instance).await?;
        info!(plan = %instance.plan_id, restarting, "Update started");

        let outcome = self
            .execute(resolved.adapter.as_ref(), PipelineKind::Update, instance, cancel)
            .await?;
        Ok(outcome.into_instance())
    }

    /// Deprovision an instance, whatever state its last pipeline left it in.
    ///
    /// Refused while the instance still has bindings or child instances.
    #[instrument(skip(self, cancel), fields(instance = %instance_id))]
    pub async fn deprovision(
        &self,
        instance_id: &InstanceId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut instance = self.get_instance(instance_id).await?;
        let adapter = self.adapter_for(&instance)?;

        let bindings = self.store.list_bindings(instance_id).await?;
        if !bindings.is_empty() {
            return Err(BrokerError::Conflict(format!(
                "instance {} still has {} binding(s)",
                instance_id.as_str(),
                bindings.len()
            )));
        }
        let children = self.children(instance_id).await?;
        if !children.is_empty() {
            return Err(BrokerError::Conflict(format!(
                "instance {} still has child instances: {}",
                instance_id.as_str(),
                children.join(", ")
            )));
        }

        let resuming = instance
            .checkpoint
            .as_ref()
            .is_some_and(|c| c.pipeline == PipelineKind::Deprovision);
        if !resuming {
            if let Some(checkpoint) = &instance.checkpoint {
                warn!(abandoned = %checkpoint.pipeline, "Deprovisioning over an unfinished pipeline");
            }
            instance.begin(PipelineKind::Deprovision);
            self.store.put_instance(&instance).await?;
        }

        self.execute(adapter.as_ref(), PipelineKind::Deprovision, instance, cancel)
            .await?;
        info!("Instance deprovisioned");
        Ok(())
    }

    /// Re-run the pipeline an instance was left in, from its last persisted
    /// step. Returns the instance unchanged if nothing is pending, and `None`
    /// once a deprovision completes.
    #[instrument(skip(self, cancel), fields(instance = %instance_id))]
    pub async fn resume(
        &self,
        instance_id: &InstanceId,
        cancel: &CancellationToken,
    ) -> Result<Option<Instance>> {
        let instance = self.get_instance(instance_id).await?;
        let Some(kind) = instance.checkpoint.as_ref().map(|c| c.pipeline) else {
            debug!("Nothing to resume");
            return Ok(Some(instance));
        };

        let adapter = self.adapter_for(&instance)?;
        match self.execute(adapter.as_ref(), kind, instance, cancel).await? {
            RunOutcome::Completed(instance) => Ok(Some(instance)),
            RunOutcome::Removed(_) => Ok(None),
        }
    }

    /// Resume every instance with a pipeline in flight, one task each.
    ///
    /// Top-level instances run first so that children find their parents
    /// provisioned.
    #[instrument(skip(self, cancel))]
    pub async fn resume_pending(&self, cancel: &CancellationToken) -> Result<Vec<Resumed>> {
        let pending: Vec<Instance> = self
            .store
            .list_instances()
            .await?
            .into_iter()
            .filter(|i| i.checkpoint.is_some())
            .collect();
        info!(pending = pending.len(), "Resuming interrupted pipelines");

        let (roots, children): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|i| i.parent_id.is_none());

        let mut resumed = self.resume_wave(roots, cancel).await?;
        resumed.extend(self.resume_wave(children, cancel).await?);
        Ok(resumed)
    }

    async fn resume_wave(
        &self,
        instances: Vec<Instance>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Resumed>> {
        let mut tasks = JoinSet::new();
        for instance in instances {
            let broker = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let result = broker.resume(&instance.id, &cancel).await;
                Resumed {
                    instance_id: instance.id,
                    result,
                }
            });
        }

        let mut resumed = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| BrokerError::Internal(format!("resume task: {e}")))?;
            if let Err(e) = &outcome.result {
                warn!(instance = %outcome.instance_id, error = %e, "Resume failed");
            }
            resumed.push(outcome);
        }
        Ok(resumed)
    }

    /// Bind a provisioned instance.
    ///
    /// Re-binding with identical parameters returns the recorded binding; a
    /// binding left partial by an earlier attempt is completed with what that
    /// attempt recorded.
    #[instrument(skip(self, parameters, cancel), fields(instance = %instance_id, binding = %binding_id))]
    pub async fn bind(
        &self,
        instance_id: &InstanceId,
        binding_id: &BindingId,
        parameters: Parameters,
        cancel: &CancellationToken,
    ) -> Result<Binding> {
        let instance = self.get_instance(instance_id).await?;
        let service = self.service_of(&instance)?;
        if !service.bindable {
            return Err(AdapterError::NotBindable(service.id.clone()).into());
        }
        if instance.status != InstanceStatus::Provisioned || instance.checkpoint.is_some() {
            return Err(BrokerError::Conflict(format!(
                "instance {} is not provisioned",
                instance_id.as_str()
            )));
        }

        let mut binding = match self.store.get_binding(instance_id, binding_id).await? {
            Some(existing) if existing.parameters != parameters => {
                return Err(BrokerError::Conflict(format!(
                    "binding {} already exists with different parameters",
                    binding_id.as_str()
                )));
            }
            Some(existing) if existing.bound => {
                debug!("Binding already complete");
                return Ok(existing);
            }
            Some(existing) => existing,
            None => Binding::new(binding_id.clone(), instance_id.clone()).with_parameters(parameters),
        };

        // What the adapter is about to grant is recorded before it is granted
        let adapter = self.adapter_for(&instance)?;
        let prepared = adapter.prepare_bind(&instance, &binding)?;
        binding.details = prepared.details;
        binding.secure_details = prepared.secure_details;
        self.store.put_binding(&binding).await?;

        let ctx = self.bind_context(&instance, cancel).await?;
        let output = adapter.bind(&ctx, &instance, &binding).await?;
        binding.details = output.details;
        binding.secure_details = output.secure_details;
        binding.bound = true;
        self.store.put_binding(&binding).await?;
        info!("Binding created");

        Ok(binding)
    }

    /// Revoke a binding and forget it
    #[instrument(skip(self, cancel), fields(instance = %instance_id, binding = %binding_id))]
    pub async fn unbind(
        &self,
        instance_id: &InstanceId,
        binding_id: &BindingId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let instance = self.get_instance(instance_id).await?;
        let binding = self.get_binding(instance_id, binding_id).await?;

        let adapter = self.adapter_for(&instance)?;
        let ctx = self.bind_context(&instance, cancel).await?;
        adapter.unbind(&ctx, &instance, &binding).await?;
        self.store.delete_binding(instance_id, binding_id).await?;
        info!("Binding removed");
        Ok(())
    }

    /// Consumer credentials for a binding
    pub async fn credentials(
        &self,
        instance_id: &InstanceId,
        binding_id: &BindingId,
    ) -> Result<Credentials> {
        let instance = self.get_instance(instance_id).await?;
        let binding = self.get_binding(instance_id, binding_id).await?;
        Ok(self.adapter_for(&instance)?.credentials(&instance, &binding)?)
    }

    pub async fn get_instance(&self, instance_id: &InstanceId) -> Result<Instance> {
        self.store
            .get_instance(instance_id)
            .await?
            .ok_or_else(|| BrokerError::instance_not_found(instance_id))
    }

    pub async fn list_instances(&self) -> Result<Vec<Instance>> {
        Ok(self.store.list_instances().await?)
    }

    pub async fn get_binding(
        &self,
        instance_id: &InstanceId,
        binding_id: &BindingId,
    ) -> Result<Binding> {
        self.store
            .get_binding(instance_id, binding_id)
            .await?
            .ok_or_else(|| BrokerError::binding_not_found(instance_id, binding_id))
    }

    /// Run one pipeline, recording a failure on the instance
    async fn execute(
        &self,
        adapter: &dyn ServiceAdapter,
        kind: PipelineKind,
        instance: Instance,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let pipeline = adapter.pipeline(&instance.service_id, kind)?;
        let instance_id = instance.id.clone();

        match self.runner.run(&pipeline, instance, cancel).await {
            Ok(outcome) => Ok(outcome),
            // An interrupted run stays in flight so it can be resumed as is
            Err(err) if cancel.is_cancelled() => Err(err.into()),
            Err(err) => match self.mark_failed(&instance_id, &err).await {
                Ok(()) => Err(err.into()),
                Err(store) => Err(BrokerError::FailureNotRecorded {
                    pipeline: err,
                    store,
                }),
            },
        }
    }

    async fn mark_failed(
        &self,
        instance_id: &InstanceId,
        err: &PipelineError,
    ) -> std::result::Result<(), StoreError> {
        warn!(step = ?err.step(), error = %err, "Pipeline failed");
        let Some(mut failed) = self.store.get_instance(instance_id).await? else {
            return Ok(());
        };

        failed.status = InstanceStatus::Failed;
        failed.status_reason = Some(err.to_string());
        failed.touch();
        self.store.put_instance(&failed).await
    }

    async fn check_parent(
        &self,
        service: &Service,
        parent_id: Option<&InstanceId>,
    ) -> Result<Option<Instance>> {
        match (&service.parent_service_id, parent_id) {
            (None, None) => Ok(None),
            (None, Some(_)) => Err(BrokerError::InvalidRequest(format!(
                "service {} does not nest inside another instance",
                service.id
            ))),
            (Some(expected), None) => Err(BrokerError::InvalidRequest(format!(
                "service {} needs a parent {expected} instance",
                service.id
            ))),
            (Some(expected), Some(parent_id)) => {
                let parent = self.store.get_instance(parent_id).await?.ok_or_else(|| {
                    BrokerError::NotFound(format!("Parent instance {}", parent_id.as_str()))
                })?;
                if &parent.service_id != expected {
                    return Err(BrokerError::InvalidRequest(format!(
                        "parent {} is a {}, not a {expected}",
                        parent_id.as_str(),
                        parent.service_id
                    )));
                }
                Ok(Some(parent))
            }
        }
    }

    fn new_instance(&self, request: ProvisionRequest, parent: Option<&Instance>) -> Instance {
        let resource_group = request
            .resource_group
            .or_else(|| parent.map(|p| p.resource_group.clone()))
            .unwrap_or_else(|| self.defaults.resource_group.clone());
        let location = request
            .location
            .or_else(|| parent.map(|p| p.location.clone()))
            .unwrap_or_else(|| self.defaults.location.clone());

        let mut instance = Instance::new(request.instance_id, request.service_id, request.plan_id)
            .with_resource_group(resource_group)
            .with_location(location)
            .with_parameters(request.parameters)
            .with_secure_parameters(request.secure_parameters);
        instance.tags = request.tags;
        instance
            .tags
            .insert(INSTANCE_TAG.to_string(), instance.id.as_str().to_string());
        if let Some(parent_id) = request.parent_id {
            instance = instance.with_parent(parent_id);
        }
        instance
    }

    async fn bind_context(
        &self,
        instance: &Instance,
        cancel: &CancellationToken,
    ) -> Result<BindContext> {
        let parent = match &instance.parent_id {
            Some(parent_id) => Some(self.store.get_instance(parent_id).await?.ok_or_else(|| {
                BrokerError::NotFound(format!("Parent instance {}", parent_id.as_str()))
            })?),
            None => None,
        };
        Ok(BindContext::new(cancel.clone()).with_parent(parent))
    }

    async fn children(&self, instance_id: &InstanceId) -> Result<Vec<String>> {
        Ok(self
            .store
            .list_instances()
            .await?
            .into_iter()
            .filter(|i| i.parent_id.as_ref() == Some(instance_id))
            .map(|i| i.id.as_str().to_string())
            .collect())
    }

    fn adapter_for(&self, instance: &Instance) -> Result<Arc<dyn ServiceAdapter>> {
        self.registry
            .adapter_for(&instance.service_id)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownService(instance.service_id.clone()).into())
    }

    fn service_of(&self, instance: &Instance) -> Result<&Service> {
        self.registry
            .catalog()
            .service(&instance.service_id)
            .ok_or_else(|| CatalogError::UnknownService(instance.service_id.clone()).into())
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("services", &self.registry.catalog().len())
            .field("defaults", &self.defaults)
            .finish()
    }
}

fn same_provision(existing: &Instance, request: &ProvisionRequest) -> bool {
    existing.service_id == request.service_id
        && existing.plan_id == request.plan_id
        && existing.parameters == request.parameters
        && existing.parent_id == request.parent_id
}
