//! Service adapter contract

use crate::error::AdapterError;
use async_trait::async_trait;
use broker_pipeline::{Pipeline, StepOutput};
use broker_types::{Binding, Instance, Parameters, PipelineKind, Plan, Service, ServiceId};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// Credentials handed to a consumer of a binding
pub type Credentials = Map<String, Value>;

/// Context for bind and unbind calls
#[derive(Debug, Clone, Default)]
pub struct BindContext {
    /// Token to pass to every blocking call
    pub cancel: CancellationToken,

    /// The instance's parent, loaded by the caller when the instance has one
    pub parent: Option<Instance>,
}

impl BindContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: Option<Instance>) -> Self {
        self.parent = parent;
        self
    }
}

/// One family of services the broker can provision.
///
/// Adapters hold no per-instance state: every call receives the full current
/// instance (and binding) and returns what it changed.
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    /// Adapter name, used in catalog conflict reports and logs
    fn name(&self) -> &str;

    /// Services and plans this adapter offers
    fn services(&self) -> Vec<Service>;

    /// Pipeline of `kind` for `service`
    fn pipeline(&self, service: &ServiceId, kind: PipelineKind) -> Result<Pipeline, AdapterError>;

    /// Check provisioning or update parameters before anything is written
    fn validate_parameters(
        &self,
        _service: &Service,
        _plan: &Plan,
        _parameters: &Parameters,
    ) -> Result<(), AdapterError> {
        Ok(())
    }

    /// Choose what `bind` will grant, before anything remote happens.
    ///
    /// The result is persisted on the binding before `bind` runs, so a retry
    /// after a crash grants the same login rather than a second one. Must
    /// keep anything already recorded on `binding`.
    fn prepare_bind(
        &self,
        _instance: &Instance,
        binding: &Binding,
    ) -> Result<StepOutput, AdapterError> {
        Ok(StepOutput::new(
            binding.details.clone(),
            binding.secure_details.clone(),
        ))
    }

    /// Grant what `prepare_bind` recorded; must be idempotent
    async fn bind(
        &self,
        ctx: &BindContext,
        instance: &Instance,
        binding: &Binding,
    ) -> Result<StepOutput, AdapterError>;

    /// Revoke what `bind` granted; must tolerate a partially bound binding
    async fn unbind(
        &self,
        ctx: &BindContext,
        instance: &Instance,
        binding: &Binding,
    ) -> Result<(), AdapterError>;

    /// Assemble consumer credentials from instance and binding details
    fn credentials(&self, instance: &Instance, binding: &Binding)
        -> Result<Credentials, AdapterError>;

    fn provisioner(&self, service: &ServiceId) -> Result<Pipeline, AdapterError> {
        self.pipeline(service, PipelineKind::Provision)
    }

    fn updater(&self, service: &ServiceId) -> Result<Pipeline, AdapterError> {
        self.pipeline(service, PipelineKind::Update)
    }

    fn deprovisioner(&self, service: &ServiceId) -> Result<Pipeline, AdapterError> {
        self.pipeline(service, PipelineKind::Deprovision)
    }
}
