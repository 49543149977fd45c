//! Error types for the lifecycle facade

use broker_pipeline::PipelineError;
use broker_registry::{AdapterError, CatalogError};
use broker_state::StoreError;
use broker_types::{BindingId, InstanceId};
use thiserror::Error;

/// Broker error type
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Unknown service or plan, or a plan outside its service
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// The pipeline failed; the instance was marked failed unless cancelled
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// The pipeline failed and the failure could not be recorded on the
    /// instance, which still shows its pipeline in flight
    #[error("Pipeline error: {pipeline}; recording the failure failed: {store}")]
    FailureNotRecorded {
        pipeline: PipelineError,
        store: StoreError,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    /// The request contradicts what is already recorded
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;

impl BrokerError {
    pub fn instance_not_found(id: &InstanceId) -> Self {
        Self::NotFound(format!("Instance {}", id.as_str()))
    }

    pub fn binding_not_found(instance_id: &InstanceId, binding_id: &BindingId) -> Self {
        Self::NotFound(format!(
            "Binding {} of instance {}",
            binding_id.as_str(),
            instance_id.as_str()
        ))
    }

    /// Whether retrying the same request later can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            BrokerError::Pipeline(PipelineError::StepFailed { source, .. }) => {
                source.is_retryable()
            }
            BrokerError::Pipeline(PipelineError::Cancelled { .. })
            | BrokerError::Pipeline(PipelineError::Store(_))
            | BrokerError::Store(_)
            | BrokerError::FailureNotRecorded { .. } => true,
            _ => false,
        }
    }
}
