//! Registry error types

use broker_pipeline::{PipelineError, StepError};
use broker_types::{DetailsError, PipelineKind, PlanId, ServiceId};
use thiserror::Error;

/// Catalog assembly and lookup errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Service {service} is declared by both {first} and {second}")]
    DuplicateService {
        service: ServiceId,
        first: String,
        second: String,
    },

    #[error("Plan {plan} is declared by both {first} ({first_service}) and {second} ({second_service})")]
    DuplicatePlan {
        plan: PlanId,
        first: String,
        first_service: ServiceId,
        second: String,
        second_service: ServiceId,
    },

    #[error("Service {service} names unknown parent service {parent}")]
    UnknownParent { service: ServiceId, parent: ServiceId },

    #[error("Unknown service: {0}")]
    UnknownService(ServiceId),

    #[error("Plan {plan} does not belong to service {service}")]
    UnknownPlan { service: ServiceId, plan: PlanId },
}

/// Errors raised by service adapters
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Adapter {adapter} does not serve {service}")]
    UnknownService { adapter: String, service: ServiceId },

    #[error("Adapter {adapter} has no {kind} pipeline for {service}")]
    Unsupported {
        adapter: String,
        service: ServiceId,
        kind: PipelineKind,
    },

    #[error("Service {0} is not bindable")]
    NotBindable(ServiceId),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The instance has not reached a state the operation needs
    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("{operation} failed: {message}")]
    Remote {
        operation: &'static str,
        message: String,
    },

    #[error(transparent)]
    Details(#[from] DetailsError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Step(#[from] StepError),
}

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;
