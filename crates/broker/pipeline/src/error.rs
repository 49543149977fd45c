//! Pipeline error types

use broker_deployment::DeploymentError;
use broker_state::StoreError;
use broker_types::{DetailsError, InstanceId, PipelineKind};
use thiserror::Error;

/// Errors a step can return
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Deployment(#[from] DeploymentError),

    #[error(transparent)]
    Details(#[from] DetailsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Missing parameter {0:?}")]
    MissingParameter(String),

    #[error("Parent instance {0} not found")]
    ParentMissing(InstanceId),

    #[error("Instance has no parent")]
    NoParent,

    /// The instance is not in a state this step can act on
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// An adapter-specific remote call failed
    #[error("{operation} failed: {message}")]
    Remote {
        operation: &'static str,
        message: String,
    },

    #[error("Step cancelled")]
    Cancelled,
}

impl StepError {
    /// Whether re-running the same step can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            StepError::Deployment(e) => e.is_retryable(),
            StepError::Store(_) | StepError::Remote { .. } => true,
            _ => false,
        }
    }
}

/// Pipeline construction and execution errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline {0} has no steps")]
    Empty(PipelineKind),

    #[error("Pipeline {pipeline} declares step {step:?} more than once")]
    DuplicateStep { pipeline: PipelineKind, step: String },

    /// A persisted step name no longer exists; fatal configuration error
    #[error("Pipeline {pipeline} has no step named {step:?}")]
    UnknownStep { pipeline: PipelineKind, step: String },

    #[error("Instance {instance} is mid-{found}, cannot run {requested}")]
    CheckpointMismatch {
        instance: InstanceId,
        found: PipelineKind,
        requested: PipelineKind,
    },

    #[error("Step {step:?} of {pipeline} failed: {source}")]
    StepFailed {
        pipeline: PipelineKind,
        step: String,
        #[source]
        source: StepError,
    },

    #[error("Pipeline {pipeline} cancelled before step {step:?}")]
    Cancelled { pipeline: PipelineKind, step: String },

    #[error("Persisting instance failed: {0}")]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Name of the step the error is attributed to, if any
    pub fn step(&self) -> Option<&str> {
        match self {
            PipelineError::StepFailed { step, .. }
            | PipelineError::Cancelled { step, .. }
            | PipelineError::UnknownStep { step, .. } => Some(step),
            _ => None,
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
