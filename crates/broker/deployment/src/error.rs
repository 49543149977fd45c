//! Deployment error types

use std::time::Duration;
use thiserror::Error;

/// Errors reported by a [`ResourceManager`](crate::ResourceManager)
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Request throttled: {0}")]
    Throttled(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider rejected request ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

/// Error taxonomy shared by every deployment failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport/API failure; the whole step can be retried
    Transport,
    /// Provider reported the deployment failed; needs a new deployment name
    Failed,
    /// Provider reported a state this engine does not recognize
    Unknown,
    /// A bounded wait expired; the remote operation may still be in flight
    Timeout,
    /// The caller cancelled the operation; remote outcome unknown
    Cancelled,
    /// An impossible remote transition was observed
    InvariantViolation,
    /// The request or the provider's response was malformed
    Invalid,
}

/// Deployment errors
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("{operation} for deployment {deployment} in {resource_group} failed: {source}")]
    Api {
        operation: &'static str,
        deployment: String,
        resource_group: String,
        #[source]
        source: ApiError,
    },

    #[error("Deployment {deployment} in {resource_group} failed with state {state}")]
    Failed {
        deployment: String,
        resource_group: String,
        state: String,
    },

    #[error("Deployment {deployment} in {resource_group} reported unrecognized state {state:?}")]
    UnknownState {
        deployment: String,
        resource_group: String,
        state: String,
    },

    #[error(
        "Timeout waiting for {operation} of deployment {deployment} in {resource_group} \
         after {after:?}; remote outcome unknown"
    )]
    Timeout {
        operation: &'static str,
        deployment: String,
        resource_group: String,
        after: Duration,
    },

    #[error("{operation} of deployment {deployment} in {resource_group} was cancelled")]
    Cancelled {
        operation: &'static str,
        deployment: String,
        resource_group: String,
    },

    #[error(
        "Invariant violated: running deployment {deployment} in {resource_group} \
         disappeared while polling"
    )]
    Vanished {
        deployment: String,
        resource_group: String,
    },

    #[error("Deployment {deployment} has no output {key:?}")]
    MissingOutput { deployment: String, key: String },

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),
}

impl DeploymentError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeploymentError::Api { .. } => ErrorKind::Transport,
            DeploymentError::Failed { .. } => ErrorKind::Failed,
            DeploymentError::UnknownState { .. } => ErrorKind::Unknown,
            DeploymentError::Timeout { .. } => ErrorKind::Timeout,
            DeploymentError::Cancelled { .. } => ErrorKind::Cancelled,
            DeploymentError::Vanished { .. } => ErrorKind::InvariantViolation,
            DeploymentError::MissingOutput { .. } | DeploymentError::InvalidTemplate(_) => {
                ErrorKind::Invalid
            }
        }
    }

    /// Whether re-running the step with the same deployment name can help
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

/// Result type for deployment operations
pub type Result<T> = std::result::Result<T, DeploymentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_are_retryable() {
        let api = DeploymentError::Api {
            operation: "probe",
            deployment: "d".to_string(),
            resource_group: "rg".to_string(),
            source: ApiError::Transport("reset".to_string()),
        };
        assert!(api.is_retryable());

        let failed = DeploymentError::Failed {
            deployment: "d".to_string(),
            resource_group: "rg".to_string(),
            state: "Failed".to_string(),
        };
        assert!(!failed.is_retryable());

        let vanished = DeploymentError::Vanished {
            deployment: "d".to_string(),
            resource_group: "rg".to_string(),
        };
        assert_eq!(vanished.kind(), ErrorKind::InvariantViolation);
        assert!(!vanished.is_retryable());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = DeploymentError::Timeout {
            operation: "delete",
            deployment: "db-deploy-1".to_string(),
            resource_group: "rg-1".to_string(),
            after: Duration::from_secs(1200),
        };
        let message = err.to_string();
        assert!(message.contains("db-deploy-1"));
        assert!(message.contains("rg-1"));
        assert!(message.contains("delete"));
    }
}
