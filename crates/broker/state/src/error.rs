//! Storage errors

use broker_crypto::CodecError;
use thiserror::Error;

/// Errors from instance and binding persistence
#[derive(Debug, Error)]
pub enum StoreError {
    /// Referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflicting write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Sealing or opening a secure field failed
    #[error("Secure field {field} of {record}: {source}")]
    Codec {
        record: String,
        field: &'static str,
        #[source]
        source: CodecError,
    },

    /// A stored field could not be (de)serialized
    #[error("Invalid data in {record}: {source}")]
    InvalidData {
        record: String,
        #[source]
        source: serde_json::Error,
    },

    /// Backend unavailable
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StoreError>;
