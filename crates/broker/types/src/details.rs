//! Versioned details documents
//!
//! Instances and bindings accumulate adapter-defined state between pipeline
//! steps. Persistence sees that state as an opaque document; adapters see a
//! concrete Rust type. A [`DetailsDocument`] carries the adapter's kind tag and
//! schema version so decoding into the wrong type fails loudly instead of
//! silently producing garbage.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A typed details payload owned by one adapter
pub trait TypedDetails: Serialize + DeserializeOwned + Default {
    /// Kind tag stored alongside the body
    const KIND: &'static str;

    /// Schema version; bump when the body shape changes incompatibly
    const VERSION: u32;
}

/// Errors decoding or encoding a details document
#[derive(Debug, Error)]
pub enum DetailsError {
    #[error("details kind mismatch: stored {stored}, expected {expected}")]
    KindMismatch { stored: String, expected: String },

    #[error("details version mismatch for {kind}: stored v{stored}, expected v{expected}")]
    VersionMismatch {
        kind: String,
        stored: u32,
        expected: u32,
    },

    #[error("malformed details for {kind}: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Opaque, versioned details document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetailsDocument {
    /// Adapter kind tag; `None` until a step first writes the document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Schema version of `body`
    #[serde(default)]
    pub version: u32,

    /// Adapter-defined body
    #[serde(default)]
    pub body: Value,
}

impl DetailsDocument {
    /// An empty document, as seen before any step has run
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
    }

    /// Encode a typed value into a document
    pub fn encode<T: TypedDetails>(value: &T) -> Result<Self, DetailsError> {
        let body = serde_json::to_value(value).map_err(|source| DetailsError::Malformed {
            kind: T::KIND.to_string(),
            source,
        })?;

        Ok(Self {
            kind: Some(T::KIND.to_string()),
            version: T::VERSION,
            body,
        })
    }

    /// Decode into a typed value.
    ///
    /// An empty document decodes to `T::default()` so that steps running
    /// against a partially provisioned instance see "nothing recorded yet".
    pub fn decode<T: TypedDetails>(&self) -> Result<T, DetailsError> {
        let Some(kind) = self.kind.as_deref() else {
            return Ok(T::default());
        };

        if kind != T::KIND {
            return Err(DetailsError::KindMismatch {
                stored: kind.to_string(),
                expected: T::KIND.to_string(),
            });
        }

        if self.version != T::VERSION {
            return Err(DetailsError::VersionMismatch {
                kind: kind.to_string(),
                stored: self.version,
                expected: T::VERSION,
            });
        }

        serde_json::from_value(self.body.clone()).map_err(|source| DetailsError::Malformed {
            kind: kind.to_string(),
            source,
        })
    }

    /// Serialize the whole document, e.g. before encryption
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
