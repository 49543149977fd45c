//! Stratus Deployment Engine
//!
//! Drives declarative cloud deployments to a terminal state so that running
//! the same request twice never creates the resource twice.
//!
//! ## Architectural Boundaries
//!
//! - `broker-deployment` owns: probing, submitting, polling and deleting deployments
//! - `broker-pipeline` owns: step ordering and resume (called BY adapters' steps)
//! - `broker-adapters` owns: templates and what to do with the outputs
//!
//! ## Key Principle
//!
//! The remote deployment record is the idempotency token. The engine keeps
//! no local state of its own; every call re-derives what to do from a probe.
//!
//! ## Usage
//!
//! ```no_run
//! use broker_deployment::{
//!     DeploymentEngine, DeploymentRequest, DeploymentTemplate, EngineConfig,
//!     InMemoryResourceManager,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let api = Arc::new(InMemoryResourceManager::new());
//! let engine = DeploymentEngine::new(api, EngineConfig::default());
//!
//! let template = DeploymentTemplate::from_value(json!({
//!     "$schema": "https://schema.management.azure.com/schemas/2015-01-01/deploymentTemplate.json#",
//!     "contentVersion": "1.0.0.0",
//!     "resources": [],
//!     "outputs": { "serverName": { "type": "string", "value": "[parameters('name')]" } }
//! }))?;
//! let request = DeploymentRequest::new("db-deploy-1", "rg-1", "eastus", template)
//!     .with_parameter("name", "srv1");
//!
//! let outputs = engine.deploy(&request, &CancellationToken::new()).await?;
//! assert_eq!(outputs.get_str("serverName"), Some("srv1"));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod api;
pub mod engine;
pub mod error;
pub mod memory;
pub mod probe;
pub mod template;
pub mod wait;

// Re-exports
pub use api::{DeploymentMode, DeploymentProperties, RemoteDeployment, ResourceManager};
pub use engine::{DeploymentEngine, DeploymentRequest, EngineConfig};
pub use error::{ApiError, DeploymentError, ErrorKind, Result};
pub use memory::{DeleteBehavior, InMemoryResourceManager, OutputResolver, SubmitBehavior};
pub use probe::{probe, DeploymentStatus, ProbeResult};
pub use template::{provider_parameters, DeploymentOutputs, DeploymentTemplate};
pub use wait::{bounded, WaitError};
