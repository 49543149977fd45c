//! Stratus Types - Core types for the service broker
//!
//! The broker provisions, binds, updates and deprovisions managed cloud
//! resources by running adapter-defined step pipelines against a declarative
//! deployment API.
//!
//! ## Key Concepts
//!
//! - **Instance**: A provisioned resource record tracked by the broker
//! - **Binding**: Credentials granted against an instance
//! - **Catalog**: The services and plans offered by all adapters
//! - **DetailsDocument**: Versioned, adapter-typed state carried between steps

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod catalog;
pub mod details;
pub mod ids;
pub mod instance;

// Re-export main types
pub use catalog::{Catalog, Plan, Service};
pub use details::{DetailsDocument, DetailsError, TypedDetails};
pub use ids::{BindingId, InstanceId, PlanId, ServiceId};
pub use instance::{
    Binding, Instance, InstanceStatus, OperationCheckpoint, Parameters, PipelineKind,
};
