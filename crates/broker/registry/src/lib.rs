//! Stratus Registry - service adapters and the catalog
//!
//! - **ServiceAdapter**: contributes services, plans and lifecycle pipelines
//! - **AdapterRegistry**: the immutable list of adapters, built once at boot
//!   and passed by reference; routes each service to its adapter
//! - **assemble_catalog**: merges every adapter's offering, rejecting ID
//!   collisions

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod adapter;
pub mod catalog;
pub mod error;
pub mod registry;

// Re-exports
pub use adapter::{BindContext, Credentials, ServiceAdapter};
pub use catalog::{assemble_catalog, AssembledCatalog};
pub use error::{AdapterError, CatalogError, Result};
pub use registry::{AdapterRegistry, RegistryBuilder, Resolved};
