//! Stratus Adapters - built-in service adapters
//!
//! - **cache**: a managed Redis cache; one service, shared access key
//! - **sql**: SQL servers and the databases nested inside them; binding a
//!   database ensures a login through the [`SqlAdmin`] seam
//!
//! Both deploy through [`broker_deployment::DeploymentEngine`], so re-running
//! any of their steps converges on the deployment that already exists.
//!
//! ## Usage
//!
//! ```no_run
//! use broker_adapters::{CacheAdapter, InMemorySqlAdmin, SqlAdapter};
//! use broker_deployment::{DeploymentEngine, EngineConfig, InMemoryResourceManager};
//! use broker_registry::AdapterRegistry;
//! use std::sync::Arc;
//!
//! let engine = DeploymentEngine::new(
//!     Arc::new(InMemoryResourceManager::new()),
//!     EngineConfig::default(),
//! );
//! let registry = AdapterRegistry::builder()
//!     .register(CacheAdapter::new(engine.clone()))
//!     .register(SqlAdapter::new(engine, Arc::new(InMemorySqlAdmin::new())))
//!     .build()
//!     .expect("built-in catalogs are disjoint");
//! assert_eq!(registry.catalog().len(), 3);
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod cache;
mod common;
pub mod sql;

// Re-exports
pub use cache::{CacheAdapter, CacheDetails, CacheSecureDetails};
pub use sql::{
    DatabaseDetails, InMemorySqlAdmin, LoginDetails, LoginOutcome, LoginSecureDetails,
    ServerDetails, ServerSecureDetails, SqlAdapter, SqlAdmin, SqlAdminError, SqlServerAccess,
};
