//! # Stratus Control
//!
//! The lifecycle facade every broker front end drives.
//!
//! ## Overview
//!
//! [`Broker`] composes the adapter registry, the instance store and the
//! pipeline runner behind one API:
//!
//! - Validates service, plan, parameters and parent before writing anything
//! - Treats a repeated identical provision or bind as a no-op
//! - Marks an instance failed when its pipeline fails, keeping the
//!   checkpoint so [`Broker::resume`] retries the failed step
//! - Resumes every interrupted pipeline at boot, one task per instance
//!
//! ## Example
//!
//! ```rust,no_run
//! use broker_adapters::CacheAdapter;
//! use broker_control::{Broker, ProvisionRequest};
//! use broker_crypto::NoopCodec;
//! use broker_deployment::{DeploymentEngine, EngineConfig, InMemoryResourceManager};
//! use broker_registry::AdapterRegistry;
//! use broker_state::{InMemoryRecordStore, SealedStore};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DeploymentEngine::new(
//!     Arc::new(InMemoryResourceManager::new()),
//!     EngineConfig::default(),
//! );
//! let registry = AdapterRegistry::builder()
//!     .register(CacheAdapter::new(engine))
//!     .build()?;
//! let store = SealedStore::new(Arc::new(InMemoryRecordStore::new()), Arc::new(NoopCodec));
//! let broker = Broker::new(Arc::new(registry), Arc::new(store));
//!
//! let cancel = CancellationToken::new();
//! let instance = broker
//!     .provision(ProvisionRequest::new("cache-1", "redis-cache", "redis-cache-basic"), &cancel)
//!     .await?;
//! println!("{} is {:?}", instance.id, instance.status);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod broker;
pub mod error;
pub mod request;

// Re-exports
pub use broker::{Broker, Resumed, INSTANCE_TAG};
pub use error::{BrokerError, Result};
pub use request::{PlacementDefaults, ProvisionRequest, UpdateRequest};
