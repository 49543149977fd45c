//! Stratus daemon library
//!
//! Components behind the `brokerd` binary:
//! - Layered configuration (defaults, file, environment)
//! - Broker assembly from configuration
//! - An end-to-end lifecycle simulation against in-memory providers

pub mod config;
pub mod error;
pub mod runtime;

pub use config::{BrokerConfig, LoggingConfig, StorageConfig};
pub use error::{DaemonError, DaemonResult};
pub use runtime::{Runtime, SimulationReport};
