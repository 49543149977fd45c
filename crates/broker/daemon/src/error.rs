//! Daemon error types

use broker_control::BrokerError;
use broker_crypto::CodecError;
use broker_registry::CatalogError;
use thiserror::Error;

/// Errors raised while assembling or driving the broker
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// The simulation request names nothing the catalog offers
    #[error("Simulation error: {0}")]
    Simulation(String),
}

pub type DaemonResult<T> = Result<T, DaemonError>;
