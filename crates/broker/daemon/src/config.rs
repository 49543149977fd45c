//! Daemon configuration

use broker_control::PlacementDefaults;
use broker_crypto::CodecSettings;
use broker_deployment::EngineConfig;
use serde::{Deserialize, Serialize};

/// Root configuration for `brokerd`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Deployment engine bounds
    #[serde(default)]
    pub engine: EngineConfig,

    /// Codec for sensitive details
    #[serde(default)]
    pub crypto: CodecSettings,

    /// Record storage backend
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Placement for requests that name no resource group or location
    #[serde(default)]
    pub defaults: PlacementDefaults,
}

/// Storage backend configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (contents are lost on restart)
    #[default]
    Memory,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output as JSON
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl BrokerConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `BROKER_`-prefixed environment variables (`BROKER_ENGINE__POLL_INTERVAL_SECS`)
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = Self::defaults()?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("BROKER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Parse a TOML document layered over the defaults
    pub fn from_toml(document: &str) -> Result<Self, config::ConfigError> {
        Self::defaults()?
            .add_source(config::File::from_str(document, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError>
    {
        Ok(config::Config::builder().add_source(config::Config::try_from(&BrokerConfig::default())?))
    }
}
