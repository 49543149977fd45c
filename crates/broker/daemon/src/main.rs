//! Stratus daemon - catalog inspection, configuration checks and
//! lifecycle simulation

use anyhow::{bail, Context};
use broker_daemon::{BrokerConfig, Runtime};
use broker_types::{Parameters, PlanId, ServiceId};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stratus daemon CLI
#[derive(Parser)]
#[command(name = "brokerd")]
#[command(about = "Stratus - resumable service broker", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BROKER_CONFIG")]
    config: Option<String>,

    /// Log level, overriding the configured one
    #[arg(long, env = "BROKER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "BROKER_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the assembled catalog as JSON
    Catalog,

    /// Validate configuration, codec selection and catalog assembly
    Check,

    /// Provision, bind, unbind and deprovision one plan in memory
    Simulate {
        /// Service to provision
        #[arg(long)]
        service: String,

        /// Plan within the service
        #[arg(long)]
        plan: String,

        /// Provisioning parameter as key=value (repeatable)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = BrokerConfig::load(cli.config.as_deref()).context("loading configuration")?;

    // Initialize tracing
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let runtime = Runtime::new(&config).context("assembling broker")?;

    match cli.command {
        Command::Catalog => {
            println!("{}", serde_json::to_string_pretty(runtime.broker().catalog())?);
        }
        Command::Check => {
            let catalog = runtime.broker().catalog();
            if catalog.services.is_empty() {
                bail!("catalog is empty");
            }
            tracing::info!(services = catalog.len(), "Configuration is valid");
            println!("ok: {} services", catalog.len());
        }
        Command::Simulate {
            service,
            plan,
            params,
        } => {
            let parameters: Parameters = params
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect();

            let cancel = CancellationToken::new();
            let shutdown = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, cancelling simulation");
                    shutdown.cancel();
                }
            });

            let report = runtime
                .simulate(&ServiceId::new(service), &PlanId::new(plan), parameters, &cancel)
                .await
                .context("simulation failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
