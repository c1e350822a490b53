use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::{
    broker::BrokerConfig,
    clients::{DeviceConfig, NnsConfig, NotifierConfig, RegistryConfig},
    dispatcher::DispatcherConfig,
    observability::ObservabilityConfig,
};
use crate::validation::ConfigValidator;

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/node-feeder.toml",
    "node-feeder.toml",
    "/etc/node-feeder/config.toml",
];

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub nns: NnsConfig,
    pub registry: RegistryConfig,
    pub device: DeviceConfig,
    pub dispatcher: DispatcherConfig,
    pub notifier: NotifierConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Built-in defaults
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (`FEEDER_<SECTION>__<KEY>`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("config file not found: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("FEEDER")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("broker.routing_keys")
                .with_list_parse_key("notifier.routing_keys")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("failed to parse TOML config")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config to TOML")
    }

    /// Validate every section plus cross-section constraints
    pub fn validate(&self) -> Result<()> {
        self.broker
            .validate()
            .context("broker configuration is invalid")?;
        self.nns.validate().context("nns configuration is invalid")?;
        self.registry
            .validate()
            .context("registry configuration is invalid")?;
        self.device
            .validate()
            .context("device configuration is invalid")?;
        self.dispatcher
            .validate()
            .context("dispatcher configuration is invalid")?;
        self.notifier
            .validate()
            .context("notifier configuration is invalid")?;
        self.observability
            .validate()
            .context("observability configuration is invalid")?;

        if self.notifier.enabled && self.notifier.queue == self.broker.queue {
            return Err(anyhow::anyhow!(
                "notifier.queue must differ from broker.queue ({})",
                self.broker.queue
            ));
        }

        Ok(())
    }
}
