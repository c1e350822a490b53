use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};

const HTTP_SCHEMES: [&str; 2] = ["http", "https"];

/// Address registry (NNS) client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NnsConfig {
    pub host: String,
    pub timeout_seconds: u64,
}

impl Default for NnsConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:9090".to_string(),
            timeout_seconds: 3,
        }
    }
}

impl NnsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ConfigValidator for NnsConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_url(&self.host, "nns.host", &HTTP_SCHEMES)?;
        ValidationUtils::validate_timeout_seconds(self.timeout_seconds, "nns.timeout_seconds")
    }
}

/// Fleet registry client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    pub host: String,
    pub timeout_seconds: u64,
    /// Extra attempts on connection-level failures only.
    pub transport_retries: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:9091".to_string(),
            timeout_seconds: 3,
            transport_retries: 2,
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ConfigValidator for RegistryConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_url(&self.host, "registry.host", &HTTP_SCHEMES)?;
        ValidationUtils::validate_timeout_seconds(
            self.timeout_seconds,
            "registry.timeout_seconds",
        )?;
        if self.transport_retries > 10 {
            return Err(crate::ConfigError::Validation(
                "registry.transport_retries must be less than or equal to 10".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP delivery to nodes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Port used for every node request; 0 keeps the resolved port, if any.
    pub port: u16,
    pub timeout_seconds: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: 0,
            timeout_seconds: 5,
        }
    }
}

impl DeviceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ConfigValidator for DeviceConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_timeout_seconds(self.timeout_seconds, "device.timeout_seconds")
    }
}

/// Auxiliary node event forwarding to the notification service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotifierConfig {
    pub enabled: bool,
    pub host: String,
    pub timeout_seconds: u64,
    pub queue: String,
    pub routing_keys: Vec<String>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "http://localhost:9092".to_string(),
            timeout_seconds: 3,
            queue: "node-feeder.events".to_string(),
            routing_keys: vec!["event.cloud.*.*.node-feed".to_string()],
        }
    }
}

impl NotifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ConfigValidator for NotifierConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if !self.enabled {
            return Ok(());
        }

        ValidationUtils::validate_url(&self.host, "notifier.host", &HTTP_SCHEMES)?;
        ValidationUtils::validate_timeout_seconds(
            self.timeout_seconds,
            "notifier.timeout_seconds",
        )?;
        ValidationUtils::validate_not_empty(&self.queue, "notifier.queue")?;
        if self.routing_keys.is_empty() {
            return Err(crate::ConfigError::Validation(
                "notifier.routing_keys must contain at least one pattern".to_string(),
            ));
        }
        Ok(())
    }
}
