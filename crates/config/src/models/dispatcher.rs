use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Deliveries processed concurrently; also the broker prefetch.
    pub worker_count: usize,
    pub shutdown_grace_seconds: u64,
    /// Log device response bodies at debug level.
    pub debug_mode: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_count: 10,
            shutdown_grace_seconds: 30,
            debug_mode: false,
        }
    }
}

impl DispatcherConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

impl ConfigValidator for DispatcherConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        // prefetch is a u16 on the wire
        ValidationUtils::validate_count(
            self.worker_count,
            "dispatcher.worker_count",
            u16::MAX as usize,
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.shutdown_grace_seconds,
            "dispatcher.shutdown_grace_seconds",
        )
    }
}
