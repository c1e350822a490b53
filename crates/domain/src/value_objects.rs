use std::fmt;

use serde::{Deserialize, Serialize};

/// Network address of a node as reported by the address registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: Option<u16>,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host[:port]`, with `port_override` replacing the registry port
    /// unless it is zero.
    pub fn authority(&self, port_override: u16) -> String {
        let port = if port_override != 0 {
            Some(port_override)
        } else {
            self.port.filter(|p| *p != 0)
        };

        match port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority(0))
    }
}

/// Per-delivery retry bookkeeping, rebuilt from broker metadata on every
/// delivery and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAttempt {
    /// Times the message has already cycled through the waiting queue.
    pub attempt_count: u32,
    pub original_target: Option<String>,
    pub last_error: Option<String>,
}

impl DeliveryAttempt {
    pub fn new(death_count: Option<u32>, original_target: Option<String>) -> Self {
        Self {
            attempt_count: death_count.unwrap_or(0),
            original_target,
            last_error: None,
        }
    }

    /// 1-based number of the delivery currently being processed.
    pub fn delivery_number(&self) -> u32 {
        self.attempt_count.saturating_add(1)
    }

    pub fn record_error(&mut self, error: impl fmt::Display) {
        self.last_error = Some(error.to_string());
    }
}
