use serde::{Deserialize, Serialize};

use feeder_errors::FeederResult;

/// Node event relayed to the notification service on the auxiliary path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeNotification {
    pub node_id: String,
    pub severity: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub service_name: String,
    pub epoch_time: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl NodeNotification {
    pub fn decode(payload: &[u8]) -> FeederResult<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn encode(&self) -> FeederResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
