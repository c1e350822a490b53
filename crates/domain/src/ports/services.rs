use async_trait::async_trait;

use feeder_errors::FeederResult;

use crate::command::NodeCommand;
use crate::events::NodeNotification;
use crate::node_id::NodeId;
use crate::value_objects::NodeAddress;

/// Looks up the current network address of a node.
///
/// Returns `FeederError::NodeNotFound` when the registry knows no address,
/// any other error for transport or registry failures.
#[async_trait]
pub trait NodeAddressResolver: Send + Sync {
    async fn resolve(&self, node_id: &NodeId) -> FeederResult<NodeAddress>;
}

/// Read-only view of fleet membership.
#[async_trait]
pub trait FleetRegistry: Send + Sync {
    /// Identifiers of nodes in `org` currently marked free.
    async fn free_nodes(&self, org: &str) -> FeederResult<Vec<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub url: String,
    pub status: u16,
}

/// Delivers one concrete command to its node.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &NodeCommand) -> FeederResult<ExecutionReport>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &NodeNotification) -> FeederResult<()>;
}
