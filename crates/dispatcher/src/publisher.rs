use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use feeder_domain::{
    MessageBus, NodeCommand, OutboundMessage, NODE_COMMAND_ROUTING_KEY, TARGET_HEADER,
};
use feeder_errors::{FeederError, FeederResult};

/// Publishes concrete node commands under the reserved routing key.
pub struct CommandPublisher {
    bus: Arc<dyn MessageBus>,
    publish_timeout: Duration,
}

impl CommandPublisher {
    pub fn new(bus: Arc<dyn MessageBus>, publish_timeout: Duration) -> Self {
        Self {
            bus,
            publish_timeout,
        }
    }

    pub async fn publish(&self, command: &NodeCommand) -> FeederResult<()> {
        let message = OutboundMessage::new(NODE_COMMAND_ROUTING_KEY, command.encode()?)
            .with_header(TARGET_HEADER, command.target.clone());

        tokio::time::timeout(self.publish_timeout, self.bus.publish(message))
            .await
            .map_err(|_| {
                FeederError::Timeout(format!("publishing command for {}", command.target))
            })??;

        debug!(
            target = %command.target,
            routing_key = NODE_COMMAND_ROUTING_KEY,
            "command published"
        );
        Ok(())
    }
}
