use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, warn};

use feeder_domain::{FleetRegistry, NodeCommand, TargetParts, WILDCARD_SELECTOR};
use feeder_errors::{FeederError, FeederResult};

use crate::metrics::FANOUT_PUBLISHED_TOTAL;
use crate::publisher::CommandPublisher;

/// Expands a full-org wildcard command into one command per free node.
///
/// Fan-out is not atomic: when a publish fails, commands already published
/// stay published and are delivered independently.
pub struct RequestMultiplier {
    registry: Arc<dyn FleetRegistry>,
    publisher: Arc<CommandPublisher>,
}

impl RequestMultiplier {
    pub fn new(registry: Arc<dyn FleetRegistry>, publisher: Arc<CommandPublisher>) -> Self {
        Self {
            registry,
            publisher,
        }
    }

    /// Returns the number of commands published.
    pub async fn process(&self, command: &NodeCommand) -> FeederResult<usize> {
        let parts = TargetParts::split(&command.target)?;
        if parts.selector != WILDCARD_SELECTOR {
            return Err(FeederError::UnsupportedWildcard(parts.selector.to_string()));
        }

        let nodes = self.registry.free_nodes(parts.org).await?;
        if nodes.is_empty() {
            info!(target = %command.target, "no free nodes to fan out to");
            return Ok(0);
        }

        let total = nodes.len();
        for (published, node) in nodes.iter().enumerate() {
            let child = command.retarget(format!("{}.{}", parts.org, node));
            if let Err(e) = self.publisher.publish(&child).await {
                warn!(
                    target = %command.target,
                    failed_target = %child.target,
                    published,
                    total,
                    "fan-out aborted: {e}"
                );
                return Err(FeederError::PublishFailed {
                    failed_target: child.target,
                    published,
                    total,
                    reason: e.to_string(),
                });
            }
            counter!(FANOUT_PUBLISHED_TOTAL).increment(1);
            debug!(target = %child.target, "fan-out command published");
        }

        info!(target = %command.target, published = total, "wildcard command expanded");
        Ok(total)
    }
}
