use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use metrics::counter;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use feeder_domain::{InboundDelivery, MessageBus, NodeNotification, NotificationSink, Subscription};
use feeder_errors::FeederResult;

use crate::metrics::NOTIFICATIONS_TOTAL;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierSettings {
    pub queue: String,
    pub routing_keys: Vec<String>,
    pub prefetch: u16,
    pub consumer_tag: String,
    pub ack_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    Forwarded,
    Failed,
    Malformed,
}

impl NotificationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationOutcome::Forwarded => "forwarded",
            NotificationOutcome::Failed => "failed",
            NotificationOutcome::Malformed => "malformed",
        }
    }
}

/// Relays node events to the notification service.
///
/// Runs on its own queue with no waiting queue: every delivery is
/// acknowledged whatever the outcome.
pub struct EventNotifier {
    bus: Arc<dyn MessageBus>,
    sink: Arc<dyn NotificationSink>,
    settings: NotifierSettings,
}

impl EventNotifier {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        sink: Arc<dyn NotificationSink>,
        settings: NotifierSettings,
    ) -> Self {
        Self {
            bus,
            sink,
            settings,
        }
    }

    pub fn subscription(&self) -> Subscription {
        Subscription {
            queue: self.settings.queue.clone(),
            routing_keys: self.settings.routing_keys.clone(),
            waiting: None,
            prefetch: self.settings.prefetch,
            consumer_tag: self.settings.consumer_tag.clone(),
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> FeederResult<()> {
        let subscription = self.subscription();
        let mut deliveries = self.bus.subscribe(&subscription).await?;
        info!(queue = %subscription.queue, "event notifier subscribed");

        loop {
            let next = tokio::select! {
                _ = shutdown.recv() => break,
                next = deliveries.next() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    self.handle_delivery(delivery).await;
                }
                Some(Err(e)) => {
                    error!(queue = %subscription.queue, "event stream failed: {e}");
                    return Err(e);
                }
                None => break,
            }
        }

        info!(queue = %subscription.queue, "event notifier stopped");
        Ok(())
    }

    pub async fn handle_delivery(&self, delivery: InboundDelivery) -> NotificationOutcome {
        let outcome = match NodeNotification::decode(&delivery.payload) {
            Ok(notification) => match self.sink.notify(&notification).await {
                Ok(()) => {
                    debug!(
                        node_id = %notification.node_id,
                        kind = %notification.kind,
                        "event forwarded"
                    );
                    NotificationOutcome::Forwarded
                }
                Err(e) => {
                    warn!(
                        node_id = %notification.node_id,
                        routing_key = %delivery.routing_key,
                        "failed to forward event: {e}"
                    );
                    NotificationOutcome::Failed
                }
            },
            Err(e) => {
                warn!(routing_key = %delivery.routing_key, "dropping malformed event: {e}");
                NotificationOutcome::Malformed
            }
        };

        let routing_key = delivery.routing_key.clone();
        match tokio::time::timeout(self.settings.ack_timeout, delivery.ack()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(routing_key = %routing_key, "failed to acknowledge event: {e}"),
            Err(_) => error!(routing_key = %routing_key, "acknowledging event timed out"),
        }

        counter!(NOTIFICATIONS_TOTAL, "result" => outcome.as_str()).increment(1);
        outcome
    }
}
