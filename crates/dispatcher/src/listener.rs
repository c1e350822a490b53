use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use metrics::counter;
use tokio::sync::{broadcast, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

use feeder_domain::{
    CommandExecutor, DeliveryAttempt, InboundDelivery, MessageBus, NodeCommand, Subscription,
    TargetParts, WaitingQueue, NODE_COMMAND_ROUTING_KEY,
};
use feeder_errors::{FeederError, FeederResult};

use crate::metrics::DELIVERIES_TOTAL;
use crate::multiplier::RequestMultiplier;
use crate::retry_policy::{DeliveryOutcome, RetryPolicy};

/// Listener lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Subscribed,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSettings {
    pub queue: String,
    /// Inbound command patterns; the concrete-command key is always added.
    pub routing_keys: Vec<String>,
    pub waiting_ttl: Duration,
    pub worker_count: u16,
    pub consumer_tag: String,
    pub shutdown_grace: Duration,
    /// Deadline for acknowledging or dead-lettering one delivery.
    pub settle_timeout: Duration,
}

/// Consumes node commands and settles every delivery exactly once.
///
/// Wildcard targets go to the [`RequestMultiplier`], everything else to the
/// [`CommandExecutor`]. Permanent failures are acknowledged, transient ones
/// are rejected into the waiting queue until the [`RetryPolicy`] gives up.
pub struct RetryingDispatchListener {
    bus: Arc<dyn MessageBus>,
    executor: Arc<dyn CommandExecutor>,
    multiplier: Arc<RequestMultiplier>,
    policy: RetryPolicy,
    settings: ListenerSettings,
    state: RwLock<ListenerState>,
}

impl RetryingDispatchListener {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        executor: Arc<dyn CommandExecutor>,
        multiplier: Arc<RequestMultiplier>,
        policy: RetryPolicy,
        settings: ListenerSettings,
    ) -> Self {
        Self {
            bus,
            executor,
            multiplier,
            policy,
            settings,
            state: RwLock::new(ListenerState::Idle),
        }
    }

    pub async fn state(&self) -> ListenerState {
        *self.state.read().await
    }

    pub fn subscription(&self) -> Subscription {
        let mut routing_keys = self.settings.routing_keys.clone();
        if !routing_keys.iter().any(|key| key == NODE_COMMAND_ROUTING_KEY) {
            routing_keys.push(NODE_COMMAND_ROUTING_KEY.to_string());
        }

        Subscription {
            queue: self.settings.queue.clone(),
            routing_keys,
            waiting: Some(WaitingQueue {
                ttl: self.settings.waiting_ttl,
            }),
            prefetch: self.settings.worker_count,
            consumer_tag: self.settings.consumer_tag.clone(),
        }
    }

    /// Subscribe and process deliveries until `shutdown` fires or the
    /// delivery stream ends. A subscription failure is returned as is.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> FeederResult<()> {
        let subscription = self.subscription();
        let mut deliveries = self.bus.subscribe(&subscription).await.inspect_err(|e| {
            error!(queue = %subscription.queue, "command subscription failed: {e}");
        })?;
        *self.state.write().await = ListenerState::Subscribed;
        info!(
            queue = %subscription.queue,
            workers = self.settings.worker_count,
            "dispatch listener subscribed"
        );

        let workers = usize::from(self.settings.worker_count.max(1));
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut result = Ok(());

        loop {
            let permit = tokio::select! {
                _ = shutdown.recv() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => permit
                    .map_err(|e| FeederError::Internal(format!("worker pool closed: {e}")))?,
            };

            let delivery = tokio::select! {
                _ = shutdown.recv() => break,
                next = deliveries.next() => next,
            };

            match delivery {
                Some(Ok(delivery)) => {
                    let listener = Arc::clone(&self);
                    tokio::spawn(async move {
                        let _permit = permit;
                        listener.handle_delivery(delivery).await;
                    });
                }
                Some(Err(e)) => {
                    error!(queue = %subscription.queue, "command stream failed: {e}");
                    result = Err(e);
                    break;
                }
                None => {
                    warn!(queue = %subscription.queue, "command stream ended");
                    break;
                }
            }
        }

        self.drain(&semaphore, workers).await;
        *self.state.write().await = ListenerState::Stopped;
        info!(queue = %subscription.queue, "dispatch listener stopped");
        result
    }

    /// Wait for in-flight deliveries, bounded by the shutdown grace period.
    async fn drain(&self, semaphore: &Semaphore, workers: usize) {
        let all = u32::try_from(workers).unwrap_or(u32::MAX);
        let grace = self.settings.shutdown_grace;
        match tokio::time::timeout(grace, semaphore.acquire_many(all)).await {
            Ok(_) => debug!("in-flight deliveries drained"),
            Err(_) => warn!(
                grace = ?grace,
                in_flight = workers - semaphore.available_permits(),
                "shutdown grace elapsed with deliveries in flight"
            ),
        }
    }

    /// Process one delivery and settle it with the broker.
    pub async fn handle_delivery(&self, delivery: InboundDelivery) -> DeliveryOutcome {
        let routing_key = delivery.routing_key.clone();
        let mut attempt = DeliveryAttempt::new(
            delivery.death_count,
            delivery.target_header().map(str::to_string),
        );

        let command = match NodeCommand::decode(&delivery.payload) {
            Ok(command) => command,
            Err(e) => {
                warn!(
                    target = ?attempt.original_target,
                    routing_key = %routing_key,
                    "discarding undecodable command: {e}"
                );
                return self
                    .settle(delivery, DeliveryOutcome::Discarded, &routing_key)
                    .await;
            }
        };

        let outcome = match self.dispatch(&command).await {
            Ok(()) => DeliveryOutcome::Acked,
            Err(e) => {
                attempt.record_error(&e);
                self.failure_outcome(&command, &routing_key, &attempt, &e)
            }
        };

        self.settle(delivery, outcome, &routing_key).await
    }

    async fn dispatch(&self, command: &NodeCommand) -> FeederResult<()> {
        let parts = TargetParts::split(&command.target)?;
        if !parts.is_wildcard() {
            return self.executor.execute(command).await.map(|_| ());
        }

        match self.multiplier.process(command).await {
            Ok(_) => Ok(()),
            // Nothing was published, so a retry cannot duplicate fan-out.
            Err(e) if e.is_retryable() && published_before_failure(&e) == 0 => Err(e),
            Err(e) => {
                warn!(
                    target = %command.target,
                    "wildcard expansion failed, acknowledging original: {e}"
                );
                Ok(())
            }
        }
    }

    fn failure_outcome(
        &self,
        command: &NodeCommand,
        routing_key: &str,
        attempt: &DeliveryAttempt,
        error: &FeederError,
    ) -> DeliveryOutcome {
        let outcome = self.policy.outcome_for(error, attempt);
        match outcome {
            DeliveryOutcome::Acked if error.is_fatal() => error!(
                target = %command.target,
                routing_key,
                kind = error.kind(),
                "command failed on service misconfiguration: {error}"
            ),
            DeliveryOutcome::Acked => warn!(
                target = %command.target,
                routing_key,
                kind = error.kind(),
                "command failed permanently: {error}"
            ),
            DeliveryOutcome::Retrying => warn!(
                target = %command.target,
                routing_key,
                delivery = attempt.delivery_number(),
                max_retries = self.policy.max_retry_count,
                "command failed, scheduling retry: {error}"
            ),
            DeliveryOutcome::Discarded => error!(
                target = %command.target,
                routing_key,
                delivery = attempt.delivery_number(),
                max_retries = self.policy.max_retry_count,
                last_error = ?attempt.last_error,
                "retries exhausted, dropping command"
            ),
        }
        outcome
    }

    async fn settle(
        &self,
        delivery: InboundDelivery,
        outcome: DeliveryOutcome,
        routing_key: &str,
    ) -> DeliveryOutcome {
        let settling = async {
            match outcome {
                DeliveryOutcome::Acked | DeliveryOutcome::Discarded => delivery.ack().await,
                DeliveryOutcome::Retrying => delivery.dead_letter().await,
            }
        };
        match tokio::time::timeout(self.settings.settle_timeout, settling).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(routing_key, outcome = %outcome, "failed to settle delivery: {e}"),
            Err(_) => error!(
                routing_key,
                outcome = %outcome,
                timeout = ?self.settings.settle_timeout,
                "settling delivery timed out"
            ),
        }

        counter!(DELIVERIES_TOTAL, "outcome" => outcome.as_str()).increment(1);
        outcome
    }
}

fn published_before_failure(error: &FeederError) -> usize {
    match error {
        FeederError::PublishFailed { published, .. } => *published,
        _ => 0,
    }
}
