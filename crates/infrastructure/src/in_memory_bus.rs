use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

use feeder_domain::{
    topic_matches, DeliveryAcker, DeliveryStream, InboundDelivery, MessageBus, MessageHeaders,
    OutboundMessage, Subscription, WaitingQueue,
};
use feeder_errors::{FeederError, FeederResult};

/// 内存消息总线实现
///
/// 复刻 topic 交换机加等待队列的语义：发布的消息按绑定模式投递到每个匹配的队列；
/// 被拒绝的消息在等待 TTL 后以死信次数加一重新进入交换机。没有等待队列的
/// 订阅拒绝消息时直接丢弃。适用于测试与嵌入式运行。
#[derive(Clone, Default)]
pub struct InMemoryMessageBus {
    state: Arc<Mutex<BusState>>,
}

#[derive(Default)]
struct BusState {
    queues: HashMap<String, QueueState>,
    published: Vec<OutboundMessage>,
    settlements: Vec<Settlement>,
    /// 剩余允许成功的发布次数，`None` 表示不限制
    publish_budget: Option<usize>,
    closed: bool,
}

struct QueueState {
    bindings: Vec<String>,
    waiting: Option<WaitingQueue>,
    sender: mpsc::UnboundedSender<FeederResult<InboundDelivery>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleAction {
    Acked,
    DeadLettered,
}

/// 一次消息确认记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub queue: String,
    pub routing_key: String,
    pub target: Option<String>,
    pub death_count: Option<u32>,
    pub action: SettleAction,
}

#[derive(Clone)]
struct Envelope {
    routing_key: String,
    payload: Vec<u8>,
    headers: MessageHeaders,
    death_count: Option<u32>,
}

impl InMemoryMessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后只允许 `count` 次发布成功，其余发布返回错误
    pub fn fail_publishes_after(&self, count: usize) {
        self.lock().publish_budget = Some(count);
    }

    /// 所有成功发布的消息
    pub fn published(&self) -> Vec<OutboundMessage> {
        self.lock().published.clone()
    }

    /// 所有确认或死信记录
    pub fn settlements(&self) -> Vec<Settlement> {
        self.lock().settlements.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<BusState>) -> MutexGuard<'_, BusState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 按路由键投递到所有匹配队列，返回匹配的队列数
fn route(state: &Arc<Mutex<BusState>>, envelope: &Envelope) -> usize {
    let targets: Vec<(String, mpsc::UnboundedSender<FeederResult<InboundDelivery>>)> = {
        let guard = lock_state(state);
        guard
            .queues
            .iter()
            .filter(|(_, queue)| {
                queue
                    .bindings
                    .iter()
                    .any(|pattern| topic_matches(pattern, &envelope.routing_key))
            })
            .map(|(name, queue)| (name.clone(), queue.sender.clone()))
            .collect()
    };

    for (queue, sender) in &targets {
        let acker = MemoryAcker {
            state: Arc::clone(state),
            queue: queue.clone(),
            envelope: envelope.clone(),
        };
        let delivery = InboundDelivery::new(
            envelope.routing_key.clone(),
            envelope.payload.clone(),
            envelope.headers.clone(),
            envelope.death_count,
            Box::new(acker),
        );
        if sender.send(Ok(delivery)).is_err() {
            debug!(queue = %queue, "队列消费端已关闭，消息丢弃");
        }
    }

    targets.len()
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, message: OutboundMessage) -> FeederResult<()> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(FeederError::MessageQueue("消息总线已关闭".to_string()));
            }
            if let Some(budget) = state.publish_budget.as_mut() {
                if *budget == 0 {
                    return Err(FeederError::MessageQueue(format!(
                        "发布到 {} 失败",
                        message.routing_key
                    )));
                }
                *budget -= 1;
            }
            state.published.push(message.clone());
        }

        let envelope = Envelope {
            routing_key: message.routing_key,
            payload: message.payload,
            headers: message.headers,
            death_count: None,
        };
        let matched = route(&self.state, &envelope);
        debug!(routing_key = %envelope.routing_key, matched, "消息已发布");
        Ok(())
    }

    async fn subscribe(&self, subscription: &Subscription) -> FeederResult<DeliveryStream> {
        let (sender, receiver) = mpsc::unbounded_channel();
        {
            let mut state = self.lock();
            if state.closed {
                return Err(FeederError::MessageQueue("消息总线已关闭".to_string()));
            }
            state.queues.insert(
                subscription.queue.clone(),
                QueueState {
                    bindings: subscription.routing_keys.clone(),
                    waiting: subscription.waiting,
                    sender,
                },
            );
        }

        info!(queue = %subscription.queue, "开始消费内存队列");

        let stream = stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|item| (item, receiver))
        });
        Ok(stream.boxed())
    }

    async fn close(&self) -> FeederResult<()> {
        let mut state = self.lock();
        state.closed = true;
        state.queues.clear();
        Ok(())
    }
}

struct MemoryAcker {
    state: Arc<Mutex<BusState>>,
    queue: String,
    envelope: Envelope,
}

impl MemoryAcker {
    fn record(&self, action: SettleAction) -> Option<WaitingQueue> {
        let mut state = lock_state(&self.state);
        state.settlements.push(Settlement {
            queue: self.queue.clone(),
            routing_key: self.envelope.routing_key.clone(),
            target: self
                .envelope
                .headers
                .get(feeder_domain::TARGET_HEADER)
                .cloned(),
            death_count: self.envelope.death_count,
            action,
        });
        state
            .queues
            .get(&self.queue)
            .and_then(|queue| queue.waiting)
    }
}

#[async_trait]
impl DeliveryAcker for MemoryAcker {
    async fn ack(&self) -> FeederResult<()> {
        self.record(SettleAction::Acked);
        Ok(())
    }

    async fn reject(&self) -> FeederResult<()> {
        let Some(waiting) = self.record(SettleAction::DeadLettered) else {
            return Ok(());
        };

        let state = Arc::clone(&self.state);
        let mut envelope = self.envelope.clone();
        envelope.death_count = Some(envelope.death_count.unwrap_or(0) + 1);
        tokio::spawn(async move {
            tokio::time::sleep(waiting.ttl).await;
            if !lock_state(&state).closed {
                route(&state, &envelope);
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn subscription(queue: &str, pattern: &str, waiting: Option<WaitingQueue>) -> Subscription {
        Subscription {
            queue: queue.to_string(),
            routing_keys: vec![pattern.to_string()],
            waiting,
            prefetch: 1,
            consumer_tag: format!("{queue}-consumer"),
        }
    }

    #[tokio::test]
    async fn test_routes_by_topic_pattern() {
        let bus = InMemoryMessageBus::new();
        let mut commands = bus
            .subscribe(&subscription("commands", "request.*.publish", None))
            .await
            .unwrap();

        bus.publish(OutboundMessage::new("event.node", b"ignored".to_vec()))
            .await
            .unwrap();
        bus.publish(OutboundMessage::new("request.node.publish", b"hello".to_vec()))
            .await
            .unwrap();

        let delivery = commands.next().await.unwrap().unwrap();
        assert_eq!(delivery.payload, b"hello");
        assert_eq!(delivery.death_count, None);
        delivery.ack().await.unwrap();

        assert_eq!(bus.published().len(), 2);
        let settlements = bus.settlements();
        assert_eq!(settlements.len(), 1);
        assert_eq!(settlements[0].action, SettleAction::Acked);
    }

    #[tokio::test]
    async fn test_rejected_message_returns_after_ttl_with_death_count() {
        let bus = InMemoryMessageBus::new();
        let waiting = WaitingQueue {
            ttl: Duration::from_millis(20),
        };
        let mut commands = bus
            .subscribe(&subscription("commands", "#", Some(waiting)))
            .await
            .unwrap();

        bus.publish(OutboundMessage::new("a.b", b"retry-me".to_vec()).with_header("k", "v"))
            .await
            .unwrap();

        let first = commands.next().await.unwrap().unwrap();
        first.dead_letter().await.unwrap();

        let second = commands.next().await.unwrap().unwrap();
        assert_eq!(second.death_count, Some(1));
        assert_eq!(second.headers.get("k").map(String::as_str), Some("v"));
        second.dead_letter().await.unwrap();

        let third = commands.next().await.unwrap().unwrap();
        assert_eq!(third.death_count, Some(2));
    }

    #[tokio::test]
    async fn test_publish_budget_and_close() {
        let bus = InMemoryMessageBus::new();
        bus.fail_publishes_after(1);

        assert!(bus.publish(OutboundMessage::new("a", vec![])).await.is_ok());
        assert!(bus.publish(OutboundMessage::new("a", vec![])).await.is_err());

        bus.close().await.unwrap();
        assert!(bus.is_closed());
        assert!(bus
            .subscribe(&subscription("q", "#", None))
            .await
            .is_err());
    }
}
