use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use feeder_errors::FeederResult;

use crate::command::TARGET_HEADER;

pub type MessageHeaders = BTreeMap<String, String>;

/// A message to publish on the service exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub headers: MessageHeaders,
}

impl OutboundMessage {
    pub fn new(routing_key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            routing_key: routing_key.into(),
            payload,
            headers: MessageHeaders::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Holding queue that re-delivers rejected messages to the exchange they came
/// from once `ttl` has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitingQueue {
    pub ttl: Duration,
}

/// Queue declaration plus bindings for one consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub queue: String,
    pub routing_keys: Vec<String>,
    pub waiting: Option<WaitingQueue>,
    pub prefetch: u16,
    pub consumer_tag: String,
}

impl Subscription {
    pub fn waiting_queue_name(&self) -> String {
        format!("{}.waiting", self.queue)
    }
}

/// Settles a single delivery with the broker.
#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    async fn ack(&self) -> FeederResult<()>;

    /// Reject without requeue so the broker dead-letters the message.
    async fn reject(&self) -> FeederResult<()>;
}

/// One message received from a subscription.
///
/// Settling methods take `self`, so a delivery is acknowledged or
/// dead-lettered exactly once.
pub struct InboundDelivery {
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub headers: MessageHeaders,
    /// Broker-supplied count of previous dead-letterings, if any.
    pub death_count: Option<u32>,
    acker: Box<dyn DeliveryAcker>,
}

impl InboundDelivery {
    pub fn new(
        routing_key: impl Into<String>,
        payload: Vec<u8>,
        headers: MessageHeaders,
        death_count: Option<u32>,
        acker: Box<dyn DeliveryAcker>,
    ) -> Self {
        Self {
            routing_key: routing_key.into(),
            payload,
            headers,
            death_count,
            acker,
        }
    }

    pub fn target_header(&self) -> Option<&str> {
        self.headers.get(TARGET_HEADER).map(String::as_str)
    }

    pub async fn ack(self) -> FeederResult<()> {
        self.acker.ack().await
    }

    pub async fn dead_letter(self) -> FeederResult<()> {
        self.acker.reject().await
    }
}

impl fmt::Debug for InboundDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundDelivery")
            .field("routing_key", &self.routing_key)
            .field("payload_len", &self.payload.len())
            .field("headers", &self.headers)
            .field("death_count", &self.death_count)
            .finish()
    }
}

pub type DeliveryStream = BoxStream<'static, FeederResult<InboundDelivery>>;

/// Broker connection shared by publishers and listeners.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, message: OutboundMessage) -> FeederResult<()>;

    /// Declare the queue (and its waiting queue, if any), bind it and start
    /// consuming.
    async fn subscribe(&self, subscription: &Subscription) -> FeederResult<DeliveryStream>;

    async fn close(&self) -> FeederResult<()>;
}
