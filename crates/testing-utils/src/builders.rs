//! Test data builders for commands, notifications and deliveries

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use feeder_domain::{
    DeliveryAcker, HttpMethod, InboundDelivery, MessageHeaders, NodeCommand, NodeNotification,
    NODE_COMMAND_ROUTING_KEY, TARGET_HEADER,
};
use feeder_errors::FeederResult;

pub const TEST_NODE_A: &str = "uk-sa2024-hnode-v1-0a3f";
pub const TEST_NODE_B: &str = "uk-sa2024-tnode-v1-1b2c";

/// Builder for creating test NodeCommand values
pub struct CommandBuilder {
    command: NodeCommand,
}

impl CommandBuilder {
    pub fn new(target: &str) -> Self {
        Self {
            command: NodeCommand::new(target, HttpMethod::Post, "/v1/reboot", Vec::new()),
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.command.http_method = method;
        self
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.command.path = path.to_string();
        self
    }

    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.command.body = body.to_vec();
        self
    }

    pub fn build(self) -> NodeCommand {
        self.command
    }
}

/// Builder for creating test NodeNotification values
pub struct NotificationBuilder {
    notification: NodeNotification,
}

impl NotificationBuilder {
    pub fn new(node_id: &str) -> Self {
        Self {
            notification: NodeNotification {
                node_id: node_id.to_string(),
                severity: "low".to_string(),
                kind: "event".to_string(),
                service_name: "node-agent".to_string(),
                epoch_time: 1_700_000_000,
                description: String::new(),
                details: serde_json::Value::Null,
            },
        }
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.notification.kind = kind.to_string();
        self
    }

    pub fn with_severity(mut self, severity: &str) -> Self {
        self.notification.severity = severity.to_string();
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.notification.details = details;
        self
    }

    pub fn build(self) -> NodeNotification {
        self.notification
    }
}

/// How a test delivery was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Acked,
    Rejected,
}

/// Observes settlement of a [`TestDelivery`].
#[derive(Debug, Clone, Default)]
pub struct SettleRecorder {
    settled: Arc<Mutex<Vec<Settled>>>,
}

impl SettleRecorder {
    /// Every settlement in order; a correctly handled delivery has exactly one.
    pub fn settlements(&self) -> Vec<Settled> {
        self.settled.lock().unwrap().clone()
    }

    pub fn was_acked(&self) -> bool {
        self.settlements() == [Settled::Acked]
    }

    pub fn was_rejected(&self) -> bool {
        self.settlements() == [Settled::Rejected]
    }
}

struct RecordingAcker {
    recorder: SettleRecorder,
    hang: bool,
}

impl RecordingAcker {
    async fn settle(&self, settled: Settled) -> FeederResult<()> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.recorder.settled.lock().unwrap().push(settled);
        Ok(())
    }
}

#[async_trait]
impl DeliveryAcker for RecordingAcker {
    async fn ack(&self) -> FeederResult<()> {
        self.settle(Settled::Acked).await
    }

    async fn reject(&self) -> FeederResult<()> {
        self.settle(Settled::Rejected).await
    }
}

/// Builder for hand-made broker deliveries
pub struct TestDelivery {
    routing_key: String,
    payload: Vec<u8>,
    headers: MessageHeaders,
    death_count: Option<u32>,
    hang_on_settle: bool,
}

impl TestDelivery {
    /// Delivery of an encoded command, tagged with its target header.
    pub fn command(command: &NodeCommand) -> Self {
        let mut headers = MessageHeaders::new();
        headers.insert(TARGET_HEADER.to_string(), command.target.clone());
        Self {
            routing_key: NODE_COMMAND_ROUTING_KEY.to_string(),
            payload: command.encode().unwrap(),
            headers,
            death_count: None,
            hang_on_settle: false,
        }
    }

    pub fn raw(routing_key: &str, payload: &[u8]) -> Self {
        Self {
            routing_key: routing_key.to_string(),
            payload: payload.to_vec(),
            headers: MessageHeaders::new(),
            death_count: None,
            hang_on_settle: false,
        }
    }

    pub fn with_death_count(mut self, count: u32) -> Self {
        self.death_count = Some(count);
        self
    }

    /// Ack and reject never complete, like a stalled broker channel.
    pub fn hanging_on_settle(mut self) -> Self {
        self.hang_on_settle = true;
        self
    }

    pub fn build(self) -> (InboundDelivery, SettleRecorder) {
        let recorder = SettleRecorder::default();
        let acker = RecordingAcker {
            recorder: recorder.clone(),
            hang: self.hang_on_settle,
        };
        let delivery = InboundDelivery::new(
            self.routing_key,
            self.payload,
            self.headers,
            self.death_count,
            Box::new(acker),
        );
        (delivery, recorder)
    }
}
