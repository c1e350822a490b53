use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    acker::Acker,
    message::Delivery,
    options::*,
    types::{AMQPValue, FieldTable, ShortString},
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use feeder_domain::{
    DeliveryAcker, DeliveryStream, InboundDelivery, MessageBus, OutboundMessage, Subscription,
};
use feeder_errors::{FeederError, FeederResult};

use crate::amqp_headers::{death_count, field_table, string_headers};

const CONTENT_TYPE: &str = "application/octet-stream";

/// RabbitMQ 消息总线实现
///
/// 所有消息发布到同一个 topic 交换机。订阅时为每个队列单独创建通道，
/// 并在需要时声明等待队列：主队列拒绝的消息进入等待队列，TTL 到期后
/// 回到主交换机重新路由。
pub struct RabbitMqMessageBus {
    connection: Connection,
    publish_channel: Arc<Mutex<Channel>>,
    consumer_channels: Mutex<Vec<Channel>>,
    exchange: String,
    publish_timeout: Duration,
}

impl RabbitMqMessageBus {
    /// 连接 RabbitMQ 并声明主交换机
    pub async fn connect(
        uri: &str,
        exchange: &str,
        publish_timeout: Duration,
    ) -> FeederResult<Self> {
        let connection = Connection::connect(uri, ConnectionProperties::default())
            .await
            .map_err(|e| FeederError::MessageQueue(format!("连接RabbitMQ失败: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| FeederError::MessageQueue(format!("创建通道失败: {e}")))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| FeederError::MessageQueue(format!("开启发布确认失败: {e}")))?;

        declare_exchange(&channel, exchange).await?;

        info!(exchange, "成功连接到RabbitMQ");

        Ok(Self {
            connection,
            publish_channel: Arc::new(Mutex::new(channel)),
            consumer_channels: Mutex::new(Vec::new()),
            exchange: exchange.to_string(),
            publish_timeout,
        })
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// 获取连接状态
    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// 声明等待队列：TTL 到期后死信回主交换机，保持原路由键
    async fn declare_waiting_queue(
        &self,
        channel: &Channel,
        name: &str,
        ttl: Duration,
    ) -> FeederResult<()> {
        declare_exchange(channel, name).await?;

        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let mut arguments = FieldTable::default();
        arguments.insert(
            ShortString::from("x-message-ttl"),
            AMQPValue::LongLongInt(ttl_ms),
        );
        arguments.insert(
            ShortString::from("x-dead-letter-exchange"),
            AMQPValue::LongString(self.exchange.clone().into()),
        );
        declare_queue(channel, name, arguments).await?;

        channel
            .queue_bind(
                name,
                name,
                "#",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| FeederError::MessageQueue(format!("绑定等待队列 {name} 失败: {e}")))?;

        debug!(queue = name, ttl_ms, "等待队列声明成功");
        Ok(())
    }
}

#[async_trait]
impl MessageBus for RabbitMqMessageBus {
    async fn publish(&self, message: OutboundMessage) -> FeederResult<()> {
        let properties = BasicProperties::default()
            .with_delivery_mode(2) // 2 = persistent
            .with_content_type(ShortString::from(CONTENT_TYPE))
            .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
            .with_headers(field_table(&message.headers));

        let publish = async {
            let channel = self.publish_channel.lock().await;
            let confirm = channel
                .basic_publish(
                    &self.exchange,
                    &message.routing_key,
                    BasicPublishOptions::default(),
                    &message.payload,
                    properties,
                )
                .await
                .map_err(|e| {
                    FeederError::MessageQueue(format!(
                        "发布消息到 {} 失败: {e}",
                        message.routing_key
                    ))
                })?;

            // 等待确认
            let confirmation = confirm
                .await
                .map_err(|e| FeederError::MessageQueue(format!("消息发布确认失败: {e}")))?;
            if confirmation.is_nack() {
                return Err(FeederError::MessageQueue(format!(
                    "broker 拒绝了发往 {} 的消息",
                    message.routing_key
                )));
            }
            Ok(())
        };

        tokio::time::timeout(self.publish_timeout, publish)
            .await
            .map_err(|_| FeederError::Timeout(format!("发布到 {} 超时", message.routing_key)))??;

        debug!(routing_key = %message.routing_key, "消息已发布");
        Ok(())
    }

    async fn subscribe(&self, subscription: &Subscription) -> FeederResult<DeliveryStream> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| FeederError::MessageQueue(format!("创建通道失败: {e}")))?;

        channel
            .basic_qos(subscription.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| FeederError::MessageQueue(format!("设置预取数量失败: {e}")))?;

        let mut arguments = FieldTable::default();
        if let Some(waiting) = subscription.waiting {
            let waiting_name = subscription.waiting_queue_name();
            self.declare_waiting_queue(&channel, &waiting_name, waiting.ttl)
                .await?;
            arguments.insert(
                ShortString::from("x-dead-letter-exchange"),
                AMQPValue::LongString(waiting_name.into()),
            );
        }
        declare_queue(&channel, &subscription.queue, arguments).await?;

        for routing_key in &subscription.routing_keys {
            channel
                .queue_bind(
                    &subscription.queue,
                    &self.exchange,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    FeederError::MessageQueue(format!(
                        "绑定队列 {} 到 {routing_key} 失败: {e}",
                        subscription.queue
                    ))
                })?;
        }

        let consumer = channel
            .basic_consume(
                &subscription.queue,
                &subscription.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| FeederError::MessageQueue(format!("创建消费者失败: {e}")))?;

        info!(
            queue = %subscription.queue,
            routing_keys = ?subscription.routing_keys,
            prefetch = subscription.prefetch,
            "开始消费队列"
        );

        self.consumer_channels.lock().await.push(channel);

        let queue = subscription.queue.clone();
        let stream = consumer.map(move |result| {
            result
                .map(|delivery| to_inbound(delivery, &queue))
                .map_err(|e| FeederError::MessageQueue(format!("接收消息失败: {e}")))
        });

        Ok(stream.boxed())
    }

    async fn close(&self) -> FeederResult<()> {
        for channel in self.consumer_channels.lock().await.drain(..) {
            if let Err(e) = channel.close(200, "正常关闭").await {
                warn!("关闭消费通道失败: {e}");
            }
        }

        self.connection
            .close(200, "正常关闭")
            .await
            .map_err(|e| FeederError::MessageQueue(format!("关闭连接失败: {e}")))?;

        info!("RabbitMQ连接已关闭");
        Ok(())
    }
}

fn to_inbound(delivery: Delivery, queue: &str) -> InboundDelivery {
    let table = delivery.properties.headers().clone().unwrap_or_default();
    let acker = LapinAcker {
        acker: delivery.acker,
    };

    InboundDelivery::new(
        delivery.routing_key.as_str(),
        delivery.data,
        string_headers(&table),
        death_count(&table, queue),
        Box::new(acker),
    )
}

/// 内置 `amq.*` 交换机不能重新声明
async fn declare_exchange(channel: &Channel, name: &str) -> FeederResult<()> {
    if name.starts_with("amq.") {
        return Ok(());
    }

    channel
        .exchange_declare(
            name,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| FeederError::MessageQueue(format!("声明交换机 {name} 失败: {e}")))
}

async fn declare_queue(channel: &Channel, name: &str, arguments: FieldTable) -> FeederResult<()> {
    channel
        .queue_declare(
            name,
            QueueDeclareOptions {
                durable: true,
                exclusive: false,
                auto_delete: false,
                ..Default::default()
            },
            arguments,
        )
        .await
        .map_err(|e| FeederError::MessageQueue(format!("声明队列 {name} 失败: {e}")))?;

    debug!("队列 {} 声明成功", name);
    Ok(())
}

struct LapinAcker {
    acker: Acker,
}

#[async_trait]
impl DeliveryAcker for LapinAcker {
    async fn ack(&self) -> FeederResult<()> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| FeederError::MessageQueue(format!("确认消息失败: {e}")))
    }

    async fn reject(&self) -> FeederResult<()> {
        self.acker
            .reject(BasicRejectOptions { requeue: false })
            .await
            .map(|_| ())
            .map_err(|e| FeederError::MessageQueue(format!("拒绝消息失败: {e}")))
    }
}
