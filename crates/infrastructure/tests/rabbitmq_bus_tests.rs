use std::time::Duration;

use anyhow::Result;
use feeder_domain::{MessageBus, OutboundMessage, Subscription, WaitingQueue, TARGET_HEADER};
use feeder_infrastructure::RabbitMqMessageBus;
use feeder_testing_utils::RabbitMqTestContainer;
use futures::StreamExt;
use tokio::time::timeout;

fn subscription(queue: &str, ttl: Duration) -> Subscription {
    Subscription {
        queue: queue.to_string(),
        routing_keys: vec!["request.cloud.*.*.*.*.node.publish".to_string()],
        waiting: Some(WaitingQueue { ttl }),
        prefetch: 4,
        consumer_tag: format!("{queue}-test"),
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_rejected_delivery_returns_with_death_count() -> Result<()> {
    let broker = RabbitMqTestContainer::new().await?;
    let bus =
        RabbitMqMessageBus::connect(&broker.amqp_url, "amq.topic", Duration::from_secs(5)).await?;

    let mut deliveries = bus
        .subscribe(&subscription("node-feeder-it", Duration::from_secs(1)))
        .await?;

    bus.publish(
        OutboundMessage::new(
            "request.cloud.local.acme.nodes.cmd.node.publish",
            b"payload".to_vec(),
        )
        .with_header(TARGET_HEADER, "acme.*"),
    )
    .await?;

    let first = timeout(Duration::from_secs(10), deliveries.next())
        .await?
        .expect("stream ended")?;
    assert_eq!(first.death_count, None);
    assert_eq!(first.target_header(), Some("acme.*"));
    first.dead_letter().await?;

    let second = timeout(Duration::from_secs(10), deliveries.next())
        .await?
        .expect("stream ended")?;
    assert_eq!(second.death_count, Some(1));
    assert_eq!(second.payload, b"payload");
    second.ack().await?;

    bus.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_unbound_routing_key_is_not_delivered() -> Result<()> {
    let broker = RabbitMqTestContainer::new().await?;
    let bus = RabbitMqMessageBus::connect(
        &broker.amqp_url,
        "node-feeder.test",
        Duration::from_secs(5),
    )
    .await?;
    assert!(bus.is_connected());

    let mut deliveries = bus
        .subscribe(&subscription("node-feeder-unbound", Duration::from_secs(1)))
        .await?;

    bus.publish(OutboundMessage::new("event.cloud.other", b"x".to_vec()))
        .await?;

    assert!(timeout(Duration::from_secs(2), deliveries.next())
        .await
        .is_err());

    bus.close().await?;
    Ok(())
}
