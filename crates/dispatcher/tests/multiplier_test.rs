use std::sync::Arc;
use std::time::Duration;

use feeder_dispatcher::{CommandPublisher, RequestMultiplier};
use feeder_domain::{NodeCommand, NODE_COMMAND_ROUTING_KEY, TARGET_HEADER};
use feeder_errors::FeederError;
use feeder_infrastructure::InMemoryMessageBus;
use feeder_testing_utils::{CommandBuilder, MockFleetRegistry};

fn multiplier(registry: &MockFleetRegistry, bus: &InMemoryMessageBus) -> RequestMultiplier {
    let publisher = CommandPublisher::new(Arc::new(bus.clone()), Duration::from_secs(1));
    RequestMultiplier::new(Arc::new(registry.clone()), Arc::new(publisher))
}

fn published_targets(bus: &InMemoryMessageBus) -> Vec<String> {
    bus.published()
        .iter()
        .map(|message| NodeCommand::decode(&message.payload).unwrap().target)
        .collect()
}

#[tokio::test]
async fn test_wildcard_publishes_one_command_per_free_node() {
    let registry = MockFleetRegistry::new().with_org("acme", &["nodeA", "nodeB"]);
    let bus = InMemoryMessageBus::new();
    let command = CommandBuilder::new("acme.*")
        .with_path("/v1/reboot")
        .with_body(b"{}")
        .build();

    let published = multiplier(&registry, &bus).process(&command).await.unwrap();

    assert_eq!(published, 2);
    assert_eq!(published_targets(&bus), vec!["acme.nodeA", "acme.nodeB"]);
    for message in bus.published() {
        assert_eq!(message.routing_key, NODE_COMMAND_ROUTING_KEY);
        let child = NodeCommand::decode(&message.payload).unwrap();
        assert_eq!(message.headers.get(TARGET_HEADER), Some(&child.target));
        assert_eq!(child.http_method, command.http_method);
        assert_eq!(child.path, command.path);
        assert_eq!(child.body, command.body);
    }
    assert_eq!(registry.calls(), vec!["acme"]);
}

#[tokio::test]
async fn test_org_without_free_nodes_publishes_nothing() {
    let registry = MockFleetRegistry::new();
    let bus = InMemoryMessageBus::new();

    let published = multiplier(&registry, &bus)
        .process(&CommandBuilder::new("empty.*").build())
        .await
        .unwrap();

    assert_eq!(published, 0);
    assert!(bus.published().is_empty());
}

#[tokio::test]
async fn test_partial_wildcard_is_rejected_without_lookup() {
    let registry = MockFleetRegistry::new().with_org("acme", &["nodeA"]);
    let bus = InMemoryMessageBus::new();

    let err = multiplier(&registry, &bus)
        .process(&CommandBuilder::new("acme.network-*").build())
        .await
        .unwrap_err();

    assert!(matches!(err, FeederError::UnsupportedWildcard(_)));
    assert!(!err.is_retryable());
    assert!(registry.calls().is_empty());
}

#[tokio::test]
async fn test_malformed_target_is_rejected() {
    let registry = MockFleetRegistry::new();
    let bus = InMemoryMessageBus::new();

    let err = multiplier(&registry, &bus)
        .process(&CommandBuilder::new("*").build())
        .await
        .unwrap_err();

    assert!(matches!(err, FeederError::InvalidTarget(_)));
    assert!(registry.calls().is_empty());
}

#[tokio::test]
async fn test_publish_failure_aborts_without_rollback() {
    let registry = MockFleetRegistry::new().with_org("acme", &["nodeA", "nodeB", "nodeC"]);
    let bus = InMemoryMessageBus::new();
    bus.fail_publishes_after(1);

    let err = multiplier(&registry, &bus)
        .process(&CommandBuilder::new("acme.*").build())
        .await
        .unwrap_err();

    match err {
        FeederError::PublishFailed {
            failed_target,
            published,
            total,
            ..
        } => {
            assert_eq!(failed_target, "acme.nodeB");
            assert_eq!(published, 1);
            assert_eq!(total, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(published_targets(&bus), vec!["acme.nodeA"]);
}

#[tokio::test]
async fn test_registry_failure_is_retryable() {
    let registry = MockFleetRegistry::new().with_org("acme", &["nodeA"]);
    registry.fail_next(FeederError::Registry("deadline exceeded".to_string()));
    let bus = InMemoryMessageBus::new();

    let err = multiplier(&registry, &bus)
        .process(&CommandBuilder::new("acme.*").build())
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert!(bus.published().is_empty());
}
