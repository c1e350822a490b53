use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use feeder_config::AppConfig;
use feeder_dispatcher::{CommandPublisher, ListenerState};
use feeder_domain::{MessageBus, NodeCommand, OutboundMessage, TARGET_HEADER};
use feeder_infrastructure::{InMemoryMessageBus, SettleAction};
use feeder_testing_utils::{
    CommandBuilder, MockAddressResolver, MockFleetRegistry, MockNotificationSink,
    NotificationBuilder, StubDevice, TestEnv, TEST_NODE_A, TEST_NODE_B,
};
use node_feeder::app::{Application, Services};

struct RunningApp {
    app: Arc<Application>,
    bus: InMemoryMessageBus,
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl RunningApp {
    async fn start(config: AppConfig, services: Services, bus: InMemoryMessageBus) -> Self {
        let app = Arc::new(Application::with_services(&config, services).unwrap());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = {
            let app = Arc::clone(&app);
            tokio::spawn(async move { app.run(shutdown_rx).await })
        };

        let listener = Arc::clone(app.listener());
        assert!(
            TestEnv::wait_for(
                || {
                    let listener = Arc::clone(&listener);
                    async move { listener.state().await == ListenerState::Subscribed }
                },
                Duration::from_secs(2)
            )
            .await
        );

        Self {
            app,
            bus,
            shutdown_tx,
            handle,
        }
    }

    async fn submit(&self, command: &NodeCommand) {
        CommandPublisher::new(Arc::new(self.bus.clone()), Duration::from_secs(1))
            .publish(command)
            .await
            .unwrap();
    }

    async fn wait_for_settlements(&self, count: usize) -> bool {
        let bus = self.bus.clone();
        TestEnv::wait_for(
            || {
                let bus = bus.clone();
                async move { bus.settlements().len() >= count }
            },
            Duration::from_secs(5),
        )
        .await
    }

    async fn stop(self) {
        self.shutdown_tx.send(()).unwrap();
        self.handle.await.unwrap().unwrap();
        assert_eq!(self.app.listener().state().await, ListenerState::Stopped);
        assert!(self.bus.is_closed());
    }
}

fn test_config(max_retry_count: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.broker.max_retry_count = max_retry_count;
    config.broker.waiting_queue_ttl_seconds = 0;
    config.dispatcher.worker_count = 4;
    config.dispatcher.shutdown_grace_seconds = 2;
    config.device.timeout_seconds = 2;
    config
}

fn services(
    bus: &InMemoryMessageBus,
    resolver: &MockAddressResolver,
    registry: &MockFleetRegistry,
) -> Services {
    Services {
        bus: Arc::new(bus.clone()),
        resolver: Arc::new(resolver.clone()),
        registry: Arc::new(registry.clone()),
        notification_sink: None,
    }
}

#[tokio::test]
async fn test_wildcard_command_reaches_every_free_node() {
    let device = StubDevice::start().await;
    let resolver = MockAddressResolver::new()
        .with_node(TEST_NODE_A, &device.host(), Some(device.port()))
        .with_node(TEST_NODE_B, &device.host(), Some(device.port()));
    let registry = MockFleetRegistry::new().with_org("acme", &[TEST_NODE_A, TEST_NODE_B]);
    let bus = InMemoryMessageBus::new();
    let services = services(&bus, &resolver, &registry);
    let app = RunningApp::start(test_config(3), services, bus.clone()).await;

    app.submit(&CommandBuilder::new("acme.*").with_path("/v1/reboot").build())
        .await;

    // the original plus one child per node
    assert!(app.wait_for_settlements(3).await);
    let mut targets: Vec<String> = bus
        .published()
        .iter()
        .filter_map(|message| message.headers.get(TARGET_HEADER).cloned())
        .collect();
    targets.sort();
    assert_eq!(
        targets,
        vec![
            "acme.*".to_string(),
            format!("acme.{TEST_NODE_A}"),
            format!("acme.{TEST_NODE_B}"),
        ]
    );

    let requests = device.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|request| request.path == "/v1/reboot"));
    assert!(bus
        .settlements()
        .iter()
        .all(|settlement| settlement.action == SettleAction::Acked));
    assert_eq!(registry.calls(), vec!["acme"]);

    app.stop().await;
}

#[tokio::test]
async fn test_configured_device_port_overrides_resolved_port() {
    let device = StubDevice::start().await;
    let resolver = MockAddressResolver::new().with_node(TEST_NODE_A, &device.host(), Some(1));
    let registry = MockFleetRegistry::new();
    let bus = InMemoryMessageBus::new();
    let mut config = test_config(3);
    config.device.port = device.port();
    let services = services(&bus, &resolver, &registry);
    let app = RunningApp::start(config, services, bus.clone()).await;

    app.submit(
        &CommandBuilder::new(&format!("acme.{TEST_NODE_A}"))
            .with_path("/v1/reboot")
            .build(),
    )
    .await;

    assert!(app.wait_for_settlements(1).await);
    let requests = device.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/v1/reboot");

    app.stop().await;
}

#[tokio::test]
async fn test_unavailable_device_is_retried_then_discarded() {
    let device = StubDevice::with_statuses(&[503, 503, 503]).await;
    let resolver =
        MockAddressResolver::new().with_node(TEST_NODE_A, &device.host(), Some(device.port()));
    let registry = MockFleetRegistry::new();
    let bus = InMemoryMessageBus::new();
    let services = services(&bus, &resolver, &registry);
    let app = RunningApp::start(test_config(2), services, bus.clone()).await;

    app.submit(&CommandBuilder::new(&format!("acme.{TEST_NODE_A}")).build())
        .await;

    assert!(app.wait_for_settlements(3).await);
    // no fourth delivery once the budget is spent
    tokio::time::sleep(Duration::from_millis(200)).await;

    let history: Vec<(Option<u32>, SettleAction)> = bus
        .settlements()
        .iter()
        .map(|settlement| (settlement.death_count, settlement.action))
        .collect();
    assert_eq!(
        history,
        vec![
            (None, SettleAction::DeadLettered),
            (Some(1), SettleAction::DeadLettered),
            (Some(2), SettleAction::Acked),
        ]
    );
    assert_eq!(device.requests().len(), 3);

    app.stop().await;
}

#[tokio::test]
async fn test_single_segment_target_is_dropped_without_lookups() {
    let device = StubDevice::start().await;
    let resolver =
        MockAddressResolver::new().with_node(TEST_NODE_A, &device.host(), Some(device.port()));
    let registry = MockFleetRegistry::new().with_org("acme", &[TEST_NODE_A]);
    let bus = InMemoryMessageBus::new();
    let services = services(&bus, &resolver, &registry);
    let app = RunningApp::start(test_config(3), services, bus.clone()).await;

    app.submit(&CommandBuilder::new("acme").build()).await;

    assert!(app.wait_for_settlements(1).await);
    assert_eq!(bus.settlements()[0].action, SettleAction::Acked);
    assert_eq!(resolver.call_count(), 0);
    assert!(registry.calls().is_empty());
    assert!(device.requests().is_empty());

    app.stop().await;
}

#[tokio::test]
async fn test_node_events_are_forwarded_when_notifier_enabled() {
    let bus = InMemoryMessageBus::new();
    let sink = MockNotificationSink::new();
    let mut config = test_config(3);
    config.notifier.enabled = true;
    let mut services = services(&bus, &MockAddressResolver::new(), &MockFleetRegistry::new());
    services.notification_sink = Some(Arc::new(sink.clone()));
    let app = RunningApp::start(config, services, bus.clone()).await;

    let notification = NotificationBuilder::new(TEST_NODE_A).with_kind("alarm").build();
    let payload = notification.encode().unwrap();
    let received = sink.clone();
    // the notifier subscribes independently of the command listener
    assert!(
        TestEnv::wait_for(
            || {
                let bus = bus.clone();
                let payload = payload.clone();
                let received = received.clone();
                async move {
                    bus.publish(OutboundMessage::new(
                        "event.cloud.local.acme.node-feed",
                        payload,
                    ))
                    .await
                    .unwrap();
                    !received.received().is_empty()
                }
            },
            Duration::from_secs(2)
        )
        .await
    );
    assert_eq!(sink.received()[0], notification);

    app.stop().await;
}

#[tokio::test]
async fn test_enabled_notifier_requires_a_sink() {
    let bus = InMemoryMessageBus::new();
    let mut config = test_config(3);
    config.notifier.enabled = true;

    let result = Application::with_services(
        &config,
        services(&bus, &MockAddressResolver::new(), &MockFleetRegistry::new()),
    );

    assert!(result.is_err());
}
