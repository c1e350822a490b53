use std::sync::Arc;

use anyhow::{Context, Result};
use feeder_config::AppConfig;
use feeder_dispatcher::{
    CommandPublisher, DeviceSettings, EventNotifier, HttpCommandExecutor, ListenerSettings,
    NotifierSettings, RequestMultiplier, RetryPolicy, RetryingDispatchListener,
};
use feeder_domain::{FleetRegistry, MessageBus, NodeAddressResolver, NotificationSink};
use feeder_infrastructure::{NnsClient, NotificationClient, RabbitMqMessageBus, RegistryClient};
use tokio::sync::broadcast;
use tracing::{error, info};

/// 应用依赖的外部服务
pub struct Services {
    pub bus: Arc<dyn MessageBus>,
    pub resolver: Arc<dyn NodeAddressResolver>,
    pub registry: Arc<dyn FleetRegistry>,
    /// 仅在启用事件通知时需要
    pub notification_sink: Option<Arc<dyn NotificationSink>>,
}

/// 主应用程序
pub struct Application {
    bus: Arc<dyn MessageBus>,
    listener: Arc<RetryingDispatchListener>,
    notifier: Option<Arc<EventNotifier>>,
}

impl Application {
    /// 连接消息代理并创建外部服务客户端
    pub async fn new(config: AppConfig) -> Result<Self> {
        let bus = RabbitMqMessageBus::connect(
            &config.broker.uri,
            &config.broker.exchange,
            config.broker.publish_timeout(),
        )
        .await
        .context("连接消息代理失败")?;
        info!("已连接消息代理，交换机: {}", bus.exchange());

        let notification_sink = config.notifier.enabled.then(|| {
            Arc::new(NotificationClient::new(
                config.notifier.host.clone(),
                config.notifier.timeout(),
            )) as Arc<dyn NotificationSink>
        });

        let services = Services {
            bus: Arc::new(bus),
            resolver: Arc::new(NnsClient::new(config.nns.host.clone(), config.nns.timeout())),
            registry: Arc::new(RegistryClient::new(
                config.registry.host.clone(),
                config.registry.timeout(),
                config.registry.transport_retries,
            )),
            notification_sink,
        };

        Self::with_services(&config, services)
    }

    /// 使用给定的外部服务组装调度组件
    pub fn with_services(config: &AppConfig, services: Services) -> Result<Self> {
        let worker_count = u16::try_from(config.dispatcher.worker_count)
            .context("dispatcher.worker_count 超出范围")?;

        let executor = HttpCommandExecutor::new(
            services.resolver,
            DeviceSettings {
                port: config.device.port,
                timeout: config.device.timeout(),
                debug_mode: config.dispatcher.debug_mode,
            },
        )
        .context("创建设备HTTP客户端失败")?;

        let publisher = Arc::new(CommandPublisher::new(
            Arc::clone(&services.bus),
            config.broker.publish_timeout(),
        ));
        let multiplier = Arc::new(RequestMultiplier::new(services.registry, publisher));

        let listener = Arc::new(RetryingDispatchListener::new(
            Arc::clone(&services.bus),
            Arc::new(executor),
            multiplier,
            RetryPolicy::new(config.broker.max_retry_count),
            ListenerSettings {
                queue: config.broker.queue.clone(),
                routing_keys: config.broker.routing_keys.clone(),
                waiting_ttl: config.broker.waiting_queue_ttl(),
                worker_count,
                consumer_tag: consumer_tag("commands"),
                shutdown_grace: config.dispatcher.shutdown_grace(),
                settle_timeout: config.broker.publish_timeout(),
            },
        ));

        let notifier = match (config.notifier.enabled, services.notification_sink) {
            (true, Some(sink)) => Some(Arc::new(EventNotifier::new(
                Arc::clone(&services.bus),
                sink,
                NotifierSettings {
                    queue: config.notifier.queue.clone(),
                    routing_keys: config.notifier.routing_keys.clone(),
                    prefetch: worker_count,
                    consumer_tag: consumer_tag("events"),
                    ack_timeout: config.broker.publish_timeout(),
                },
            ))),
            (true, None) => {
                return Err(anyhow::anyhow!("事件通知已启用但缺少通知服务客户端"));
            }
            (false, _) => None,
        };

        Ok(Self {
            bus: services.bus,
            listener,
            notifier,
        })
    }

    /// 运行调度监听器（以及事件通知器）直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动调度监听器");

        let notifier_handle = self.notifier.as_ref().map(|notifier| {
            let notifier = Arc::clone(notifier);
            let shutdown_rx = shutdown_rx.resubscribe();
            tokio::spawn(async move {
                if let Err(e) = notifier.run(shutdown_rx).await {
                    error!("事件通知器运行失败: {e}");
                }
            })
        });

        let result = Arc::clone(&self.listener).run(shutdown_rx).await;

        // 监听器异常退出时不会再有关闭信号
        if let Some(handle) = notifier_handle {
            if result.is_err() {
                handle.abort();
            }
            match handle.await {
                Err(e) if !e.is_cancelled() => error!("事件通知任务异常退出: {e}"),
                _ => {}
            }
        }

        if let Err(e) = self.bus.close().await {
            error!("关闭消息代理连接失败: {e}");
        }

        result.context("调度监听器运行失败")?;
        info!("调度监听器已停止");
        Ok(())
    }

    pub fn listener(&self) -> &Arc<RetryingDispatchListener> {
        &self.listener
    }
}

/// 消费者标签，包含主机名和进程号以便在代理管理界面中区分实例
fn consumer_tag(role: &str) -> String {
    let host = hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("node-feeder-{role}-{host}-{}", std::process::id())
}
