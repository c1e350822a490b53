use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use feeder_domain::{NodeNotification, NotificationSink};
use feeder_errors::{FeederError, FeederResult};

use super::lazy::LazyHttpClient;
use super::{join_url, transport_error};

/// 通知服务客户端，`POST {host}/v1/notifications`
pub struct NotificationClient {
    host: String,
    http: LazyHttpClient,
}

impl NotificationClient {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            http: LazyHttpClient::new("notification", timeout),
        }
    }

    pub fn http(&self) -> &LazyHttpClient {
        &self.http
    }
}

#[async_trait]
impl NotificationSink for NotificationClient {
    async fn notify(&self, notification: &NodeNotification) -> FeederResult<()> {
        let url = join_url(&self.host, &["v1", "notifications"])?;
        let lease = self.http.get().await?;

        let response = match lease.client.post(url).json(notification).send().await {
            Ok(response) => response,
            Err(e) => {
                if e.is_connect() {
                    self.http.invalidate(lease.generation).await;
                }
                return Err(transport_error("notification", &e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FeederError::Notification(format!(
                "notification for {} rejected with status {status}",
                notification.node_id
            )));
        }

        debug!(node_id = %notification.node_id, kind = %notification.kind, "通知已发送");
        Ok(())
    }
}
