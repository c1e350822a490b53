use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::{header::CONTENT_TYPE, Method};
use tracing::{debug, info, warn};

use feeder_domain::{
    CommandExecutor, ExecutionReport, HttpMethod, NodeAddressResolver, NodeCommand, Target,
};
use feeder_errors::{FeederError, FeederResult};

use crate::metrics::{COMMANDS_EXECUTED_TOTAL, DEVICE_REQUEST_DURATION};

/// HTTP delivery settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSettings {
    /// Port for every device request; 0 keeps the resolved port, if any.
    pub port: u16,
    pub timeout: Duration,
    /// Log device response bodies at debug level.
    pub debug_mode: bool,
}

/// Delivers concrete commands to nodes over HTTP
pub struct HttpCommandExecutor {
    resolver: Arc<dyn NodeAddressResolver>,
    client: reqwest::Client,
    settings: DeviceSettings,
}

impl HttpCommandExecutor {
    pub fn new(
        resolver: Arc<dyn NodeAddressResolver>,
        settings: DeviceSettings,
    ) -> FeederResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| FeederError::Internal(format!("failed to build device client: {e}")))?;

        Ok(Self {
            resolver,
            client,
            settings,
        })
    }

    async fn send(&self, command: &NodeCommand, url: &str) -> FeederResult<ExecutionReport> {
        let mut request = self
            .client
            .request(method(command.http_method), url)
            .timeout(self.settings.timeout);
        // Device APIs take JSON bodies.
        if !command.body.is_empty() {
            request = request.header(CONTENT_TYPE, "application/json");
        }
        if command.http_method.carries_body() || !command.body.is_empty() {
            request = request.body(command.body.clone());
        }

        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FeederError::Timeout(format!("request to {url}: {e}"))
            } else {
                FeederError::Transport(format!("request to {url}: {e}"))
            }
        });
        histogram!(DEVICE_REQUEST_DURATION).record(started.elapsed().as_secs_f64());
        let response = response?;

        let status = response.status().as_u16();

        // Body is read for diagnostics only.
        match response.text().await {
            Ok(body) if self.settings.debug_mode => {
                debug!(url, status, body = %body, "device response");
            }
            Ok(_) => {}
            Err(e) => debug!(url, status, "failed to read device response body: {e}"),
        }

        classify_status(status, url)?;
        Ok(ExecutionReport {
            url: url.to_string(),
            status,
        })
    }
}

#[async_trait]
impl CommandExecutor for HttpCommandExecutor {
    async fn execute(&self, command: &NodeCommand) -> FeederResult<ExecutionReport> {
        let target = Target::parse(&command.target)?;
        let node_id = target
            .node_id()
            .ok_or_else(|| FeederError::invalid_target(&command.target))?;

        let address = self.resolver.resolve(node_id).await.inspect_err(|e| {
            if matches!(e, FeederError::NodeNotFound(_)) {
                info!(target = %command.target, "node has no registered address, skipping");
            }
        })?;

        let url = device_url(&address.authority(self.settings.port), &command.path);
        let result = self.send(command, &url).await;

        let label = match &result {
            Ok(_) => "success",
            Err(e) if e.is_retryable() => "retryable",
            Err(_) => "permanent",
        };
        counter!(COMMANDS_EXECUTED_TOTAL, "result" => label).increment(1);

        match &result {
            Ok(report) => info!(
                target = %command.target,
                node_type = node_id.node_type(),
                method = %command.http_method,
                url = %report.url,
                status = report.status,
                "command delivered"
            ),
            Err(e) => warn!(
                target = %command.target,
                method = %command.http_method,
                url = %url,
                "command delivery failed: {e}"
            ),
        }

        result
    }
}

/// `http://{authority}/{path}` with the path's outer slashes trimmed.
pub fn device_url(authority: &str, path: &str) -> String {
    format!("http://{}/{}", authority, path.trim_matches('/'))
}

/// Map a device status code onto the retry taxonomy.
pub fn classify_status(status: u16, url: &str) -> FeederResult<()> {
    match status {
        500..=u16::MAX => Err(FeederError::Device5xx {
            status,
            url: url.to_string(),
        }),
        400..=499 => Err(FeederError::Device4xx {
            status,
            url: url.to_string(),
        }),
        _ => Ok(()),
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
    }
}
