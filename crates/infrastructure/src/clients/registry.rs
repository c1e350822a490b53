use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use feeder_domain::FleetRegistry;
use feeder_errors::{FeederError, FeederResult};

use super::lazy::LazyHttpClient;
use super::{join_url, transport_error};

const RETRY_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize)]
struct FreeNodesResponse {
    #[serde(default)]
    nodes: Vec<NodeMembership>,
}

#[derive(Debug, Deserialize)]
struct NodeMembership {
    id: String,
    #[serde(default = "default_free")]
    free: bool,
}

fn default_free() -> bool {
    true
}

/// 节点归属注册中心客户端
///
/// `GET {host}/v1/orgs/{org}/nodes?free=true`。连接层失败时按
/// `transport_retries` 重试，其余错误直接返回。
pub struct RegistryClient {
    host: String,
    http: LazyHttpClient,
    transport_retries: u32,
}

impl RegistryClient {
    pub fn new(host: impl Into<String>, timeout: Duration, transport_retries: u32) -> Self {
        Self {
            host: host.into(),
            http: LazyHttpClient::new("registry", timeout),
            transport_retries,
        }
    }

    pub fn http(&self) -> &LazyHttpClient {
        &self.http
    }

    async fn fetch(&self, org: &str) -> FeederResult<reqwest::Response> {
        let mut url = join_url(&self.host, &["v1", "orgs", org, "nodes"])?;
        url.query_pairs_mut().append_pair("free", "true");

        let mut attempt = 0;
        loop {
            let lease = self.http.get().await?;
            match lease.client.get(url.clone()).send().await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_connect() && attempt < self.transport_retries => {
                    attempt += 1;
                    self.http.invalidate(lease.generation).await;
                    warn!(org, attempt, "连接注册中心失败，准备重试: {e}");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => {
                    if e.is_connect() {
                        self.http.invalidate(lease.generation).await;
                    }
                    return Err(transport_error("registry", &e));
                }
            }
        }
    }
}

#[async_trait]
impl FleetRegistry for RegistryClient {
    async fn free_nodes(&self, org: &str) -> FeederResult<Vec<String>> {
        let response = self.fetch(org).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeederError::Registry(format!(
                "listing nodes of {org} returned status {status}"
            )));
        }

        let body: FreeNodesResponse = response
            .json()
            .await
            .map_err(|e| FeederError::Registry(format!("invalid node list for {org}: {e}")))?;

        let nodes: Vec<String> = body
            .nodes
            .into_iter()
            .filter(|node| node.free)
            .map(|node| node.id)
            .collect();

        debug!(org, count = nodes.len(), "已获取空闲节点");
        Ok(nodes)
    }
}
