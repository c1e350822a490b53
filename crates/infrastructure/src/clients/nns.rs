use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use feeder_domain::{NodeAddress, NodeAddressResolver, NodeId};
use feeder_errors::{FeederError, FeederResult};

use super::lazy::LazyHttpClient;
use super::{join_url, transport_error};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeAddressResponse {
    #[serde(default)]
    node_ip: String,
    #[serde(default)]
    node_port: u32,
}

/// 地址注册中心（NNS）客户端
///
/// `GET {host}/v1/nns/nodes/{node_id}`，404 或空地址视为节点未注册。
pub struct NnsClient {
    host: String,
    http: LazyHttpClient,
}

impl NnsClient {
    pub fn new(host: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self {
            host: host.into(),
            http: LazyHttpClient::new("nns", timeout),
        }
    }

    pub fn http(&self) -> &LazyHttpClient {
        &self.http
    }
}

#[async_trait]
impl NodeAddressResolver for NnsClient {
    async fn resolve(&self, node_id: &NodeId) -> FeederResult<NodeAddress> {
        let url = join_url(&self.host, &["v1", "nns", "nodes", node_id.as_str()])?;
        let lease = self.http.get().await?;

        let response = match lease.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                if e.is_connect() {
                    self.http.invalidate(lease.generation).await;
                }
                warn!(node_id = %node_id, "查询节点地址失败: {e}");
                return Err(transport_error("nns", &e));
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FeederError::NodeNotFound(node_id.to_string()));
        }
        if !status.is_success() {
            return Err(FeederError::Resolver(format!(
                "lookup of {node_id} returned status {status}"
            )));
        }

        let body: NodeAddressResponse = response
            .json()
            .await
            .map_err(|e| FeederError::Resolver(format!("invalid response for {node_id}: {e}")))?;

        if body.node_ip.trim().is_empty() {
            return Err(FeederError::NodeNotFound(node_id.to_string()));
        }

        let port = u16::try_from(body.node_port).ok().filter(|port| *port != 0);
        debug!(node_id = %node_id, ip = %body.node_ip, ?port, "节点地址已解析");
        Ok(NodeAddress::new(body.node_ip, port))
    }
}
