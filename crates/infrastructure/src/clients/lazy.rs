use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info};

use feeder_errors::{FeederError, FeederResult};

/// 按需建立的 HTTP 客户端
///
/// 首次使用时才创建底层连接池，连接层错误后由调用方使 [`ClientLease`]
/// 失效，下一次使用时重新创建。每次创建都会产生新的代数，旧租约的失效
/// 请求不会影响新客户端。
pub struct LazyHttpClient {
    service: &'static str,
    timeout: Duration,
    slot: RwLock<Option<ClientLease>>,
    generation: AtomicU64,
}

/// 一次借出的客户端及其代数
#[derive(Clone)]
pub struct ClientLease {
    pub client: reqwest::Client,
    pub generation: u64,
}

impl LazyHttpClient {
    pub fn new(service: &'static str, timeout: Duration) -> Self {
        Self {
            service,
            timeout,
            slot: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// 获取客户端，必要时创建
    pub async fn get(&self) -> FeederResult<ClientLease> {
        if let Some(lease) = self.slot.read().await.as_ref() {
            return Ok(lease.clone());
        }

        let mut slot = self.slot.write().await;
        if let Some(lease) = slot.as_ref() {
            return Ok(lease.clone());
        }

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .build()
            .map_err(|e| FeederError::Transport(format!("{}: 创建HTTP客户端失败: {e}", self.service)))?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        info!(service = self.service, generation, "HTTP客户端已创建");

        let lease = ClientLease { client, generation };
        *slot = Some(lease.clone());
        Ok(lease)
    }

    /// 丢弃指定代数的客户端；若已被更新的客户端替换则忽略
    pub async fn invalidate(&self, generation: u64) {
        let mut slot = self.slot.write().await;
        if slot.as_ref().map(|lease| lease.generation) == Some(generation) {
            *slot = None;
            debug!(service = self.service, generation, "HTTP客户端已失效");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.slot.read().await.is_some()
    }

    /// 已创建过的客户端数量
    pub fn dial_count(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}
