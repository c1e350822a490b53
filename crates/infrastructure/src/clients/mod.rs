//! 外部服务 REST 客户端

pub mod lazy;
pub mod nns;
pub mod notification;
pub mod registry;

pub use lazy::{ClientLease, LazyHttpClient};
pub use nns::NnsClient;
pub use notification::NotificationClient;
pub use registry::RegistryClient;

use feeder_errors::FeederError;

/// 将 reqwest 错误映射为可重试的领域错误
pub(crate) fn transport_error(service: &str, error: &reqwest::Error) -> FeederError {
    if error.is_timeout() {
        FeederError::Timeout(format!("{service}: {error}"))
    } else {
        FeederError::Transport(format!("{service}: {error}"))
    }
}

pub(crate) fn join_url(
    host: &str,
    segments: &[&str],
) -> Result<reqwest::Url, FeederError> {
    let mut url = reqwest::Url::parse(host)
        .map_err(|e| FeederError::config_error(format!("invalid service host {host}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| FeederError::config_error(format!("service host {host} cannot be a base")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
