use thiserror::Error;

/// Errors raised while dispatching node commands.
///
/// Every variant is either permanent (retrying cannot change the outcome) or
/// retryable (transient device or infrastructure condition). The listener uses
/// [`FeederError::is_retryable`] to pick between acknowledging a delivery and
/// routing it through the waiting queue.
#[derive(Debug, Error)]
pub enum FeederError {
    #[error("invalid target format: {0}")]
    InvalidTarget(String),

    #[error("invalid node id {node_id}: {reason}")]
    InvalidNodeId { node_id: String, reason: String },

    #[error("unsupported wildcard node selector: {0}")]
    UnsupportedWildcard(String),

    #[error("node {0} has no registered address")]
    NodeNotFound(String),

    #[error("device rejected request to {url} with status {status}")]
    Device4xx { status: u16, url: String },

    #[error("device failed request to {url} with status {status}")]
    Device5xx { status: u16, url: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("fleet registry error: {0}")]
    Registry(String),

    #[error("address resolver error: {0}")]
    Resolver(String),

    #[error("message queue error: {0}")]
    MessageQueue(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("failed to publish {failed_target} after {published} of {total} commands: {reason}")]
    PublishFailed {
        failed_target: String,
        published: usize,
        total: usize,
        reason: String,
    },

    #[error("notification error: {0}")]
    Notification(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type FeederResult<T> = Result<T, FeederError>;

impl FeederError {
    pub fn invalid_target<S: Into<String>>(target: S) -> Self {
        Self::InvalidTarget(target.into())
    }

    pub fn invalid_node_id<S: Into<String>, R: Into<String>>(node_id: S, reason: R) -> Self {
        Self::InvalidNodeId {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Transient failures that may succeed on a later delivery.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FeederError::Device5xx { .. }
                | FeederError::Transport(_)
                | FeederError::Timeout(_)
                | FeederError::Registry(_)
                | FeederError::Resolver(_)
                | FeederError::MessageQueue(_)
                | FeederError::PublishFailed { .. }
                | FeederError::Notification(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, FeederError::Configuration(_))
    }

    /// Short stable label used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            FeederError::InvalidTarget(_) => "invalid_target",
            FeederError::InvalidNodeId { .. } => "invalid_node_id",
            FeederError::UnsupportedWildcard(_) => "unsupported_wildcard",
            FeederError::NodeNotFound(_) => "node_not_found",
            FeederError::Device4xx { .. } => "device_4xx",
            FeederError::Device5xx { .. } => "device_5xx",
            FeederError::Transport(_) => "transport",
            FeederError::Timeout(_) => "timeout",
            FeederError::Registry(_) => "registry",
            FeederError::Resolver(_) => "resolver",
            FeederError::MessageQueue(_) => "message_queue",
            FeederError::Serialization(_) => "serialization",
            FeederError::PublishFailed { .. } => "publish_failed",
            FeederError::Notification(_) => "notification",
            FeederError::Configuration(_) => "configuration",
            FeederError::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for FeederError {
    fn from(err: serde_json::Error) -> Self {
        FeederError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for FeederError {
    fn from(err: bincode::Error) -> Self {
        FeederError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for FeederError {
    fn from(err: anyhow::Error) -> Self {
        FeederError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests;
