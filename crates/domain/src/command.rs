use std::fmt;
use std::str::FromStr;

use feeder_errors::{FeederError, FeederResult};
use serde::{Deserialize, Serialize};

/// Routing key reserved for commands that address exactly one node.
///
/// Fan-out children are re-published under this key and the command queue is
/// always bound to it, whatever patterns are configured.
pub const NODE_COMMAND_ROUTING_KEY: &str = "request.cloud.local.messaging.nodefeeder.node.publish";

/// Header carrying the original target string verbatim.
pub const TARGET_HEADER: &str = "x-node-target";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }

    /// Whether a request body is sent for this method.
    pub fn carries_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = FeederError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            other => Err(FeederError::Serialization(format!(
                "unsupported http method: {other}"
            ))),
        }
    }
}

/// A command addressed to `<org>.<nodeSelector>`.
///
/// The target stays a raw string on the wire; it is parsed by whoever acts on
/// it so that a malformed target is a permanent failure, not a decode error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeCommand {
    pub target: String,
    pub http_method: HttpMethod,
    pub path: String,
    pub body: Vec<u8>,
}

impl NodeCommand {
    pub fn new(
        target: impl Into<String>,
        http_method: HttpMethod,
        path: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            target: target.into(),
            http_method,
            path: path.into(),
            body,
        }
    }

    /// Same method, path and body, addressed to a different target.
    pub fn retarget(&self, target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            http_method: self.http_method,
            path: self.path.clone(),
            body: self.body.clone(),
        }
    }

    pub fn encode(&self) -> FeederResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(payload: &[u8]) -> FeederResult<Self> {
        Ok(bincode::deserialize(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_garbage() {
        let err = NodeCommand::decode(b"\x01\x02").unwrap_err();
        assert_eq!(err.kind(), "serialization");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_malformed_target_still_decodes() {
        let cmd = NodeCommand::new("acme", HttpMethod::Post, "/v1/reboot", b"{}".to_vec());
        let decoded = NodeCommand::decode(&cmd.encode().unwrap()).unwrap();
        assert_eq!(decoded.target, "acme");
        assert_eq!(decoded.body, b"{}".to_vec());
    }

    #[test]
    fn test_retarget_keeps_payload() {
        let cmd = NodeCommand::new("acme.*", HttpMethod::Put, "config", vec![1, 2, 3]);
        let child = cmd.retarget("acme.uk-sa2341-hnode-v0-a1a0");
        assert_eq!(child.target, "acme.uk-sa2341-hnode-v0-a1a0");
        assert_eq!(child.http_method, HttpMethod::Put);
        assert_eq!(child.path, "config");
        assert_eq!(child.body, vec![1, 2, 3]);
    }

    #[test]
    fn test_http_method_parsing() {
        assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert_eq!("DELETE".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert!("TRACE".parse::<HttpMethod>().is_err());
        assert!(HttpMethod::Patch.carries_body());
        assert!(!HttpMethod::Get.carries_body());
    }
}
