use std::fmt;
use std::str::FromStr;

use feeder_errors::FeederError;
use serde::{Deserialize, Serialize};

const NODE_ID_PREFIX: &str = "uk";
const NODE_TYPES: [&str; 4] = ["hnode", "tnode", "anode", "comv1"];

/// Validated node identifier, e.g. `uk-sa2341-hnode-v0-a1a0`.
///
/// Layout: `uk-<cc><NNNN>-<type>-v<N>-<XXXX>` where `cc` is a two-letter
/// code, `NNNN` four digits, `type` a known node type, `vN` the hardware
/// version and `XXXX` four hex digits. Parsing is case-insensitive and the
/// stored form is lower-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    pub fn parse(raw: &str) -> Result<Self, FeederError> {
        let id = raw.trim().to_lowercase();
        let parts: Vec<&str> = id.split('-').collect();

        if parts.len() != 5 {
            return Err(FeederError::invalid_node_id(
                raw,
                format!("expected 5 dash-separated segments, got {}", parts.len()),
            ));
        }

        if parts[0] != NODE_ID_PREFIX {
            return Err(FeederError::invalid_node_id(raw, "missing uk prefix"));
        }

        let site = parts[1];
        let site_ok = site.len() == 6
            && site.is_ascii()
            && site[..2].chars().all(|c| c.is_ascii_lowercase())
            && site[2..].chars().all(|c| c.is_ascii_digit());
        if !site_ok {
            return Err(FeederError::invalid_node_id(
                raw,
                "site segment must be two letters and four digits",
            ));
        }

        if !NODE_TYPES.contains(&parts[2]) {
            return Err(FeederError::invalid_node_id(
                raw,
                format!("unknown node type {}", parts[2]),
            ));
        }

        let version = parts[3];
        let version_ok = version.len() > 1
            && version.starts_with('v')
            && version[1..].chars().all(|c| c.is_ascii_digit());
        if !version_ok {
            return Err(FeederError::invalid_node_id(raw, "bad hardware version"));
        }

        let tail = parts[4];
        if tail.len() != 4 || !tail.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(FeederError::invalid_node_id(
                raw,
                "tail must be four hex digits",
            ));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn node_type(&self) -> &str {
        self.0.split('-').nth(2).unwrap_or_default()
    }
}

impl FromStr for NodeId {
    type Err = FeederError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NodeId {
    type Error = FeederError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
