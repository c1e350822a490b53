use std::fmt;

use feeder_errors::{FeederError, FeederResult};

use crate::node_id::NodeId;

pub const WILDCARD_SELECTOR: &str = "*";

/// The two raw segments of a `<org>.<nodeSelector>` target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetParts<'a> {
    pub org: &'a str,
    pub selector: &'a str,
}

impl<'a> TargetParts<'a> {
    /// Split a target into exactly two non-empty dot-separated segments.
    pub fn split(target: &'a str) -> FeederResult<Self> {
        let mut segments = target.split('.');
        match (segments.next(), segments.next(), segments.next()) {
            (Some(org), Some(selector), None) if !org.is_empty() && !selector.is_empty() => {
                Ok(Self { org, selector })
            }
            _ => Err(FeederError::invalid_target(target)),
        }
    }

    /// Any selector containing `*` is routed to fan-out, which only accepts
    /// the full-org wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.selector.contains('*')
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSelector {
    AllNodes,
    Node(NodeId),
}

/// A fully validated target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub org: String,
    pub selector: NodeSelector,
}

impl Target {
    pub fn parse(raw: &str) -> FeederResult<Self> {
        let parts = TargetParts::split(raw)?;

        let selector = if parts.selector == WILDCARD_SELECTOR {
            NodeSelector::AllNodes
        } else if parts.is_wildcard() {
            return Err(FeederError::UnsupportedWildcard(parts.selector.to_string()));
        } else {
            NodeSelector::Node(NodeId::parse(parts.selector)?)
        };

        Ok(Self {
            org: parts.org.to_string(),
            selector,
        })
    }

    pub fn node_id(&self) -> Option<&NodeId> {
        match &self.selector {
            NodeSelector::Node(id) => Some(id),
            NodeSelector::AllNodes => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            NodeSelector::AllNodes => write!(f, "{}.{}", self.org, WILDCARD_SELECTOR),
            NodeSelector::Node(id) => write!(f, "{}.{}", self.org, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_requires_two_segments() {
        for raw in ["acme", "", ".", "acme.", ".node", "a.b.c", "acme..x"] {
            let err = TargetParts::split(raw).unwrap_err();
            assert!(matches!(err, FeederError::InvalidTarget(_)), "{raw}");
        }

        let parts = TargetParts::split("acme.nodeA").unwrap();
        assert_eq!(parts.org, "acme");
        assert_eq!(parts.selector, "nodeA");
        assert!(!parts.is_wildcard());
        assert!(TargetParts::split("acme.*").unwrap().is_wildcard());
        assert!(TargetParts::split("acme.network-*").unwrap().is_wildcard());
    }

    #[test]
    fn test_parse_wildcard_and_node() {
        let all = Target::parse("acme.*").unwrap();
        assert_eq!(all.selector, NodeSelector::AllNodes);
        assert_eq!(all.to_string(), "acme.*");
        assert!(all.node_id().is_none());

        let one = Target::parse("acme.uk-sa2341-hnode-v0-a1a0").unwrap();
        assert_eq!(one.org, "acme");
        assert_eq!(
            one.node_id().map(|id| id.as_str()),
            Some("uk-sa2341-hnode-v0-a1a0")
        );
    }

    #[test]
    fn test_partial_wildcard_is_rejected() {
        let err = Target::parse("acme.network-*").unwrap_err();
        assert!(matches!(err, FeederError::UnsupportedWildcard(s) if s == "network-*"));
    }

    #[test]
    fn test_invalid_node_selector() {
        let err = Target::parse("acme.nodeA").unwrap_err();
        assert!(matches!(err, FeederError::InvalidNodeId { .. }));
    }
}
