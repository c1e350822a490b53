//! In-memory doubles of the service ports
//!
//! Each mock records its calls so tests can assert on what the dispatcher
//! asked for, and can be told to fail.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use feeder_domain::{
    FleetRegistry, NodeAddress, NodeAddressResolver, NodeId, NodeNotification, NotificationSink,
};
use feeder_errors::{FeederError, FeederResult};

/// Mock implementation of FleetRegistry for testing
#[derive(Debug, Clone, Default)]
pub struct MockFleetRegistry {
    orgs: Arc<Mutex<HashMap<String, Vec<String>>>>,
    failures: Arc<Mutex<VecDeque<FeederError>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockFleetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_org(self, org: &str, nodes: &[&str]) -> Self {
        self.orgs.lock().unwrap().insert(
            org.to_string(),
            nodes.iter().map(|node| node.to_string()).collect(),
        );
        self
    }

    /// Queue an error for the next lookup.
    pub fn fail_next(&self, error: FeederError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FleetRegistry for MockFleetRegistry {
    async fn free_nodes(&self, org: &str) -> FeederResult<Vec<String>> {
        self.calls.lock().unwrap().push(org.to_string());
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(self
            .orgs
            .lock()
            .unwrap()
            .get(org)
            .cloned()
            .unwrap_or_default())
    }
}

/// Mock implementation of NodeAddressResolver for testing
///
/// Unknown nodes resolve to `NodeNotFound`.
#[derive(Debug, Clone, Default)]
pub struct MockAddressResolver {
    addresses: Arc<Mutex<HashMap<String, NodeAddress>>>,
    failures: Arc<Mutex<VecDeque<FeederError>>>,
    calls: Arc<Mutex<Vec<NodeId>>>,
}

impl MockAddressResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(self, node_id: &str, host: &str, port: Option<u16>) -> Self {
        self.addresses.lock().unwrap().insert(
            node_id.to_lowercase(),
            NodeAddress::new(host, port),
        );
        self
    }

    pub fn fail_next(&self, error: FeederError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn calls(&self) -> Vec<NodeId> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl NodeAddressResolver for MockAddressResolver {
    async fn resolve(&self, node_id: &NodeId) -> FeederResult<NodeAddress> {
        self.calls.lock().unwrap().push(node_id.clone());
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.addresses
            .lock()
            .unwrap()
            .get(node_id.as_str())
            .cloned()
            .ok_or_else(|| FeederError::NodeNotFound(node_id.to_string()))
    }
}

/// Mock implementation of NotificationSink for testing
#[derive(Debug, Clone, Default)]
pub struct MockNotificationSink {
    received: Arc<Mutex<Vec<NodeNotification>>>,
    failures: Arc<Mutex<VecDeque<FeederError>>>,
}

impl MockNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, error: FeederError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn received(&self) -> Vec<NodeNotification> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for MockNotificationSink {
    async fn notify(&self, notification: &NodeNotification) -> FeederResult<()> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.received.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
