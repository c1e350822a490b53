//! Metric names and descriptions

use metrics::{describe_counter, describe_histogram, Unit};

pub const DELIVERIES_TOTAL: &str = "node_feeder_deliveries_total";
pub const COMMANDS_EXECUTED_TOTAL: &str = "node_feeder_commands_executed_total";
pub const FANOUT_PUBLISHED_TOTAL: &str = "node_feeder_fanout_published_total";
pub const NOTIFICATIONS_TOTAL: &str = "node_feeder_notifications_total";
pub const DEVICE_REQUEST_DURATION: &str = "node_feeder_device_request_duration_seconds";

/// Register descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(
        DELIVERIES_TOTAL,
        "Command deliveries settled, by outcome (acked, retrying, discarded)"
    );
    describe_counter!(
        COMMANDS_EXECUTED_TOTAL,
        "Device requests issued, by result (success, permanent, retryable)"
    );
    describe_counter!(
        FANOUT_PUBLISHED_TOTAL,
        "Concrete commands published by wildcard expansion"
    );
    describe_counter!(
        NOTIFICATIONS_TOTAL,
        "Node events handled by the notifier, by result"
    );
    describe_histogram!(
        DEVICE_REQUEST_DURATION,
        Unit::Seconds,
        "Latency of HTTP requests to devices"
    );
}
