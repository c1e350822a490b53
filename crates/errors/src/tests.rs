use crate::*;

#[test]
fn test_feeder_error_display() {
    let err = FeederError::InvalidTarget("acme".to_string());
    assert_eq!(err.to_string(), "invalid target format: acme");

    let err = FeederError::invalid_node_id("uk-bad", "wrong segment count");
    assert_eq!(
        err.to_string(),
        "invalid node id uk-bad: wrong segment count"
    );

    let err = FeederError::Device5xx {
        status: 503,
        url: "http://10.0.0.5:8080/v1/reboot".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "device failed request to http://10.0.0.5:8080/v1/reboot with status 503"
    );

    let err = FeederError::PublishFailed {
        failed_target: "acme.uk-sa2341-hnode-v0-a1a1".to_string(),
        published: 1,
        total: 2,
        reason: "channel closed".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "failed to publish acme.uk-sa2341-hnode-v0-a1a1 after 1 of 2 commands: channel closed"
    );
}

#[test]
fn test_permanent_errors_are_not_retryable() {
    let permanent = [
        FeederError::InvalidTarget("acme".into()),
        FeederError::invalid_node_id("x", "y"),
        FeederError::UnsupportedWildcard("network-*".into()),
        FeederError::NodeNotFound("uk-sa2341-hnode-v0-a1a0".into()),
        FeederError::Device4xx {
            status: 404,
            url: "http://n/".into(),
        },
        FeederError::Serialization("eof".into()),
        FeederError::Configuration("bad".into()),
        FeederError::Internal("bug".into()),
    ];

    for err in permanent {
        assert!(!err.is_retryable(), "{} should be permanent", err.kind());
    }
}

#[test]
fn test_transient_errors_are_retryable() {
    let transient = [
        FeederError::Device5xx {
            status: 500,
            url: "http://n/".into(),
        },
        FeederError::Transport("connection refused".into()),
        FeederError::Timeout("device".into()),
        FeederError::Registry("unavailable".into()),
        FeederError::Resolver("unavailable".into()),
        FeederError::MessageQueue("channel closed".into()),
        FeederError::Notification("peer down".into()),
    ];

    for err in transient {
        assert!(err.is_retryable(), "{} should be retryable", err.kind());
    }
}

#[test]
fn test_only_configuration_is_fatal() {
    assert!(FeederError::config_error("missing uri").is_fatal());
    assert!(!FeederError::Transport("x".into()).is_fatal());
    assert!(!FeederError::Internal("x".into()).is_fatal());
}

#[test]
fn test_error_conversions() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: FeederError = json_err.into();
    assert_eq!(err.kind(), "serialization");

    let anyhow_err = anyhow::anyhow!("boom");
    let err: FeederError = anyhow_err.into();
    assert!(matches!(err, FeederError::Internal(msg) if msg == "boom"));
}
