//! Tests for error types

use prometheus_mail_scheduler::core::{SchedulerError, TransportError};

#[test]
fn test_invalid_priority_error() {
    let err = SchedulerError::InvalidPriority(0);
    assert_eq!(format!("{err}"), "invalid priority: 0 (levels start at 1)");
}

#[test]
fn test_shutting_down_error() {
    let err = SchedulerError::ShuttingDown;
    assert_eq!(format!("{err}"), "scheduler is shutting down");
}

#[test]
fn test_invalid_config_error() {
    let err = SchedulerError::InvalidConfig("priority_levels must be at least 1".to_string());
    assert_eq!(
        format!("{err}"),
        "invalid configuration: priority_levels must be at least 1"
    );
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::Backend("connection failed".to_string());
    assert_eq!(format!("{err}"), "backend error: connection failed");
}

#[test]
fn test_transport_error_is_transparent() {
    let err: SchedulerError = TransportError::Delivery("550 mailbox unavailable".into()).into();
    assert_eq!(format!("{err}"), "delivery failed: 550 mailbox unavailable");
    let err: SchedulerError = TransportError::Template("missing partial".into()).into();
    assert_eq!(format!("{err}"), "template error: missing partial");
}

#[test]
fn test_serialization_error_converts() {
    let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err = SchedulerError::from(parse);
    assert!(matches!(err, SchedulerError::Serialization(_)));
}
