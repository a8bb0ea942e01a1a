//! Tests for records and messages

use prometheus_mail_scheduler::core::{MailMessage, MailPayload, RecordId, SchedulingRecord};

fn message() -> MailMessage {
    MailMessage::new("ops@example.com", "Quarterly numbers")
        .to("cfo@example.com")
        .cc("board@example.com")
        .with_text("See attached.")
        .with_html("<p>See attached.</p>")
        .with_header("X-Campaign", "q3")
}

#[test]
fn test_record_id_parses_its_display() {
    let id = RecordId::new();
    let parsed: RecordId = id.to_string().parse().unwrap();
    assert_eq!(parsed, id);
    assert!("not-a-uuid".parse::<RecordId>().is_err());
}

#[test]
fn test_message_builder() {
    let message = message();
    assert_eq!(message.recipient_count(), 2);
    assert_eq!(message.headers.get("X-Campaign").map(String::as_str), Some("q3"));
    assert!(message.validate().is_ok());
}

#[test]
fn test_payload_exposes_envelope() {
    let plain = MailPayload::Plain { message: message() };
    let templated = MailPayload::Templated {
        message: message(),
        template_name: "report".into(),
        model: serde_json::json!({"quarter": 3}),
    };
    assert_eq!(plain.kind(), "plain");
    assert_eq!(templated.kind(), "templated");
    assert_eq!(plain.message(), templated.message());
}

#[test]
fn test_equal_time_orders_by_assigned_priority() {
    let payload = MailPayload::Plain { message: message() };
    let first = SchedulingRecord::new(payload.clone(), 1_000, 9, 1);
    let second = SchedulingRecord::new(payload, 1_000, 1, 2);
    assert!(first.key() < second.key());
    assert_eq!(first.desired_priority(), 9);
    assert_eq!(first.assigned_priority(), 1);
}
