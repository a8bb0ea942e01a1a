//! Tests for builder modules

use std::sync::Arc;

use prometheus_mail_scheduler::builders::{build_backend, build_scheduler, SchedulerBuilder};
use prometheus_mail_scheduler::config::{PersistenceConfig, SchedulerConfig, StoreBackendConfig};
use prometheus_mail_scheduler::core::{MailMessage, SchedulerStatus, SortedSetBackend};
use prometheus_mail_scheduler::infra::{InMemorySortedSetStore, LoggingTransport};

fn persistent(store: StoreBackendConfig) -> SchedulerConfig {
    SchedulerConfig::new(2).with_persistence(PersistenceConfig {
        enabled: true,
        desired_batch_size: 2,
        min_in_memory: 2,
        max_in_memory: 4,
        store,
    })
}

#[test]
fn test_build_backend_none_without_persistence() {
    let backend = build_backend(&SchedulerConfig::new(2)).unwrap();
    assert!(backend.is_none());
}

#[test]
fn test_build_backend_file_creates_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spool");
    let cfg = persistent(StoreBackendConfig::File {
        path: path.clone(),
        stream: "outbox".into(),
    });
    let backend = build_backend(&cfg).unwrap().unwrap();
    assert_eq!(backend.index_len("mailqueue:level:1").unwrap(), 0);
    assert!(path.is_dir());
}

#[test]
fn test_build_scheduler_rejects_invalid_config() {
    let err = build_scheduler(&SchedulerConfig::new(0), Arc::new(LoggingTransport::new()))
        .unwrap_err();
    assert!(format!("{err:#}").contains("priority_levels"));
}

#[test]
fn test_builder_defaults_and_shutdown() {
    let builder = SchedulerBuilder::new(persistent(StoreBackendConfig::InMemory));
    assert_eq!(builder.config().priority_levels, 2);
    let scheduler = builder.build().unwrap();
    assert_eq!(scheduler.status(), SchedulerStatus::Running);
    scheduler.shutdown();
    assert_eq!(scheduler.status(), SchedulerStatus::Closed);
}

#[test]
fn test_builder_uses_supplied_backend() {
    let backend = Arc::new(InMemorySortedSetStore::new());
    let scheduler = SchedulerBuilder::new(persistent(StoreBackendConfig::InMemory))
        .with_transport(Arc::new(LoggingTransport::new()))
        .with_backend(backend.clone())
        .build()
        .unwrap();
    let message = MailMessage::new("ops@example.com", "later").to("a@example.com");
    scheduler
        .schedule(message, Some(u128::from(u64::MAX)), 1)
        .unwrap();
    assert_eq!(backend.value_count(), 1);
    scheduler.shutdown();
}
