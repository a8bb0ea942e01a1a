//! Tests for configuration validation

use std::path::PathBuf;

use prometheus_mail_scheduler::config::{PersistenceConfig, SchedulerConfig, StoreBackendConfig};

fn persistent(batch: usize, min: usize, max: usize) -> PersistenceConfig {
    PersistenceConfig {
        enabled: true,
        desired_batch_size: batch,
        min_in_memory: min,
        max_in_memory: max,
        store: StoreBackendConfig::InMemory,
    }
}

#[test]
fn test_valid_persistent_config() {
    let cfg = SchedulerConfig::new(5).with_persistence(persistent(10, 20, 100));
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_zero_levels_rejected() {
    let cfg = SchedulerConfig::new(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_zero_batch_rejected() {
    let cfg = SchedulerConfig::new(3).with_persistence(persistent(0, 1, 10));
    assert!(cfg.validate().is_err());
}

#[test]
fn test_min_above_max_rejected() {
    let cfg = SchedulerConfig::new(3).with_persistence(persistent(5, 50, 10));
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("min_in_memory"));
}

#[test]
fn test_zero_min_in_memory_rejected() {
    let cfg = SchedulerConfig::new(3).with_persistence(persistent(1, 0, 1));
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("min_in_memory"));

    let mut disabled = persistent(1, 0, 1);
    disabled.enabled = false;
    assert!(SchedulerConfig::new(3).with_persistence(disabled).validate().is_ok());
}

#[test]
fn test_max_below_batch_rejected() {
    let cfg = SchedulerConfig::new(3).with_persistence(persistent(50, 5, 10));
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("desired_batch_size"));
}

#[test]
fn test_zero_intervals_rejected() {
    assert!(SchedulerConfig::new(3)
        .with_backfill_interval_ms(0)
        .validate()
        .is_err());
    assert!(SchedulerConfig::new(3)
        .with_max_idle_wait_ms(0)
        .validate()
        .is_err());
}

#[test]
fn test_empty_file_path_rejected() {
    let mut persistence = persistent(1, 1, 1);
    persistence.store = StoreBackendConfig::File {
        path: PathBuf::new(),
        stream: "mail".into(),
    };
    let cfg = SchedulerConfig::new(1).with_persistence(persistence);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_from_json_str_fills_defaults() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{
            "priority_levels": 4,
            "persistence": {
                "enabled": true,
                "desired_batch_size": 2,
                "min_in_memory": 3,
                "max_in_memory": 8,
                "store": {"kind": "file", "path": "/var/lib/mail"}
            }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.priority_levels, 4);
    assert_eq!(cfg.dispatch_tolerance_ms, 1_000);
    assert_eq!(cfg.backfill_interval_ms, 5_000);
    assert_eq!(cfg.max_idle_wait_ms, 30_000);
    assert_eq!(
        cfg.persistence.store,
        StoreBackendConfig::File {
            path: PathBuf::from("/var/lib/mail"),
            stream: "mailqueue".into(),
        }
    );
}

#[test]
fn test_from_json_str_rejects_invalid() {
    assert!(SchedulerConfig::from_json_str(r#"{"priority_levels": 0}"#).is_err());
    assert!(SchedulerConfig::from_json_str("not json").is_err());
}

#[test]
fn test_from_env_reads_prefixed_variables() {
    std::env::set_var("MAIL_SCHEDULER_PRIORITY_LEVELS", "7");
    std::env::set_var("MAIL_SCHEDULER_DISPATCH_TOLERANCE_MS", "250");
    let cfg = SchedulerConfig::from_env().unwrap();
    std::env::remove_var("MAIL_SCHEDULER_PRIORITY_LEVELS");
    std::env::remove_var("MAIL_SCHEDULER_DISPATCH_TOLERANCE_MS");
    assert_eq!(cfg.priority_levels, 7);
    assert_eq!(cfg.dispatch_tolerance_ms, 250);
}
