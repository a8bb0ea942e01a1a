//! Tests for sorted-set store backends

use prometheus_mail_scheduler::core::{IndexScore, SortedSetBackend};
use prometheus_mail_scheduler::infra::{FileSortedSetStore, InMemorySortedSetStore};

fn score(at: u128, priority: u32, sequence: u64) -> IndexScore {
    IndexScore {
        scheduled_at_ms: at,
        desired_priority: priority,
        sequence,
    }
}

fn exercise(backend: &dyn SortedSetBackend) {
    backend
        .write_record("v:a", "A".into(), "idx", "a", score(300, 1, 1))
        .unwrap();
    backend
        .write_record("v:b", "B".into(), "idx", "b", score(100, 1, 2))
        .unwrap();
    backend
        .write_record("v:c", "C".into(), "idx", "c", score(100, 1, 3))
        .unwrap();
    assert_eq!(backend.index_range("idx", 2).unwrap(), vec!["b", "c"]);

    // Rewriting a member moves it rather than duplicating it.
    backend
        .write_record("v:a", "A2".into(), "idx", "a", score(50, 1, 4))
        .unwrap();
    assert_eq!(backend.index_len("idx").unwrap(), 3);
    assert_eq!(backend.index_range("idx", 1).unwrap(), vec!["a"]);
    assert_eq!(backend.get_value("v:a").unwrap().as_deref(), Some("A2"));

    assert!(backend.delete_record("v:b", "idx", "b").unwrap());
    assert!(!backend.delete_record("v:b", "idx", "b").unwrap());
    assert_eq!(
        backend
            .delete_values(&["v:c".to_string(), "v:missing".to_string()])
            .unwrap(),
        1
    );
    assert_eq!(
        backend
            .index_remove("idx", &["c".to_string(), "zz".to_string()])
            .unwrap(),
        1
    );
    assert_eq!(backend.index_range("idx", 10).unwrap(), vec!["a"]);
    assert_eq!(backend.index_len("other").unwrap(), 0);
}

#[test]
fn test_in_memory_backend_contract() {
    let store = InMemorySortedSetStore::new();
    exercise(&store);
    assert_eq!(store.value_count(), 1);
}

#[test]
fn test_file_backend_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSortedSetStore::open(dir.path(), "contract").unwrap();
    exercise(&store);
    drop(store);
    let reopened = FileSortedSetStore::open(dir.path(), "contract").unwrap();
    assert_eq!(reopened.value_count(), 1);
    assert_eq!(reopened.index_range("idx", 10).unwrap(), vec!["a"]);
}
