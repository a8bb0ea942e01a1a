//! Tests for the durable store adapter

use std::sync::Arc;

use prometheus_mail_scheduler::core::{
    DurableStore, IndexScore, MailMessage, MailPayload, SchedulingRecord, SortedSetBackend,
    REMOVE_CHUNK,
};
use prometheus_mail_scheduler::infra::InMemorySortedSetStore;

fn record(at: u128, priority: u32) -> SchedulingRecord {
    SchedulingRecord::new(
        MailPayload::Plain {
            message: MailMessage::new("ops@example.com", format!("at {at}")).to("a@example.com"),
        },
        at,
        priority,
        priority,
    )
}

fn store(levels: u32) -> (Arc<InMemorySortedSetStore>, DurableStore) {
    let backend = Arc::new(InMemorySortedSetStore::new());
    let store = DurableStore::new(backend.clone(), levels);
    (backend, store)
}

#[test]
fn test_add_then_get_returns_equal_record() {
    let (_, store) = store(3);
    let rec = record(1_000, 2);
    store.add(&rec).unwrap();
    assert_eq!(store.get(rec.id()).unwrap(), Some(rec));
    assert_eq!(store.len().unwrap(), 1);
}

#[test]
fn test_remove_is_idempotent() {
    let (backend, store) = store(3);
    let rec = record(1_000, 1);
    store.add(&rec).unwrap();
    assert!(store.remove(rec.id()).unwrap());
    assert!(!store.remove(rec.id()).unwrap());
    assert!(store.is_empty().unwrap());
    assert_eq!(backend.value_count(), 0);
}

#[test]
fn test_re_add_overwrites_without_duplicating() {
    let (_, store) = store(3);
    let rec = record(1_000, 3);
    store.add(&rec).unwrap();
    store.add(&rec).unwrap();
    assert_eq!(store.len().unwrap(), 1);
    assert_eq!(store.next_batch(10).unwrap(), vec![rec]);
}

#[test]
fn test_add_all_and_remove_all() {
    let (_, store) = store(2);
    let records: Vec<_> = (0..5).map(|i| record(1_000 + i, 1 + (i as u32 % 2))).collect();
    assert_eq!(store.add_all(&records).unwrap(), 5);
    let ids: Vec<_> = records.iter().take(3).map(SchedulingRecord::id).collect();
    assert_eq!(store.remove_all(&ids).unwrap(), 3);
    assert_eq!(store.len().unwrap(), 2);
}

#[test]
fn test_next_batch_merges_levels_by_time_then_level() {
    let (_, store) = store(3);
    let late_high = record(3_000, 1);
    let tie_low = record(2_000, 3);
    let tie_high = record(2_000, 2);
    let early_low = record(1_000, 3);
    for r in [&late_high, &tie_low, &tie_high, &early_low] {
        store.add(r).unwrap();
    }
    let batch = store.next_batch(3).unwrap();
    let ids: Vec<_> = batch.iter().map(SchedulingRecord::id).collect();
    assert_eq!(ids, vec![early_low.id(), tie_high.id(), tie_low.id()]);
}

#[test]
fn test_next_batch_keeps_index_order_for_equal_times() {
    let (_, store) = store(1);
    let payload = |subject: &str| MailPayload::Plain {
        message: MailMessage::new("ops@example.com", subject).to("a@example.com"),
    };
    // Both clamp to level 1; the index orders them by desired priority, then insertion.
    let clamped = SchedulingRecord::new(payload("clamped"), 2_000, 4, 1);
    let first = SchedulingRecord::new(payload("first"), 2_000, 1, 1);
    let second = SchedulingRecord::new(payload("second"), 2_000, 1, 1);
    let third = SchedulingRecord::new(payload("third"), 2_000, 1, 1);
    for r in [&clamped, &first, &second, &third] {
        store.add(r).unwrap();
    }
    let ids: Vec<_> = store
        .next_batch(3)
        .unwrap()
        .iter()
        .map(SchedulingRecord::id)
        .collect();
    assert_eq!(ids, vec![first.id(), second.id(), third.id()]);
}

#[test]
fn test_next_batch_for_level_is_earliest_first() {
    let (_, store) = store(2);
    for at in [5_000, 1_000, 3_000] {
        store.add(&record(at, 2)).unwrap();
    }
    store.add(&record(10, 1)).unwrap();
    let times: Vec<_> = store
        .next_batch_for_level(2, 2)
        .unwrap()
        .iter()
        .map(SchedulingRecord::scheduled_at_ms)
        .collect();
    assert_eq!(times, vec![1_000, 3_000]);
    assert!(store.next_batch_for_level(2, 0).unwrap().is_empty());
}

#[test]
fn test_dangling_index_members_are_pruned() {
    let (backend, store) = store(1);
    let kept = record(2_000, 1);
    let lost = record(1_000, 1);
    let garbled = record(1_500, 1);
    store.add(&kept).unwrap();
    store.add(&lost).unwrap();
    store.add(&garbled).unwrap();
    backend
        .delete_values(&[DurableStore::value_key(lost.id())])
        .unwrap();
    backend
        .write_record(
            &DurableStore::value_key(garbled.id()),
            "{not json".into(),
            &DurableStore::index_name(1),
            &garbled.id().to_string(),
            IndexScore {
                scheduled_at_ms: 1_500,
                desired_priority: 1,
                sequence: 0,
            },
        )
        .unwrap();

    let batch = store.next_batch(10).unwrap();
    assert_eq!(batch, vec![kept]);
    assert_eq!(store.len().unwrap(), 1);
    assert_eq!(backend.value_count(), 1);
}

#[test]
fn test_remove_without_value_clears_index() {
    let (backend, store) = store(1);
    let rec = record(1_000, 1);
    store.add(&rec).unwrap();
    backend
        .delete_values(&[DurableStore::value_key(rec.id())])
        .unwrap();
    assert!(!store.remove(rec.id()).unwrap());
    assert!(store.is_empty().unwrap());
}

#[test]
fn test_clear_level_in_chunks() {
    let (backend, store) = store(2);
    let total = REMOVE_CHUNK + 5;
    let records: Vec<_> = (0..total as u128).map(|i| record(i, 2)).collect();
    store.add_all(&records).unwrap();
    let keep = record(1, 1);
    store.add(&keep).unwrap();

    assert_eq!(store.clear_level(2).unwrap(), total);
    assert_eq!(store.len().unwrap(), 1);
    assert_eq!(backend.value_count(), 1);
    assert_eq!(store.get(keep.id()).unwrap(), Some(keep));
}

#[test]
fn test_level_change_moves_index_membership() {
    let (_, store) = store(3);
    let original = record(1_000, 3);
    store.add(&original).unwrap();
    let moved = SchedulingRecord::with_id(
        original.id(),
        original.payload().clone(),
        original.scheduled_at_ms(),
        1,
        1,
    );
    store.add(&moved).unwrap();
    assert_eq!(store.len().unwrap(), 1);
    assert!(store.next_batch_for_level(3, 10).unwrap().is_empty());
    assert_eq!(store.next_batch_for_level(1, 10).unwrap(), vec![moved]);
}
