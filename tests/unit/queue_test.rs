//! Tests for the scheduling queue

use std::sync::Arc;
use std::time::Duration;

use prometheus_mail_scheduler::core::{
    Admission, MailMessage, MailPayload, QueueState, SchedulingQueue, SchedulingRecord,
    QUEUABILITY_DELTA_MS,
};
use prometheus_mail_scheduler::util::clock::now_ms;
use rand::seq::SliceRandom;
use rand::Rng;

fn record(at: u128, priority: u32) -> Arc<SchedulingRecord> {
    Arc::new(SchedulingRecord::new(
        MailPayload::Plain {
            message: MailMessage::new("ops@example.com", "queued").to("a@example.com"),
        },
        at,
        priority,
        priority,
    ))
}

fn drain(queue: &SchedulingQueue) -> Vec<Arc<SchedulingRecord>> {
    std::iter::from_fn(|| queue.dequeue_next(Duration::ZERO)).collect()
}

#[test]
fn test_random_insertion_dequeues_in_key_order() {
    let mut rng = rand::rng();
    let base = now_ms() - 100_000;
    let mut records: Vec<_> = (0..200)
        .map(|_| record(base + rng.random_range(0..50u128), rng.random_range(1..=4)))
        .collect();
    records.shuffle(&mut rng);

    let queue = SchedulingQueue::new(4, None);
    for r in &records {
        assert!(queue.enqueue(Arc::clone(r), false));
    }
    let mut expected: Vec<_> = records.iter().map(|r| r.key()).collect();
    expected.sort();

    let dequeued: Vec<_> = drain(&queue).iter().map(|r| r.key()).collect();
    assert_eq!(dequeued, expected);
}

#[test]
fn test_same_time_three_levels_dispatch_one_two_three() {
    let at = now_ms() - 1_000;
    let queue = SchedulingQueue::new(3, None);
    let (p3, p1, p2) = (record(at, 3), record(at, 1), record(at, 2));
    for r in [&p3, &p1, &p2] {
        queue.enqueue(Arc::clone(r), false);
    }
    let order: Vec<_> = drain(&queue).iter().map(|r| r.assigned_priority()).collect();
    assert_eq!(order, vec![1, 2, 3]);
}

#[test]
fn test_read_only_views() {
    let queue = SchedulingQueue::new(5, Some(7));
    assert_eq!(queue.number_of_levels(), 5);
    assert_eq!(queue.max_in_memory(), Some(7));
    assert_eq!(queue.state(), QueueState::Idle);
    assert!(!queue.has_elements());
    assert_eq!(queue.millis_to_next_email(), None);

    queue.enqueue(record(now_ms() - 5_000, 2), false);
    assert_eq!(queue.millis_to_next_email(), Some(0));
    assert!(!queue.is_closing());
}

#[test]
fn test_zero_levels_become_one() {
    let queue = SchedulingQueue::new(0, None);
    assert_eq!(queue.number_of_levels(), 1);
}

#[test]
fn test_watermark_clears_when_band_drains() {
    let now = now_ms();
    let queue = SchedulingQueue::new(1, Some(1));
    queue.enqueue(record(now - 10, 1), true);
    assert!(queue.dequeue_next(Duration::ZERO).is_some());

    // Empty again: admission goes by capacity only.
    let far = record(now + 1_000_000, 1);
    assert!(queue.enqueue(Arc::clone(&far), false));

    // Full with no watermark: the latest resident record is the threshold.
    let session = queue.begin_enqueue().unwrap();
    assert!(matches!(
        session.offer(record(now + 2_000_000, 1), false),
        Admission::Deferred
    ));
    assert!(matches!(
        session.offer(record(now + 500_000, 1), false),
        Admission::Evicted(_)
    ));
}

#[test]
fn test_grace_window_boundary() {
    let queue = SchedulingQueue::new(2, Some(1));
    queue.enqueue(record(50_000, 2), true);
    let threshold = 50_000 + QUEUABILITY_DELTA_MS;

    // At the threshold time on the same level: not early enough.
    assert!(!queue.enqueue(record(threshold, 2), false));
    // One millisecond earlier, but still later than the resident record: no eviction.
    assert!(!queue.enqueue(record(threshold - 1, 2), false));
    // Earlier than the resident record: evicts it.
    assert!(queue.enqueue(record(49_000, 2), false));
    assert_eq!(queue.next_due_at_ms(), Some(49_000));
}

#[test]
fn test_disabled_bound_admits_everything() {
    let queue = SchedulingQueue::new(1, None);
    for i in 0..1_000u128 {
        assert!(queue.enqueue(record(i, 1), false));
    }
    assert_eq!(queue.currently_in_queue(), 1_000);
}
