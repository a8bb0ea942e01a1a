//! Bounded in-memory working set with priority bands and an eviction policy.
//!
//! The working set is split into one ordered band per priority level. All
//! mutation is serialized through a small state machine: a producer claims
//! `Enqueuing`, the dispatcher claims `Dequeuing`, and only one claim is held
//! at a time. Claims are RAII sessions, so a producer can write to the durable
//! store between claiming and offering without holding the queue mutex.
//!
//! When persistence is active the working set is bounded by `max_in_memory`.
//! Each band remembers the greatest key it received from the durable store
//! that is still resident (its watermark). A newly scheduled record only
//! displaces resident work when it sorts before the earliest watermark plus
//! [`QUEUABILITY_DELTA_MS`]; anything later waits in the durable store for
//! backfill, which loads earliest-first.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::core::record::{QueueKey, SchedulingRecord};
use crate::util::clock::{millis_until, now_ms};

/// Grace window added to the admission threshold, in milliseconds.
pub const QUEUABILITY_DELTA_MS: u128 = 1_000;

/// Exclusive-access state of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Nobody holds the queue.
    Idle,
    /// A producer holds the queue.
    Enqueuing,
    /// The dispatcher holds the queue.
    Dequeuing,
    /// Terminal; every waiter is released and no further mutation happens.
    Closing,
}

/// Outcome of offering a record to the working set.
#[derive(Debug, Clone)]
pub enum Admission {
    /// Inserted without displacing anything.
    Admitted,
    /// Inserted after evicting the latest resident record.
    Evicted(Arc<SchedulingRecord>),
    /// An equal record is already resident.
    Duplicate,
    /// Not admitted now; the record stays in the durable store for backfill.
    Deferred,
    /// The record's priority has no band in this queue.
    Rejected,
    /// The queue is closing.
    Closed,
}

impl Admission {
    /// Whether the record entered the working set.
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted | Self::Evicted(_))
    }
}

#[derive(Default)]
struct PriorityBand {
    records: BTreeMap<QueueKey, Arc<SchedulingRecord>>,
    watermark: Option<QueueKey>,
}

impl PriorityBand {
    fn head(&self) -> Option<QueueKey> {
        self.records.first_key_value().map(|(k, _)| *k)
    }

    fn tail(&self) -> Option<QueueKey> {
        self.records.last_key_value().map(|(k, _)| *k)
    }
}

struct QueueInner {
    state: QueueState,
    bands: Vec<PriorityBand>,
    len: usize,
}

impl QueueInner {
    fn band_index(&self, priority: u32) -> Option<usize> {
        let idx = usize::try_from(priority).ok()?.checked_sub(1)?;
        (idx < self.bands.len()).then_some(idx)
    }

    fn earliest(&self) -> Option<QueueKey> {
        self.bands.iter().filter_map(PriorityBand::head).min()
    }

    fn latest(&self) -> Option<QueueKey> {
        self.bands.iter().filter_map(PriorityBand::tail).max()
    }

    /// `(time, priority)` a non-backfilled record must beat to displace resident work.
    fn admission_threshold(&self) -> Option<(u128, u32)> {
        let watermark = self.bands.iter().filter_map(|b| b.watermark).min();
        match watermark {
            Some(k) => Some((
                k.scheduled_at_ms.saturating_add(QUEUABILITY_DELTA_MS),
                k.priority,
            )),
            None => self.latest().map(|k| (k.scheduled_at_ms, k.priority)),
        }
    }

    fn is_early_enough(&self, key: &QueueKey) -> bool {
        self.admission_threshold().is_some_and(|(time, priority)| {
            key.scheduled_at_ms < time || (key.scheduled_at_ms == time && key.priority < priority)
        })
    }

    fn insert(&mut self, idx: usize, record: Arc<SchedulingRecord>, from_durable_store: bool) {
        let key = record.key();
        let band = &mut self.bands[idx];
        band.records.insert(key, record);
        if from_durable_store && band.watermark.is_none_or(|w| w < key) {
            band.watermark = Some(key);
        }
        self.len += 1;
    }

    fn evict(&mut self, key: QueueKey) -> Option<Arc<SchedulingRecord>> {
        let idx = self.band_index(key.priority)?;
        let band = &mut self.bands[idx];
        let evicted = band.records.remove(&key)?;
        if band.watermark.is_some_and(|w| w >= key) {
            band.watermark = band.tail();
        }
        self.len -= 1;
        Some(evicted)
    }

    fn take(&mut self, key: QueueKey) -> Option<Arc<SchedulingRecord>> {
        let idx = self.band_index(key.priority)?;
        let band = &mut self.bands[idx];
        let record = band.records.remove(&key)?;
        if band.records.is_empty() {
            band.watermark = None;
        }
        self.len -= 1;
        Some(record)
    }
}

/// The in-memory working set shared by producers, the dispatcher, and backfill.
pub struct SchedulingQueue {
    inner: Mutex<QueueInner>,
    state_changed: Condvar,
    levels: u32,
    max_in_memory: Option<usize>,
}

impl SchedulingQueue {
    /// Create a queue with `levels` priority bands.
    ///
    /// `max_in_memory` bounds the working set; pass `None` when nothing is
    /// persisted, in which case every record is admitted.
    #[must_use]
    pub fn new(levels: u32, max_in_memory: Option<usize>) -> Self {
        let levels = levels.max(1);
        let bands = (0..levels).map(|_| PriorityBand::default()).collect();
        Self {
            inner: Mutex::new(QueueInner {
                state: QueueState::Idle,
                bands,
                len: 0,
            }),
            state_changed: Condvar::new(),
            levels,
            max_in_memory,
        }
    }

    /// Block until the queue is idle and claim it for enqueuing.
    ///
    /// Returns `None` once the queue is closing.
    pub fn begin_enqueue(&self) -> Option<EnqueueSession<'_>> {
        self.acquire(QueueState::Enqueuing)
            .then(|| EnqueueSession { queue: self })
    }

    /// Block until the queue is idle and claim it for dequeuing.
    ///
    /// Returns `None` once the queue is closing.
    pub fn begin_dequeue(&self) -> Option<DequeueSession<'_>> {
        self.acquire(QueueState::Dequeuing)
            .then(|| DequeueSession { queue: self })
    }

    /// Offer one record under a short-lived enqueue session.
    ///
    /// Returns whether the record entered the working set. `false` is not a
    /// failure: a persisted record waits in the durable store for backfill.
    pub fn enqueue(&self, record: Arc<SchedulingRecord>, from_durable_store: bool) -> bool {
        self.begin_enqueue()
            .is_some_and(|session| session.offer(record, from_durable_store).is_admitted())
    }

    /// Remove and return the earliest record due within `tolerance` of now.
    pub fn dequeue_next(&self, tolerance: Duration) -> Option<Arc<SchedulingRecord>> {
        self.begin_dequeue()?.next_due(tolerance)
    }

    /// Close the queue. Terminal; wakes every waiter.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.state = QueueState::Closing;
        drop(inner);
        self.state_changed.notify_all();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closing(&self) -> bool {
        self.inner.lock().state == QueueState::Closing
    }

    /// Current exclusive-access state.
    pub fn state(&self) -> QueueState {
        self.inner.lock().state
    }

    /// Whether any record is resident.
    pub fn has_elements(&self) -> bool {
        self.inner.lock().len > 0
    }

    /// Number of resident records.
    pub fn currently_in_queue(&self) -> usize {
        self.inner.lock().len
    }

    /// Milliseconds until the earliest resident record is due; zero when
    /// overdue, `None` when empty.
    pub fn millis_to_next_email(&self) -> Option<u64> {
        let earliest = self.inner.lock().earliest()?;
        Some(millis_until(earliest.scheduled_at_ms, now_ms()))
    }

    /// Due instant of the earliest resident record.
    pub fn next_due_at_ms(&self) -> Option<u128> {
        self.inner.lock().earliest().map(|k| k.scheduled_at_ms)
    }

    /// Whether a record with this key is resident.
    pub fn contains(&self, key: &QueueKey) -> bool {
        let inner = self.inner.lock();
        inner
            .band_index(key.priority)
            .is_some_and(|idx| inner.bands[idx].records.contains_key(key))
    }

    /// Number of priority levels.
    #[must_use]
    pub const fn number_of_levels(&self) -> u32 {
        self.levels
    }

    /// Bound on resident records, if any.
    #[must_use]
    pub const fn max_in_memory(&self) -> Option<usize> {
        self.max_in_memory
    }

    fn acquire(&self, claim: QueueState) -> bool {
        let mut inner = self.inner.lock();
        loop {
            match inner.state {
                QueueState::Closing => return false,
                QueueState::Idle => {
                    inner.state = claim;
                    return true;
                }
                QueueState::Enqueuing | QueueState::Dequeuing => {
                    self.state_changed.wait(&mut inner);
                }
            }
        }
    }

    fn release(&self, held: QueueState) {
        let mut inner = self.inner.lock();
        if inner.state == held {
            inner.state = QueueState::Idle;
        }
        drop(inner);
        self.state_changed.notify_all();
    }

    fn admit(&self, record: Arc<SchedulingRecord>, from_durable_store: bool) -> Admission {
        let mut inner = self.inner.lock();
        if inner.state == QueueState::Closing {
            return Admission::Closed;
        }
        let key = record.key();
        let Some(idx) = inner.band_index(key.priority) else {
            tracing::warn!(
                record_id = %key.id,
                priority = key.priority,
                levels = self.levels,
                "record priority has no band; not admitted"
            );
            return Admission::Rejected;
        };
        if inner.bands[idx].records.contains_key(&key) {
            return Admission::Duplicate;
        }

        let Some(max) = self.max_in_memory else {
            inner.insert(idx, record, from_durable_store);
            return Admission::Admitted;
        };
        if inner.len < max {
            inner.insert(idx, record, from_durable_store);
            return Admission::Admitted;
        }

        if !from_durable_store && !inner.is_early_enough(&key) {
            tracing::debug!(record_id = %key.id, "working set full; deferring to backfill");
            return Admission::Deferred;
        }
        let Some(latest) = inner.latest() else {
            return Admission::Deferred;
        };
        if key >= latest {
            return Admission::Deferred;
        }
        let Some(evicted) = inner.evict(latest) else {
            return Admission::Deferred;
        };
        tracing::debug!(
            record_id = %key.id,
            evicted_id = %latest.id,
            "evicted latest record to admit earlier one"
        );
        inner.insert(idx, record, from_durable_store);
        Admission::Evicted(evicted)
    }

    fn take_due(&self, tolerance: Duration) -> Option<Arc<SchedulingRecord>> {
        let mut inner = self.inner.lock();
        if inner.state == QueueState::Closing {
            return None;
        }
        let earliest = inner.earliest()?;
        let horizon = now_ms().saturating_add(tolerance.as_millis());
        if earliest.scheduled_at_ms > horizon {
            return None;
        }
        inner.take(earliest)
    }
}

/// Exclusive enqueue claim. Dropping it releases the queue.
pub struct EnqueueSession<'a> {
    queue: &'a SchedulingQueue,
}

impl EnqueueSession<'_> {
    /// Offer a record to the working set.
    ///
    /// Records from the durable store skip the admission threshold; they are
    /// authoritative backlog. Either path evicts the latest resident record
    /// when the working set is full and the offered record sorts before it.
    pub fn offer(&self, record: Arc<SchedulingRecord>, from_durable_store: bool) -> Admission {
        self.queue.admit(record, from_durable_store)
    }

    /// Release the claim explicitly.
    pub fn complete(self) {}
}

impl Drop for EnqueueSession<'_> {
    fn drop(&mut self) {
        self.queue.release(QueueState::Enqueuing);
    }
}

/// Exclusive dequeue claim. Dropping it releases the queue.
pub struct DequeueSession<'a> {
    queue: &'a SchedulingQueue,
}

impl DequeueSession<'_> {
    /// Remove and return the earliest record due within `tolerance` of now.
    ///
    /// Equal due times resolve to the lower band first.
    pub fn next_due(&self, tolerance: Duration) -> Option<Arc<SchedulingRecord>> {
        self.queue.take_due(tolerance)
    }

    /// Release the claim explicitly.
    pub fn complete(self) {}
}

impl Drop for DequeueSession<'_> {
    fn drop(&mut self) {
        self.queue.release(QueueState::Dequeuing);
    }
}
