//! Durable overflow store: key/value entries plus one ordered index per priority level.
//!
//! Key layout over the backend:
//! - `mailqueue:record:{id}` holds the JSON-encoded [`SchedulingRecord`].
//! - `mailqueue:level:{n}` is a sorted index of record ids for band `n`,
//!   scored by `(scheduled time, desired priority, sequence)`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::record::{RecordId, SchedulingRecord};
use crate::core::SchedulerError;
use crate::util::clock::now_ms;

/// Ids removed per round when clearing a whole level.
pub const REMOVE_CHUNK: usize = 2_000;

const INDEX_PREFIX: &str = "mailqueue:level:";
const VALUE_PREFIX: &str = "mailqueue:record:";

/// Position of a member within a sorted index.
///
/// The sequence breaks ties so identical timestamps sort deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexScore {
    /// Due instant, UTC milliseconds.
    pub scheduled_at_ms: u128,
    /// Priority as requested by the caller.
    pub desired_priority: u32,
    /// Monotonic collision breaker.
    pub sequence: u64,
}

/// Abstraction for the external sorted-set key/value store.
///
/// Every method is independently safe for concurrent use. The two record
/// methods must apply their value and index mutations atomically.
pub trait SortedSetBackend: Send + Sync {
    /// Upsert `value` under `key` and place `member` in `index` at `score`.
    /// A member already in the index is moved, never duplicated.
    fn write_record(
        &self,
        key: &str,
        value: String,
        index: &str,
        member: &str,
        score: IndexScore,
    ) -> Result<(), SchedulerError>;

    /// Delete `key` and drop `member` from `index`. Returns whether the value existed.
    fn delete_record(&self, key: &str, index: &str, member: &str) -> Result<bool, SchedulerError>;

    /// Read a value.
    fn get_value(&self, key: &str) -> Result<Option<String>, SchedulerError>;

    /// Delete values, returning how many existed.
    fn delete_values(&self, keys: &[String]) -> Result<usize, SchedulerError>;

    /// Lowest-scored members of `index`, at most `limit`, in score order.
    fn index_range(&self, index: &str, limit: usize) -> Result<Vec<String>, SchedulerError>;

    /// Drop members from `index`, returning how many were present.
    fn index_remove(&self, index: &str, members: &[String]) -> Result<usize, SchedulerError>;

    /// Number of members in `index`.
    fn index_len(&self, index: &str) -> Result<usize, SchedulerError>;
}

/// Adapter persisting scheduling records over a [`SortedSetBackend`].
pub struct DurableStore {
    backend: Arc<dyn SortedSetBackend>,
    levels: u32,
    sequence: AtomicU64,
}

impl DurableStore {
    /// Wrap a backend for a queue with `levels` priority bands.
    pub fn new(backend: Arc<dyn SortedSetBackend>, levels: u32) -> Self {
        // Seeded from the clock so sequences keep increasing across restarts.
        let seed = u64::try_from(now_ms()).unwrap_or(0).saturating_mul(1_000);
        Self {
            backend,
            levels: levels.max(1),
            sequence: AtomicU64::new(seed),
        }
    }

    /// Name of the ordering index for a priority level.
    #[must_use]
    pub fn index_name(level: u32) -> String {
        format!("{INDEX_PREFIX}{level}")
    }

    /// Name of the value entry for a record.
    #[must_use]
    pub fn value_key(id: RecordId) -> String {
        format!("{VALUE_PREFIX}{id}")
    }

    /// Number of priority levels covered.
    #[must_use]
    pub const fn levels(&self) -> u32 {
        self.levels
    }

    /// Persist a record, replacing any previous entry with the same id.
    pub fn add(&self, record: &SchedulingRecord) -> Result<(), SchedulerError> {
        let id = record.id();
        let key = Self::value_key(id);
        let member = id.to_string();
        let level = record.assigned_priority();

        if let Some(previous) = self.get(id)? {
            let old_level = previous.assigned_priority();
            if old_level != level {
                self.backend
                    .index_remove(&Self::index_name(old_level), std::slice::from_ref(&member))?;
            }
        }

        let score = IndexScore {
            scheduled_at_ms: record.scheduled_at_ms(),
            desired_priority: record.desired_priority(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        let value = serde_json::to_string(record)?;
        self.backend
            .write_record(&key, value, &Self::index_name(level), &member, score)?;
        tracing::trace!(record_id = %id, level, "record persisted");
        Ok(())
    }

    /// Persist several records, returning how many were stored.
    pub fn add_all<'a, I>(&self, records: I) -> Result<usize, SchedulerError>
    where
        I: IntoIterator<Item = &'a SchedulingRecord>,
    {
        let mut stored = 0;
        for record in records {
            self.add(record)?;
            stored += 1;
        }
        Ok(stored)
    }

    /// Load a record by id.
    pub fn get(&self, id: RecordId) -> Result<Option<SchedulingRecord>, SchedulerError> {
        self.backend
            .get_value(&Self::value_key(id))?
            .map(|raw| serde_json::from_str(&raw).map_err(SchedulerError::from))
            .transpose()
    }

    /// Remove a record. Returns `true` if it was stored.
    pub fn remove(&self, id: RecordId) -> Result<bool, SchedulerError> {
        let key = Self::value_key(id);
        let member = id.to_string();
        match self.get(id) {
            Ok(Some(record)) => {
                self.backend
                    .delete_record(&key, &Self::index_name(record.assigned_priority()), &member)
            }
            Ok(None) => {
                self.drop_from_all_indices(&member)?;
                Ok(false)
            }
            Err(SchedulerError::Serialization(e)) => {
                tracing::warn!(record_id = %id, error = %e, "removing undecodable record");
                self.drop_from_all_indices(&member)?;
                Ok(self.backend.delete_values(&[key])? > 0)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove several records, returning how many were stored.
    pub fn remove_all(&self, ids: &[RecordId]) -> Result<usize, SchedulerError> {
        let mut removed = 0;
        for id in ids {
            if self.remove(*id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every record of one level, [`REMOVE_CHUNK`] ids per round.
    pub fn clear_level(&self, level: u32) -> Result<usize, SchedulerError> {
        let index = Self::index_name(level);
        let mut removed = 0;
        loop {
            let members = self.backend.index_range(&index, REMOVE_CHUNK)?;
            if members.is_empty() {
                break;
            }
            let keys: Vec<String> = members
                .iter()
                .map(|m| format!("{VALUE_PREFIX}{m}"))
                .collect();
            self.backend.delete_values(&keys)?;
            removed += self.backend.index_remove(&index, &members)?;
            tracing::debug!(level, chunk = members.len(), "cleared chunk of level");
        }
        Ok(removed)
    }

    /// Earliest records of one level, at most `max_size`.
    ///
    /// Index members whose value is missing or undecodable are pruned.
    pub fn next_batch_for_level(
        &self,
        level: u32,
        max_size: usize,
    ) -> Result<Vec<SchedulingRecord>, SchedulerError> {
        if max_size == 0 {
            return Ok(Vec::new());
        }
        let index = Self::index_name(level);
        let members = self.backend.index_range(&index, max_size)?;
        let mut records = Vec::with_capacity(members.len());
        let mut dangling = Vec::new();
        for member in members {
            let key = format!("{VALUE_PREFIX}{member}");
            match self.backend.get_value(&key)? {
                Some(raw) => match serde_json::from_str::<SchedulingRecord>(&raw) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        tracing::warn!(member = %member, error = %e, "pruning undecodable record");
                        self.backend.delete_values(&[key])?;
                        dangling.push(member);
                    }
                },
                None => {
                    tracing::warn!(member = %member, level, "pruning index entry without value");
                    dangling.push(member);
                }
            }
        }
        if !dangling.is_empty() {
            self.backend.index_remove(&index, &dangling)?;
        }
        Ok(records)
    }

    /// Earliest records across all levels, merged by due time then level, at most `max_size`.
    ///
    /// Equal due times within one level keep their index order.
    pub fn next_batch(&self, max_size: usize) -> Result<Vec<SchedulingRecord>, SchedulerError> {
        let mut merged = Vec::new();
        for level in 1..=self.levels {
            merged.extend(self.next_batch_for_level(level, max_size)?);
        }
        // Stable: ties inside a level stay in (desired priority, sequence) order.
        merged.sort_by_key(|r| (r.scheduled_at_ms(), r.assigned_priority()));
        merged.truncate(max_size);
        Ok(merged)
    }

    /// Number of records indexed across all levels.
    pub fn len(&self) -> Result<usize, SchedulerError> {
        let mut total = 0;
        for level in 1..=self.levels {
            total += self.backend.index_len(&Self::index_name(level))?;
        }
        Ok(total)
    }

    /// Whether no record is indexed.
    pub fn is_empty(&self) -> Result<bool, SchedulerError> {
        Ok(self.len()? == 0)
    }

    fn drop_from_all_indices(&self, member: &str) -> Result<(), SchedulerError> {
        let members = [member.to_owned()];
        for level in 1..=self.levels {
            self.backend.index_remove(&Self::index_name(level), &members)?;
        }
        Ok(())
    }
}
