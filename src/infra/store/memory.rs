//! In-memory sorted-set store for development and tests.

use parking_lot::Mutex;

use crate::core::{IndexScore, SchedulerError, SortedSetBackend};
use crate::infra::store::SortedSetState;

/// Volatile sorted-set store. Contents are lost when dropped.
#[derive(Default)]
pub struct InMemorySortedSetStore {
    state: Mutex<SortedSetState>,
}

impl InMemorySortedSetStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values.
    pub fn value_count(&self) -> usize {
        self.state.lock().values.len()
    }
}

impl SortedSetBackend for InMemorySortedSetStore {
    fn write_record(
        &self,
        key: &str,
        value: String,
        index: &str,
        member: &str,
        score: IndexScore,
    ) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        state.put(key, value);
        state.zadd(index, member, score);
        Ok(())
    }

    fn delete_record(&self, key: &str, index: &str, member: &str) -> Result<bool, SchedulerError> {
        let mut state = self.state.lock();
        state.zrem(index, member);
        Ok(state.delete(key))
    }

    fn get_value(&self, key: &str) -> Result<Option<String>, SchedulerError> {
        Ok(self.state.lock().values.get(key).cloned())
    }

    fn delete_values(&self, keys: &[String]) -> Result<usize, SchedulerError> {
        let mut state = self.state.lock();
        Ok(keys.iter().filter(|k| state.delete(k)).count())
    }

    fn index_range(&self, index: &str, limit: usize) -> Result<Vec<String>, SchedulerError> {
        Ok(self.state.lock().range(index, limit))
    }

    fn index_remove(&self, index: &str, members: &[String]) -> Result<usize, SchedulerError> {
        let mut state = self.state.lock();
        Ok(members.iter().filter(|m| state.zrem(index, m)).count())
    }

    fn index_len(&self, index: &str) -> Result<usize, SchedulerError> {
        Ok(self.state.lock().index_len(index))
    }
}
