//! Sorted-set store backends.

pub mod file;
pub mod memory;

pub use file::FileSortedSetStore;
pub use memory::InMemorySortedSetStore;

use std::collections::{BTreeSet, HashMap};

use crate::core::IndexScore;

/// One sorted index: members unique, ordered by score then member.
#[derive(Debug, Default, Clone)]
pub(crate) struct SortedIndex {
    by_score: BTreeSet<(IndexScore, String)>,
    scores: HashMap<String, IndexScore>,
}

impl SortedIndex {
    pub(crate) fn insert(&mut self, member: &str, score: IndexScore) {
        if let Some(old) = self.scores.insert(member.to_owned(), score) {
            self.by_score.remove(&(old, member.to_owned()));
        }
        self.by_score.insert((score, member.to_owned()));
    }

    pub(crate) fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.by_score.remove(&(score, member.to_owned()));
                true
            }
            None => false,
        }
    }

    pub(crate) fn range(&self, limit: usize) -> Vec<String> {
        self.by_score
            .iter()
            .take(limit)
            .map(|(_, member)| member.clone())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.scores.len()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&IndexScore, &String)> {
        self.by_score.iter().map(|(score, member)| (score, member))
    }
}

/// Values plus named indices; the state every backend keeps in memory.
#[derive(Debug, Default, Clone)]
pub(crate) struct SortedSetState {
    pub(crate) values: HashMap<String, String>,
    pub(crate) indices: HashMap<String, SortedIndex>,
}

impl SortedSetState {
    pub(crate) fn put(&mut self, key: &str, value: String) {
        self.values.insert(key.to_owned(), value);
    }

    pub(crate) fn delete(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub(crate) fn zadd(&mut self, index: &str, member: &str, score: IndexScore) {
        self.indices
            .entry(index.to_owned())
            .or_default()
            .insert(member, score);
    }

    pub(crate) fn zrem(&mut self, index: &str, member: &str) -> bool {
        let Some(sorted) = self.indices.get_mut(index) else {
            return false;
        };
        let removed = sorted.remove(member);
        if sorted.scores.is_empty() {
            self.indices.remove(index);
        }
        removed
    }

    pub(crate) fn range(&self, index: &str, limit: usize) -> Vec<String> {
        self.indices
            .get(index)
            .map(|sorted| sorted.range(limit))
            .unwrap_or_default()
    }

    pub(crate) fn index_len(&self, index: &str) -> usize {
        self.indices.get(index).map_or(0, SortedIndex::len)
    }
}
