//! File-backed sorted-set store.
//!
//! Every mutation is appended to a JSON-lines operation log and applied to an
//! in-memory copy of the state. Opening the store replays the log. One line
//! carries all operations for one record, so a record's value and index entry
//! are written together. [`FileSortedSetStore::compact`] rewrites the log to
//! the minimal set of operations for the current state.

use std::fs::{self, create_dir_all, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::{IndexScore, SchedulerError, SortedSetBackend};
use crate::infra::store::SortedSetState;

// Externally tagged: internally tagged enums cannot carry the u128 score.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum LogOp {
    Put { key: String, value: String },
    Del { key: String },
    Zadd { index: String, member: String, score: IndexScore },
    Zrem { index: String, member: String },
}

impl LogOp {
    fn apply(self, state: &mut SortedSetState) {
        match self {
            Self::Put { key, value } => state.put(&key, value),
            Self::Del { key } => {
                state.delete(&key);
            }
            Self::Zadd { index, member, score } => state.zadd(&index, &member, score),
            Self::Zrem { index, member } => {
                state.zrem(&index, &member);
            }
        }
    }
}

/// Sorted-set store persisted as a JSON-lines operation log.
pub struct FileSortedSetStore {
    path: PathBuf,
    stream: String,
    state: Mutex<SortedSetState>,
}

impl FileSortedSetStore {
    /// Open (or create) the store `stream` under directory `path`, replaying its log.
    pub fn open(path: impl AsRef<Path>, stream: impl Into<String>) -> Result<Self, SchedulerError> {
        let path = path.as_ref().to_path_buf();
        let stream = stream.into();
        create_dir_all(&path)?;
        let store = Self {
            path,
            stream,
            state: Mutex::new(SortedSetState::default()),
        };
        let replayed = store.load_from_disk()?;
        tracing::info!(
            path = %store.file_path().display(),
            operations = replayed,
            "file store opened"
        );
        Ok(store)
    }

    fn file_path(&self) -> PathBuf {
        self.path.join(format!("{}.jsonl", self.stream))
    }

    fn load_from_disk(&self) -> Result<usize, SchedulerError> {
        let file_path = self.file_path();
        if !file_path.exists() {
            return Ok(0);
        }
        let mut reader = BufReader::new(File::open(&file_path)?);
        let mut state = self.state.lock();
        let mut buf = Vec::new();
        let mut applied = 0;
        let mut line_no = 0usize;
        // Byte offset just past the last complete line.
        let mut good_end = 0u64;
        let mut torn = false;
        let mut unterminated = false;
        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf)?;
            if read == 0 {
                break;
            }
            line_no += 1;
            let at_eof = reader.fill_buf()?.is_empty();
            if buf.iter().all(u8::is_ascii_whitespace) {
                good_end += read as u64;
                continue;
            }
            match serde_json::from_slice::<Vec<LogOp>>(&buf) {
                Ok(ops) => {
                    applied += ops.len();
                    for op in ops {
                        op.apply(&mut state);
                    }
                    good_end += read as u64;
                    unterminated = buf.last() != Some(&b'\n');
                }
                // A torn final line is what an interrupted append leaves behind.
                Err(e) if at_eof => {
                    tracing::warn!(error = %e, line = line_no, "dropping torn final line of store log");
                    torn = true;
                }
                Err(e) => {
                    return Err(SchedulerError::Backend(format!(
                        "corrupt store log {} at line {line_no}: {e}",
                        file_path.display()
                    )))
                }
            }
        }
        drop(reader);

        // Later appends must start on a fresh line.
        if torn {
            OpenOptions::new()
                .write(true)
                .open(&file_path)?
                .set_len(good_end)?;
        } else if unterminated {
            let mut file = OpenOptions::new().append(true).open(&file_path)?;
            file.write_all(b"\n")?;
            file.sync_data()?;
        }
        Ok(applied)
    }

    fn append(&self, ops: &[LogOp]) -> Result<(), SchedulerError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_path())?;
        let mut line = serde_json::to_string(ops)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Rewrite the log to hold only the current state.
    pub fn compact(&self) -> Result<(), SchedulerError> {
        let state = self.state.lock();
        let tmp_path = self.path.join(format!("{}.jsonl.tmp", self.stream));
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            for (key, value) in &state.values {
                let op = [LogOp::Put {
                    key: key.clone(),
                    value: value.clone(),
                }];
                writeln!(writer, "{}", serde_json::to_string(&op)?)?;
            }
            for (index, sorted) in &state.indices {
                let ops: Vec<LogOp> = sorted
                    .entries()
                    .map(|(score, member)| LogOp::Zadd {
                        index: index.clone(),
                        member: member.clone(),
                        score: *score,
                    })
                    .collect();
                if !ops.is_empty() {
                    writeln!(writer, "{}", serde_json::to_string(&ops)?)?;
                }
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, self.file_path())?;
        tracing::debug!(values = state.values.len(), "store log compacted");
        Ok(())
    }

    /// Number of stored values.
    pub fn value_count(&self) -> usize {
        self.state.lock().values.len()
    }
}

impl SortedSetBackend for FileSortedSetStore {
    fn write_record(
        &self,
        key: &str,
        value: String,
        index: &str,
        member: &str,
        score: IndexScore,
    ) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        let ops = [
            LogOp::Put {
                key: key.to_owned(),
                value: value.clone(),
            },
            LogOp::Zadd {
                index: index.to_owned(),
                member: member.to_owned(),
                score,
            },
        ];
        self.append(&ops)?;
        state.put(key, value);
        state.zadd(index, member, score);
        Ok(())
    }

    fn delete_record(&self, key: &str, index: &str, member: &str) -> Result<bool, SchedulerError> {
        let mut state = self.state.lock();
        let ops = [
            LogOp::Zrem {
                index: index.to_owned(),
                member: member.to_owned(),
            },
            LogOp::Del { key: key.to_owned() },
        ];
        self.append(&ops)?;
        state.zrem(index, member);
        Ok(state.delete(key))
    }

    fn get_value(&self, key: &str) -> Result<Option<String>, SchedulerError> {
        Ok(self.state.lock().values.get(key).cloned())
    }

    fn delete_values(&self, keys: &[String]) -> Result<usize, SchedulerError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut state = self.state.lock();
        let ops: Vec<LogOp> = keys.iter().map(|k| LogOp::Del { key: k.clone() }).collect();
        self.append(&ops)?;
        Ok(keys.iter().filter(|k| state.delete(k)).count())
    }

    fn index_range(&self, index: &str, limit: usize) -> Result<Vec<String>, SchedulerError> {
        Ok(self.state.lock().range(index, limit))
    }

    fn index_remove(&self, index: &str, members: &[String]) -> Result<usize, SchedulerError> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut state = self.state.lock();
        let ops: Vec<LogOp> = members
            .iter()
            .map(|m| LogOp::Zrem {
                index: index.to_owned(),
                member: m.clone(),
            })
            .collect();
        self.append(&ops)?;
        Ok(members.iter().filter(|m| state.zrem(index, m)).count())
    }

    fn index_len(&self, index: &str) -> Result<usize, SchedulerError> {
        Ok(self.state.lock().index_len(index))
    }
}
