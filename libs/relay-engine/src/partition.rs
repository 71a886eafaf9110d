use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::record::{now_ms, Record};

/// Append-only record sequence of a single partition.
///
/// Appends are serialized by the write lock. A read copies the requested
/// range while holding the read lock, so readers see the log as of the call
/// and never observe a half-written record.
#[derive(Debug, Default)]
pub struct PartitionLog {
    records: RwLock<Vec<Record>>,
}

impl PartitionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return its offset.
    pub fn append(&self, key: Option<String>, value: String) -> u64 {
        let mut records = self.write();
        let offset = records.len() as u64;
        records.push(Record {
            offset,
            key,
            value,
            ts_ms: now_ms(),
        });
        offset
    }

    /// Records with `offset >= from`, ascending, at most `max_records`.
    pub fn read(&self, from: u64, max_records: usize) -> Vec<Record> {
        let records = self.read_guard();
        let start = usize::try_from(from).unwrap_or(usize::MAX);
        if start >= records.len() {
            return Vec::new();
        }
        let end = records.len().min(start.saturating_add(max_records));
        records[start..end].to_vec()
    }

    /// Offset the next append will receive.
    pub fn end_offset(&self) -> u64 {
        self.read_guard().len() as u64
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Vec<Record>> {
        match self.records.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("partition log read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Record>> {
        match self.records.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("partition log write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
