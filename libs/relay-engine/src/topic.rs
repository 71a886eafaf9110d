use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::error::BrokerError;
use crate::partition::PartitionLog;
use crate::record::Record;

/// A named topic with a fixed set of partition logs.
pub struct Topic {
    name: String,
    partitions: Vec<PartitionLog>,
    /// Cursor for keyless publishes.
    round_robin: AtomicU32,
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("partitions", &self.partitions.len())
            .finish()
    }
}

impl Topic {
    fn new(name: String, partitions: u32) -> Self {
        Self {
            name,
            partitions: (0..partitions).map(|_| PartitionLog::new()).collect(),
            round_robin: AtomicU32::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partition_count(&self) -> u32 {
        self.partitions.len() as u32
    }

    pub fn append(
        &self,
        partition: u32,
        key: Option<String>,
        value: String,
    ) -> Result<u64, BrokerError> {
        Ok(self.partition(partition)?.append(key, value))
    }

    pub fn read(
        &self,
        partition: u32,
        from: u64,
        max_records: usize,
    ) -> Result<Vec<Record>, BrokerError> {
        Ok(self.partition(partition)?.read(from, max_records))
    }

    pub fn end_offset(&self, partition: u32) -> Result<u64, BrokerError> {
        Ok(self.partition(partition)?.end_offset())
    }

    pub fn end_offsets(&self) -> Vec<u64> {
        self.partitions.iter().map(PartitionLog::end_offset).collect()
    }

    /// Next partition in round-robin order.
    pub(crate) fn next_round_robin(&self) -> u32 {
        self.round_robin.fetch_add(1, Ordering::Relaxed) % self.partition_count()
    }

    fn partition(&self, partition: u32) -> Result<&PartitionLog, BrokerError> {
        self.partitions
            .get(partition as usize)
            .ok_or_else(|| BrokerError::PartitionOutOfRange {
                topic: self.name.clone(),
                partition,
                partitions: self.partition_count(),
            })
    }
}

/// Summary of a topic, for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicInfo {
    pub name: String,
    pub partitions: u32,
    pub end_offsets: Vec<u64>,
}

/// Registry of all topics of a broker.
///
/// Uses interior mutability so topics can be created at runtime
/// (auto-create on publish).
#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a topic, or return the existing one with that name.
    ///
    /// The partition count of an existing topic never changes; a mismatching
    /// request is logged and ignored.
    pub fn create_topic(&self, name: &str, partitions: u32) -> Result<Arc<Topic>, BrokerError> {
        if partitions < 1 {
            return Err(BrokerError::InvalidPartitionCount {
                topic: name.to_string(),
                partitions,
            });
        }

        if let Some(existing) = self.get(name) {
            warn_on_mismatch(&existing, partitions);
            return Ok(existing);
        }

        let mut guard = self.write();
        // Another caller may have won the race between the read and the write lock.
        if let Some(existing) = guard.get(name) {
            warn_on_mismatch(existing, partitions);
            return Ok(existing.clone());
        }
        let topic = Arc::new(Topic::new(name.to_string(), partitions));
        guard.insert(name.to_string(), topic.clone());
        tracing::info!(topic = %name, partitions, "created topic");
        Ok(topic)
    }

    pub fn get_topic(&self, name: &str) -> Result<Arc<Topic>, BrokerError> {
        self.get(name)
            .ok_or_else(|| BrokerError::TopicNotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<Arc<Topic>> {
        self.read_guard().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read_guard().contains_key(name)
    }

    /// Topic names, sorted.
    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read_guard().keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of every topic, sorted by name.
    pub fn topics(&self) -> Vec<TopicInfo> {
        let mut topics: Vec<TopicInfo> = self
            .read_guard()
            .values()
            .map(|t| TopicInfo {
                name: t.name.clone(),
                partitions: t.partition_count(),
                end_offsets: t.end_offsets(),
            })
            .collect();
        topics.sort_by(|a, b| a.name.cmp(&b.name));
        topics
    }

    pub fn append(
        &self,
        topic: &str,
        partition: u32,
        key: Option<String>,
        value: String,
    ) -> Result<u64, BrokerError> {
        self.get_topic(topic)?.append(partition, key, value)
    }

    pub fn read(
        &self,
        topic: &str,
        partition: u32,
        from: u64,
        max_records: usize,
    ) -> Result<Vec<Record>, BrokerError> {
        self.get_topic(topic)?.read(partition, from, max_records)
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Topic>>> {
        match self.topics.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("topic registry read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Topic>>> {
        match self.topics.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("topic registry write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

fn warn_on_mismatch(existing: &Topic, requested: u32) {
    if existing.partition_count() != requested {
        tracing::warn!(
            topic = %existing.name,
            existing = existing.partition_count(),
            requested,
            "topic already exists with a different partition count, keeping existing"
        );
    }
}
