use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::coordinator::GroupCoordinator;
use crate::error::{BrokerError, ErrorKind};
use crate::record::{ConsumedRecord, TopicPartition};
use crate::topic::TopicRegistry;

/// A member of a consumer group. Short-polls its assigned partitions
/// from the group's committed offsets; progress is only stored by an
/// explicit commit.
///
/// Dropping a consumer that has not called [`Consumer::leave`] removes the
/// member from its group, so its partitions go back to the live members.
#[derive(Debug)]
pub struct Consumer {
    group: String,
    member_id: String,
    registry: Arc<TopicRegistry>,
    coordinator: Arc<GroupCoordinator>,
    /// Index of the partition read first on the next poll.
    start: AtomicUsize,
    left: bool,
}

impl Consumer {
    /// Join `group` as `member_id`, subscribed to `topics`.
    pub fn join(
        registry: Arc<TopicRegistry>,
        coordinator: Arc<GroupCoordinator>,
        group: &str,
        member_id: &str,
        topics: &[String],
    ) -> Result<Self, BrokerError> {
        coordinator.join(group, member_id, topics)?;
        Ok(Self {
            group: group.to_string(),
            member_id: member_id.to_string(),
            registry,
            coordinator,
            start: AtomicUsize::new(0),
            left: false,
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    pub fn assignment(&self) -> Result<Vec<TopicPartition>, BrokerError> {
        self.coordinator.assignment(&self.group, &self.member_id)
    }

    /// Up to `max_records` records past the committed offsets of the
    /// currently assigned partitions. Returns immediately; an empty batch
    /// means there is nothing new.
    pub fn poll(&self, max_records: usize) -> Result<Vec<ConsumedRecord>, BrokerError> {
        let positions = self.coordinator.positions(&self.group, &self.member_id)?;
        if positions.is_empty() || max_records == 0 {
            return Ok(Vec::new());
        }

        let first = self.start.fetch_add(1, Ordering::Relaxed) % positions.len();
        let mut batch = Vec::new();
        for (tp, offset) in positions[first..].iter().chain(&positions[..first]) {
            let remaining = max_records - batch.len();
            if remaining == 0 {
                break;
            }
            let records = match self.registry.read(&tp.topic, tp.partition, *offset, remaining) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(group = %self.group, member = %self.member_id, partition = %tp, error = %e, "skipping unreadable partition");
                    continue;
                }
            };
            batch.extend(records.into_iter().map(|record| ConsumedRecord {
                topic: tp.topic.clone(),
                partition: tp.partition,
                record,
            }));
        }
        Ok(batch)
    }

    pub fn commit(&self, tp: &TopicPartition, offset: u64) -> Result<(), BrokerError> {
        self.coordinator.commit(&self.group, tp, offset)
    }

    /// Commit `last offset + 1` for every partition present in `records`.
    pub fn commit_consumed(&self, records: &[ConsumedRecord]) -> Result<(), BrokerError> {
        let mut next: BTreeMap<TopicPartition, u64> = BTreeMap::new();
        for r in records {
            let entry = next.entry(r.topic_partition()).or_default();
            *entry = (*entry).max(r.record.offset + 1);
        }
        for (tp, offset) in &next {
            self.commit(tp, *offset)?;
        }
        Ok(())
    }

    /// Leave the group, triggering a rebalance for the remaining members.
    pub fn leave(mut self) -> Result<(), BrokerError> {
        self.left = true;
        self.coordinator.leave(&self.group, &self.member_id)
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        if self.left {
            return;
        }
        match self.coordinator.leave(&self.group, &self.member_id) {
            Ok(()) => {
                tracing::info!(group = %self.group, member = %self.member_id, "consumer dropped, left group");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(group = %self.group, member = %self.member_id, "consumer dropped, member already gone");
            }
            Err(e) => {
                tracing::warn!(group = %self.group, member = %self.member_id, error = %e, "leave on drop failed");
            }
        }
    }
}
