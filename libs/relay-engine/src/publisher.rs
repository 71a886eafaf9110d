use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::BrokerError;
use crate::record::Delivery;
use crate::topic::{Topic, TopicRegistry};

/// Appends records to topics. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Publisher {
    registry: Arc<TopicRegistry>,
    /// Partition count for topics created on first publish; `None` disables auto-create.
    auto_create: Option<u32>,
}

impl Publisher {
    pub fn new(registry: Arc<TopicRegistry>, config: &EngineConfig) -> Self {
        Self {
            registry,
            auto_create: config
                .auto_create_topics
                .then_some(config.default_partitions),
        }
    }

    /// Publish `value` to `topic`, choosing the partition from `key`.
    pub fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        value: impl Into<String>,
    ) -> Result<Delivery, BrokerError> {
        let topic_ref = match (self.registry.get(topic), self.auto_create) {
            (Some(t), _) => t,
            (None, Some(partitions)) => self.registry.create_topic(topic, partitions)?,
            (None, None) => return Err(BrokerError::TopicNotFound(topic.to_string())),
        };

        let partition = select_partition(&topic_ref, key);
        let offset = topic_ref.append(partition, key.map(str::to_string), value.into())?;
        tracing::debug!(topic = %topic, partition, offset, "published record");

        Ok(Delivery {
            topic: topic.to_string(),
            partition,
            offset,
        })
    }
}

/// Keyed records hash to a fixed partition; keyless ones go round-robin.
pub fn select_partition(topic: &Topic, key: Option<&str>) -> u32 {
    match key {
        Some(key) => partition_for_key(key, topic.partition_count()),
        None => topic.next_round_robin(),
    }
}

/// Deterministic `hash(key) mod partitions`.
pub fn partition_for_key(key: &str, partitions: u32) -> u32 {
    debug_assert!(partitions > 0, "partitions must be > 0");
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % u64::from(partitions)) as u32
}
