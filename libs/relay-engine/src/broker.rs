use std::sync::Arc;

use crate::config::EngineConfig;
use crate::consumer::Consumer;
use crate::coordinator::GroupCoordinator;
use crate::error::BrokerError;
use crate::publisher::Publisher;
use crate::topic::{Topic, TopicRegistry};

/// The in-process broker: owns the topic registry and the group
/// coordinator, and hands out publishers and consumers wired to them.
#[derive(Debug)]
pub struct Broker {
    config: EngineConfig,
    registry: Arc<TopicRegistry>,
    coordinator: Arc<GroupCoordinator>,
}

impl Broker {
    pub fn new(config: EngineConfig) -> Self {
        let registry = Arc::new(TopicRegistry::new());
        let coordinator = Arc::new(GroupCoordinator::new(registry.clone()));
        Self {
            config,
            registry,
            coordinator,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TopicRegistry> {
        &self.registry
    }

    pub fn coordinator(&self) -> &Arc<GroupCoordinator> {
        &self.coordinator
    }

    pub fn create_topic(&self, name: &str, partitions: u32) -> Result<Arc<Topic>, BrokerError> {
        self.registry.create_topic(name, partitions)
    }

    pub fn publisher(&self) -> Publisher {
        Publisher::new(self.registry.clone(), &self.config)
    }

    /// Join `group` as `member_id`, subscribed to `topics`.
    pub fn subscribe(
        &self,
        group: &str,
        member_id: &str,
        topics: &[String],
    ) -> Result<Consumer, BrokerError> {
        Consumer::join(
            self.registry.clone(),
            self.coordinator.clone(),
            group,
            member_id,
            topics,
        )
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
