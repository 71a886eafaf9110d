pub mod broker;
pub mod config;
pub mod consumer;
pub mod coordinator;
pub mod error;
pub mod partition;
pub mod publisher;
pub mod record;
pub mod topic;

pub use broker::Broker;
pub use config::EngineConfig;
pub use consumer::Consumer;
pub use coordinator::{GroupCoordinator, GroupSnapshot};
pub use error::{BrokerError, ErrorKind};
pub use publisher::Publisher;
pub use record::{ConsumedRecord, Delivery, Record, TopicPartition};
pub use topic::{Topic, TopicInfo, TopicRegistry};
