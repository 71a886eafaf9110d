/// Coarse error classification, used by the HTTP boundary to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("topic '{topic}': partition count must be at least 1, got {partitions}")]
    InvalidPartitionCount { topic: String, partitions: u32 },

    #[error("topic '{topic}' has {partitions} partition(s), partition {partition} does not exist")]
    PartitionOutOfRange {
        topic: String,
        partition: u32,
        partitions: u32,
    },

    #[error(
        "group '{group}': offset {offset} for {topic}/{partition} is behind committed offset {committed}"
    )]
    OffsetRegression {
        group: String,
        topic: String,
        partition: u32,
        offset: u64,
        committed: u64,
    },

    #[error(
        "group '{group}': offset {offset} for {topic}/{partition} is beyond log end offset {end}"
    )]
    OffsetBeyondLogEnd {
        group: String,
        topic: String,
        partition: u32,
        offset: u64,
        end: u64,
    },

    #[error("topic '{0}' not found")]
    TopicNotFound(String),

    #[error("consumer group '{0}' not found")]
    GroupNotFound(String),

    #[error("member '{member}' is not part of consumer group '{group}'")]
    MemberNotFound { group: String, member: String },
}

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::InvalidPartitionCount { .. }
            | BrokerError::PartitionOutOfRange { .. }
            | BrokerError::OffsetRegression { .. }
            | BrokerError::OffsetBeyondLogEnd { .. } => ErrorKind::InvalidArgument,
            BrokerError::TopicNotFound(_)
            | BrokerError::GroupNotFound(_)
            | BrokerError::MemberNotFound { .. } => ErrorKind::NotFound,
        }
    }
}
