use serde::Deserialize;

/// Broker-level settings, the `[engine]` table of the server config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Create unknown topics on first publish instead of failing.
    #[serde(default = "default_auto_create_topics")]
    pub auto_create_topics: bool,

    /// Partition count for auto-created topics.
    #[serde(default = "default_partitions")]
    pub default_partitions: u32,
}

fn default_auto_create_topics() -> bool {
    true
}

fn default_partitions() -> u32 {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_create_topics: default_auto_create_topics(),
            default_partitions: default_partitions(),
        }
    }
}
