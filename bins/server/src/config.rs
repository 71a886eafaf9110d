use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use relay_engine::EngineConfig;

use crate::error::ServerError;

#[derive(Parser)]
#[command(
    name = "greetings-server",
    about = "Greeting publisher and messenger over an in-process relay"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP endpoint and the messenger workers
    Serve(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Path to TOML config file (built-in defaults when omitted)
    #[arg(long, env = "GREETINGS_CONFIG")]
    pub config: Option<String>,

    /// Override `api_port` from the config file
    #[arg(long, env = "GREETINGS_PORT")]
    pub port: Option<u16>,
}

// ---- TOML Config ----

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Topic greetings are published to and consumed from.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Partition count of `topic`, created at startup.
    #[serde(default = "default_partitions")]
    pub partitions: u32,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub messenger: MessengerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessengerConfig {
    /// Number of consumer members spawned in `group_id`.
    #[serde(default = "default_consumers")]
    pub consumers: usize,
    /// Pause after an empty poll.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_records")]
    pub max_poll_records: usize,
}

fn default_api_port() -> u16 {
    8080
}
fn default_topic() -> String {
    "greetings".to_string()
}
fn default_partitions() -> u32 {
    1
}
fn default_group_id() -> String {
    "messenger-group".to_string()
}
fn default_consumers() -> usize {
    1
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_max_poll_records() -> usize {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            topic: default_topic(),
            partitions: default_partitions(),
            group_id: default_group_id(),
            engine: EngineConfig::default(),
            messenger: MessengerConfig::default(),
        }
    }
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            consumers: default_consumers(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_records: default_max_poll_records(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path).map_err(|e| ServerError::Config {
            context: "read",
            detail: format!("'{path}': {e}"),
        })?;
        Self::parse(&content).map_err(|e| match e {
            ServerError::Config { context, detail } => ServerError::Config {
                context,
                detail: format!("'{path}': {detail}"),
            },
            other => other,
        })
    }

    pub fn parse(toml_str: &str) -> Result<Self, ServerError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ServerError::Config {
            context: "parse",
            detail: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.topic.is_empty() {
            return Err(ServerError::Config {
                context: "validate",
                detail: "topic must not be empty".into(),
            });
        }
        if self.group_id.is_empty() {
            return Err(ServerError::Config {
                context: "validate",
                detail: "group_id must not be empty".into(),
            });
        }
        if self.partitions == 0 {
            return Err(ServerError::Config {
                context: "validate",
                detail: "partitions must be at least 1".into(),
            });
        }
        if self.engine.default_partitions == 0 {
            return Err(ServerError::Config {
                context: "validate",
                detail: "engine.default_partitions must be at least 1".into(),
            });
        }
        if self.messenger.max_poll_records == 0 {
            return Err(ServerError::Config {
                context: "validate",
                detail: "messenger.max_poll_records must be at least 1".into(),
            });
        }
        Ok(())
    }
}
