use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use relay_api_server::AppState;
use relay_engine::Broker;

use crate::cmd::messenger::spawn_messenger;
use crate::config::{ServeArgs, ServerConfig};
use crate::error::ServerError;

/// How long tasks get to stop on their own before being aborted.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("greetings-server starting");

    // --- Load config ---
    let mut config = match &args.config {
        Some(path) => {
            let config = ServerConfig::load(path)?;
            tracing::info!(config = %path, "loaded config");
            config
        }
        None => {
            tracing::info!("no config file given, using defaults");
            ServerConfig::default()
        }
    };
    if let Some(port) = args.port {
        config.api_port = port;
    }
    config.validate()?;

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    // --- Broker + greetings topic ---
    let broker = Arc::new(Broker::new(config.engine.clone()));
    broker.create_topic(&config.topic, config.partitions)?;

    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    // --- Spawn messengers ---
    let topics = vec![config.topic.clone()];
    for i in 0..config.messenger.consumers {
        let member = format!("messenger-{i}");
        let consumer = broker.subscribe(&config.group_id, &member, &topics)?;
        handles.push(spawn_messenger(
            consumer,
            config.messenger.clone(),
            token.clone(),
        ));
        tracing::info!(group = %config.group_id, member = %member, topic = %config.topic, "spawned messenger");
    }

    // --- API server ---
    let state = AppState::new(broker.clone(), config.topic.clone());
    let api_port = config.api_port;
    let api_token = token.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = relay_api_server::run(api_port, state, api_token).await {
            tracing::error!(error = %e, "api server error");
        }
    }));

    tracing::info!(port = config.api_port, "api server listening");
    tracing::info!("server ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down...");

    // Signal all tasks to stop cooperatively
    token.cancel();

    let failed = drain(handles, DRAIN_TIMEOUT).await;
    if failed > 0 {
        tracing::warn!(failed, "some tasks did not stop cleanly");
    }

    for topic in broker.registry().topics() {
        tracing::info!(topic = %topic.name, end_offsets = ?topic.end_offsets, "final topic state");
    }
    if let Ok(group) = broker.coordinator().describe(&config.group_id) {
        tracing::info!(group = %group.group, committed = ?group.committed, "final group state");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

/// Wait for every task until `timeout`, aborting the ones still running.
/// Returns how many tasks failed or had to be aborted.
async fn drain(handles: Vec<JoinHandle<()>>, timeout: Duration) -> usize {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut failed = 0;
    for mut h in handles {
        match tokio::time::timeout_at(deadline, &mut h).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, "task failed");
                failed += 1;
            }
            Err(_) => {
                tracing::warn!("task did not stop in time, aborting");
                h.abort();
                failed += 1;
            }
        }
    }
    failed
}
