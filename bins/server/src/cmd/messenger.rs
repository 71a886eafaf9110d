use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use relay_engine::{ConsumedRecord, Consumer, ErrorKind};

use crate::config::MessengerConfig;

/// Spawn a worker that polls `consumer`, logs every record and commits
/// what it logged. Stops between polls once `token` is cancelled, then
/// leaves the group. Also stops if the member is removed from the group
/// by someone else.
pub fn spawn_messenger(
    consumer: Consumer,
    settings: MessengerConfig,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_messenger(consumer, settings, token))
}

async fn run_messenger(consumer: Consumer, settings: MessengerConfig, token: CancellationToken) {
    let interval = Duration::from_millis(settings.poll_interval_ms);
    tracing::info!(
        group = %consumer.group(),
        member = %consumer.member_id(),
        assignment = ?consumer.assignment().unwrap_or_default(),
        "messenger started"
    );

    while !token.is_cancelled() {
        let received = match consumer.poll(settings.max_poll_records) {
            Ok(batch) => {
                for record in &batch {
                    log_record(&consumer, record);
                }
                if !batch.is_empty() {
                    if let Err(e) = consumer.commit_consumed(&batch) {
                        tracing::warn!(member = %consumer.member_id(), error = %e, "commit failed");
                    }
                }
                batch.len()
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::error!(
                    group = %consumer.group(),
                    member = %consumer.member_id(),
                    error = %e,
                    "member no longer in group, stopping"
                );
                tracing::info!(group = %consumer.group(), member = %consumer.member_id(), "messenger stopped");
                return;
            }
            Err(e) => {
                tracing::warn!(member = %consumer.member_id(), error = %e, "poll failed");
                0
            }
        };

        if received == 0 {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        } else {
            tokio::task::yield_now().await;
        }
    }

    let group = consumer.group().to_string();
    let member = consumer.member_id().to_string();
    if let Err(e) = consumer.leave() {
        tracing::warn!(group = %group, member = %member, error = %e, "leave failed");
    }
    tracing::info!(group = %group, member = %member, "messenger stopped");
}

fn log_record(consumer: &Consumer, r: &ConsumedRecord) {
    tracing::info!(
        member = %consumer.member_id(),
        "Received from topic {} partition {} offset {}: {}",
        r.topic,
        r.partition,
        r.record.offset,
        r.record.value
    );
}
