mod http;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;

use relay_engine::{Broker, Publisher};

use http::{handle_describe_group, handle_hello, handle_list_topics, handle_read_partition};

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    broker: Arc<Broker>,
    publisher: Publisher,
    /// Topic greetings are published to.
    topic: String,
}

impl AppState {
    pub fn new(broker: Arc<Broker>, topic: impl Into<String>) -> Self {
        let publisher = broker.publisher();
        Self {
            broker,
            publisher,
            topic: topic.into(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/hello/{name}", get(handle_hello))
        .route("/api/topics", get(handle_list_topics))
        .route(
            "/api/topics/{name}/partitions/{partition}",
            get(handle_read_partition),
        )
        .route("/api/groups/{group}", get(handle_describe_group))
        .with_state(state)
}

/// Greeting + inspection HTTP API server.
pub async fn run(port: u16, state: AppState, shutdown: CancellationToken) -> Result<(), String> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|e| format!("bind api :{port}: {e}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| format!("axum serve: {e}"))?;

    Ok(())
}
