use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use relay_engine::{BrokerError, ErrorKind};

use super::AppState;

const DEFAULT_READ_LIMIT: usize = 100;
const MAX_READ_LIMIT: usize = 1000;

/// Broker error rendered as a client error response.
pub(crate) struct ApiError(BrokerError);

impl From<BrokerError> for ApiError {
    fn from(e: BrokerError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        };
        (status, format!("error: {}", self.0)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════
//  GET /hello/{name}
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_hello(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    let message = format!("Hello {name}");
    match state.publisher.publish(&state.topic, None, message.clone()) {
        Ok(delivery) => {
            tracing::info!(
                topic = %delivery.topic,
                partition = delivery.partition,
                offset = delivery.offset,
                "published greeting"
            );
            (StatusCode::OK, message).into_response()
        }
        Err(e) => {
            tracing::error!(topic = %state.topic, error = %e, "failed to publish greeting");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to publish greeting",
            )
                .into_response()
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  GET /api/topics
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_list_topics(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.broker.registry().topics())
}

// ═══════════════════════════════════════════════════════════════
//  GET /api/topics/{name}/partitions/{partition}?from=&limit=
// ═══════════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub(crate) struct ReadParams {
    from: Option<u64>,
    limit: Option<usize>,
}

pub(crate) async fn handle_read_partition(
    State(state): State<AppState>,
    Path((name, partition)): Path<(String, u32)>,
    Query(params): Query<ReadParams>,
) -> Result<Response, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_READ_LIMIT).min(MAX_READ_LIMIT);
    let records = state
        .broker
        .registry()
        .read(&name, partition, params.from.unwrap_or(0), limit)?;
    Ok(axum::Json(records).into_response())
}

// ═══════════════════════════════════════════════════════════════
//  GET /api/groups/{group}
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_describe_group(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> Result<Response, ApiError> {
    let snapshot = state.broker.coordinator().describe(&group)?;
    Ok(axum::Json(snapshot).into_response())
}
