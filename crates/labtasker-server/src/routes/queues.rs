use crate::auth::{hash_password, verify_password};
use crate::dto::{CreateQueueRequest, QueueResponse};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use labtasker_core::{EngineError, Queue};

/// Resolves `queue_name` and checks the `Authorization: Bearer <password>`
/// header against the queue's `argon2` hash. Every queue-scoped route calls
/// this first.
pub(crate) async fn authenticate(
    state: &AppState,
    queue_name: &str,
    headers: &HeaderMap,
) -> Result<Queue, ApiError> {
    let queue = state.engine.get_queue_by_name(queue_name).await?;

    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(password) if verify_password(password, &queue.password_hash) => Ok(queue),
        _ => Err(ApiError(EngineError::Unauthorized)),
    }
}

pub async fn create_queue(
    State(state): State<AppState>,
    Json(req): Json<CreateQueueRequest>,
) -> Result<Json<QueueResponse>, ApiError> {
    let password_hash = hash_password(&req.password)
        .map_err(|e| ApiError(EngineError::InvalidArgument(e.to_string())))?;
    let queue = state
        .engine
        .create_queue(
            req.name,
            password_hash,
            req.metadata.into(),
            req.default_heartbeat_timeout_secs,
        )
        .await?;
    Ok(Json(queue.into()))
}

pub async fn get_queue(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    headers: HeaderMap,
) -> Result<Json<QueueResponse>, ApiError> {
    let queue = authenticate(&state, &queue_name, &headers).await?;
    Ok(Json(queue.into()))
}

pub async fn delete_queue(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    headers: HeaderMap,
) -> Result<(), ApiError> {
    let queue = authenticate(&state, &queue_name, &headers).await?;
    state.engine.delete_queue(queue.id).await?;
    Ok(())
}
