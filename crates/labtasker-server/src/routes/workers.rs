use super::queues::authenticate;
use crate::dto::{
    ListWorkersQuery, RegisterWorkerRequest, UpdateWorkerRequest, WorkerResponse,
};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use labtasker_core::{
    EngineError, RegisterWorkerRequest as EngineRegisterWorkerRequest, WorkerUpdateRequest,
};
use uuid::Uuid;

async fn worker_in_queue(
    state: &AppState,
    queue_id: Uuid,
    worker_id: Uuid,
) -> Result<labtasker_core::Worker, ApiError> {
    let worker = state.engine.get_worker(worker_id).await?;
    if worker.queue_id != queue_id {
        return Err(ApiError(EngineError::NotFound(format!(
            "worker {worker_id}"
        ))));
    }
    Ok(worker)
}

pub async fn register_worker(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    headers: HeaderMap,
    Json(req): Json<RegisterWorkerRequest>,
) -> Result<Json<WorkerResponse>, ApiError> {
    let queue = authenticate(&state, &queue_name, &headers).await?;
    let worker = state
        .engine
        .register_worker(EngineRegisterWorkerRequest {
            queue_id: queue.id,
            worker_name: req.worker_name,
            metadata: req.metadata.into(),
            max_retries: req.max_retries,
        })
        .await?;
    Ok(Json(worker.into()))
}

pub async fn update_worker(
    State(state): State<AppState>,
    Path((queue_name, worker_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    Json(req): Json<UpdateWorkerRequest>,
) -> Result<Json<WorkerResponse>, ApiError> {
    let queue = authenticate(&state, &queue_name, &headers).await?;
    worker_in_queue(&state, queue.id, worker_id).await?;
    let worker = state
        .engine
        .update_worker(
            worker_id,
            WorkerUpdateRequest {
                metadata: req.metadata.map(Into::into),
                max_retries: req.max_retries,
                resume: req.resume,
            },
        )
        .await?;
    Ok(Json(worker.into()))
}

pub async fn delete_worker(
    State(state): State<AppState>,
    Path((queue_name, worker_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
) -> Result<(), ApiError> {
    let queue = authenticate(&state, &queue_name, &headers).await?;
    worker_in_queue(&state, queue.id, worker_id).await?;
    state.engine.delete_worker(worker_id).await?;
    Ok(())
}

pub async fn list_workers(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    headers: HeaderMap,
    Query(query): Query<ListWorkersQuery>,
) -> Result<Json<Vec<WorkerResponse>>, ApiError> {
    let queue = authenticate(&state, &queue_name, &headers).await?;
    let workers = state
        .engine
        .list_workers(queue.id, query.cursor(), query.limit)
        .await?;
    Ok(Json(workers.into_iter().map(Into::into).collect()))
}
