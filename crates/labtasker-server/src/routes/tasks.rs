use super::queues::authenticate;
use crate::dto::{
    BatchUpdateResponse, BulkUpdateTasksRequest, FetchTaskRequest, HeartbeatRequest,
    ListTasksQuery, ReportTaskRequest, SubmitTaskRequest, TaskResponse, UpdateTaskRequest,
};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use labtasker_core::{
    EngineError, FetchRequest, ItemOutcome, SubmitTaskRequest as EngineSubmitTaskRequest, Task,
    TaskUpdateRequest,
};
use uuid::Uuid;

async fn task_in_queue(
    state: &AppState,
    queue_id: Uuid,
    task_id: Uuid,
) -> Result<Task, ApiError> {
    let task = state.engine.get_task(task_id).await?;
    if task.queue_id != queue_id {
        return Err(ApiError(EngineError::NotFound(format!("task {task_id}"))));
    }
    Ok(task)
}

pub async fn submit_task(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SubmitTaskRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let queue = authenticate(&state, &queue_name, &headers).await?;
    let task = state
        .engine
        .submit_task(EngineSubmitTaskRequest {
            queue_id: queue.id,
            task_name: req.task_name,
            args: req.args.into(),
            metadata: req.metadata.into(),
            cmd: req.cmd,
            heartbeat_timeout_secs: req
                .heartbeat_timeout_secs
                .unwrap_or(queue.default_heartbeat_timeout_secs),
            task_timeout_secs: req.task_timeout_secs,
            max_retries: req.max_retries,
            priority: req.priority,
        })
        .await?;
    Ok(Json(task.into()))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path((queue_name, task_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
) -> Result<Json<TaskResponse>, ApiError> {
    let queue = authenticate(&state, &queue_name, &headers).await?;
    let task = task_in_queue(&state, queue.id, task_id).await?;
    Ok(Json(task.into()))
}

pub async fn fetch_task(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    headers: HeaderMap,
    Json(req): Json<FetchTaskRequest>,
) -> Result<Json<Option<TaskResponse>>, ApiError> {
    let queue = authenticate(&state, &queue_name, &headers).await?;
    let task = state
        .engine
        .fetch_next(FetchRequest {
            queue_id: queue.id,
            worker_id: req.worker_id,
            required_fields: req.required_fields,
            extra_filter: req.extra_filter,
            heartbeat_timeout_override_secs: req.heartbeat_timeout_override_secs,
        })
        .await?;
    Ok(Json(task.map(Into::into)))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Path((queue_name, task_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let queue = authenticate(&state, &queue_name, &headers).await?;
    task_in_queue(&state, queue.id, task_id).await?;
    let task = state.engine.heartbeat(task_id, req.worker_id).await?;
    Ok(Json(task.into()))
}

pub async fn report_task(
    State(state): State<AppState>,
    Path((queue_name, task_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    Json(req): Json<ReportTaskRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let queue = authenticate(&state, &queue_name, &headers).await?;
    task_in_queue(&state, queue.id, task_id).await?;
    let task = state
        .engine
        .report(task_id, req.worker_id, req.outcome, req.summary.into())
        .await?;
    Ok(Json(task.into()))
}

pub async fn update_task(
    State(state): State<AppState>,
    Path((queue_name, task_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let queue = authenticate(&state, &queue_name, &headers).await?;
    task_in_queue(&state, queue.id, task_id).await?;
    let task = state
        .engine
        .update_task(
            task_id,
            TaskUpdateRequest {
                args: req.args.map(Into::into),
                metadata: req.metadata.map(Into::into),
                priority: req.priority,
                max_retries: req.max_retries,
                heartbeat_timeout_secs: req.heartbeat_timeout_secs,
                task_timeout_secs: req.task_timeout_secs.map(Some),
                cmd: req.cmd.map(Some),
                task_name: req.task_name.map(Some),
            },
        )
        .await?;
    Ok(Json(task.into()))
}

pub async fn cancel_task(
    State(state): State<AppState>,
    Path((queue_name, task_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
) -> Result<Json<TaskResponse>, ApiError> {
    let queue = authenticate(&state, &queue_name, &headers).await?;
    task_in_queue(&state, queue.id, task_id).await?;
    let task = state.engine.cancel_task(task_id).await?;
    Ok(Json(task.into()))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    headers: HeaderMap,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let queue = authenticate(&state, &queue_name, &headers).await?;
    let filter = query
        .parsed_filter()
        .map_err(|e| ApiError(EngineError::InvalidArgument(e.to_string())))?;
    let tasks = state
        .engine
        .list_tasks(queue.id, query.status, filter.as_ref(), query.cursor(), query.limit)
        .await?;
    Ok(Json(tasks.into_iter().map(Into::into).collect()))
}

pub async fn bulk_update_tasks(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    headers: HeaderMap,
    Json(req): Json<BulkUpdateTasksRequest>,
) -> Result<Json<BatchUpdateResponse>, ApiError> {
    let queue = authenticate(&state, &queue_name, &headers).await?;
    let result = state
        .engine
        .bulk_update_tasks(queue.id, &req.filter, &req.update, req.scan_limit)
        .await?;

    let mut response = BatchUpdateResponse {
        applied: Vec::new(),
        not_found: Vec::new(),
        conflict: Vec::new(),
        invalid: Vec::new(),
    };
    for (id, outcome) in result.outcomes {
        match outcome {
            ItemOutcome::Applied(_) => response.applied.push(id),
            ItemOutcome::NotFound => response.not_found.push(id),
            ItemOutcome::Conflict => response.conflict.push(id),
            ItemOutcome::Invalid(msg) => response.invalid.push((id, msg)),
        }
    }
    Ok(Json(response))
}
