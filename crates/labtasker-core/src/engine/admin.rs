//! Admin operations: queue/task/worker CRUD, listing, and bulk update.
//! Single-document CAS operations live alongside the paginated batch
//! helpers that scan and apply an update across many documents at once.

use super::Engine;
use crate::error::{EngineError, ItemOutcome, BatchResult, StoreError};
use crate::matcher::{apply_update, Filter, UpdateDoc};
use crate::store::Cursor;
use crate::types::{EntityKind, Event, Queue, Task, TaskStatus, Worker, WorkerStatus};
use crate::value::Value;
use uuid::Uuid;

pub struct SubmitTaskRequest {
    pub queue_id: Uuid,
    pub task_name: Option<String>,
    pub args: Value,
    pub metadata: Value,
    pub cmd: Option<String>,
    pub heartbeat_timeout_secs: i64,
    pub task_timeout_secs: Option<i64>,
    pub max_retries: u32,
    pub priority: i64,
}

pub struct RegisterWorkerRequest {
    pub queue_id: Uuid,
    pub worker_name: Option<String>,
    pub metadata: Value,
    pub max_retries: u32,
}

/// A CAS-guarded partial update. Every field is `Option`: `None` leaves the
/// stored value untouched, `Some` overwrites it. `args`/`metadata` overwrite
/// the whole document at the top level; fine-grained dotted-path merges go
/// through `bulk_update_tasks`'s `UpdateDoc` instead.
#[derive(Debug, Default, Clone)]
pub struct TaskUpdateRequest {
    pub args: Option<Value>,
    pub metadata: Option<Value>,
    pub priority: Option<i64>,
    pub max_retries: Option<u32>,
    pub heartbeat_timeout_secs: Option<i64>,
    pub task_timeout_secs: Option<Option<i64>>,
    pub cmd: Option<Option<String>>,
    pub task_name: Option<Option<String>>,
}

#[derive(Debug, Default, Clone)]
pub struct WorkerUpdateRequest {
    pub metadata: Option<Value>,
    pub max_retries: Option<u32>,
    /// Admin-initiated resume: `SUSPENDED` -> `ACTIVE` with `retries` reset
    /// to zero. Any other requested status transition is rejected.
    pub resume: bool,
}

impl Engine {
    // --- Queues ---

    pub async fn create_queue(
        &self,
        name: String,
        password_hash: String,
        metadata: Value,
        default_heartbeat_timeout_secs: i64,
    ) -> Result<Queue, EngineError> {
        if name.trim().is_empty() {
            return Err(EngineError::InvalidArgument("queue name must not be empty".into()));
        }
        let now = self.clock.now();
        let queue = Queue {
            id: Uuid::now_v7(),
            name,
            password_hash,
            metadata,
            default_heartbeat_timeout_secs,
            created_at: now,
            last_modified: now,
            etag: 0,
        };
        Ok(self.store.create_queue(queue).await?)
    }

    pub async fn get_queue(&self, id: Uuid) -> Result<Queue, EngineError> {
        Ok(self.store.get_queue(id).await?)
    }

    pub async fn get_queue_by_name(&self, name: &str) -> Result<Queue, EngineError> {
        Ok(self.store.get_queue_by_name(name).await?)
    }

    pub async fn delete_queue(&self, id: Uuid) -> Result<(), EngineError> {
        Ok(self.store.delete_queue_cascade(id).await?)
    }

    // --- Tasks ---

    pub async fn submit_task(&self, req: SubmitTaskRequest) -> Result<Task, EngineError> {
        let now = self.clock.now();
        let task = Task {
            id: Uuid::now_v7(),
            queue_id: req.queue_id,
            task_name: req.task_name,
            args: req.args,
            metadata: req.metadata,
            cmd: req.cmd,
            heartbeat_timeout_secs: req.heartbeat_timeout_secs,
            task_timeout_secs: req.task_timeout_secs,
            max_retries: req.max_retries,
            priority: req.priority,
            status: TaskStatus::Pending,
            retries: 0,
            worker_id: None,
            last_heartbeat: None,
            start_time: None,
            summary: Value::Null,
            created_at: now,
            last_modified: now,
            etag: 0,
        };
        let inserted = self.store.insert_task(task).await?;

        let event_id = self.bus.alloc_event_id();
        self.bus
            .publish(Event::Transition {
                id: event_id,
                timestamp: inserted.last_modified,
                queue_id: inserted.queue_id,
                entity: EntityKind::Task,
                entity_id: inserted.id,
                old_status: None,
                new_status: "PENDING".to_string(),
                metadata: Value::Null,
            })
            .await;

        Ok(inserted)
    }

    pub async fn get_task(&self, id: Uuid) -> Result<Task, EngineError> {
        Ok(self.store.get_task(id).await?)
    }

    /// Admin-initiated cancel. Allowed from `PENDING` or `RUNNING`; a no-op
    /// (not an error) on an already-terminal task, matching `report`'s
    /// worker-driven `cancelled` outcome but without touching any worker's
    /// consecutive-failure counter.
    pub async fn cancel_task(&self, task_id: Uuid) -> Result<Task, EngineError> {
        for _ in 0..self.config.max_cas_retries {
            let task = self.store.get_task(task_id).await?;
            if task.is_terminal() {
                return Ok(task);
            }

            let now = self.clock.now();
            let mut updated = task.clone();
            updated.status = TaskStatus::Cancelled;
            updated.worker_id = None;
            updated.start_time = None;
            updated.last_heartbeat = None;
            updated.last_modified = now;

            match self.store.update_task_if_match(updated).await {
                Ok(new_task) => {
                    self.publish_task_transition(&task, &new_task).await;
                    return Ok(new_task);
                }
                Err(StoreError::CasConflict) => continue,
                Err(other) => return Err(other.into()),
            }
        }
        Err(EngineError::Conflict)
    }

    pub async fn update_task(
        &self,
        task_id: Uuid,
        req: TaskUpdateRequest,
    ) -> Result<Task, EngineError> {
        for _ in 0..self.config.max_cas_retries {
            let task = self.store.get_task(task_id).await?;
            let mut updated = task.clone();
            apply_task_update(&mut updated, &req)?;
            updated.last_modified = self.clock.now();

            match self.store.update_task_if_match(updated).await {
                Ok(new_task) => return Ok(new_task),
                Err(StoreError::CasConflict) => continue,
                Err(other) => return Err(other.into()),
            }
        }
        Err(EngineError::Conflict)
    }

    pub async fn list_tasks(
        &self,
        queue_id: Uuid,
        status: Option<TaskStatus>,
        filter: Option<&Filter>,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<Vec<Task>, EngineError> {
        filtered_page(
            cursor,
            limit,
            move |cur, page_limit| self.store.list_tasks(queue_id, status, cur, page_limit),
            |t: &Task| filter.map_or(true, |f| f.matches(&t.filter_doc())),
            |t| Cursor { created_at: t.created_at, id: t.id },
        )
        .await
    }

    /// Apply `update` to every `PENDING`/`RUNNING` task in `queue_id`
    /// matching `filter`. Each document is CAS'd individually; one
    /// conflicting or invalid document never aborts the rest of the batch.
    pub async fn bulk_update_tasks(
        &self,
        queue_id: Uuid,
        filter: &Filter,
        update: &UpdateDoc,
        scan_limit: usize,
    ) -> Result<BatchResult<Task>, EngineError> {
        let mut result = BatchResult::new();
        let mut cursor = None;
        loop {
            let page = self.store.list_tasks(queue_id, None, cursor, scan_limit).await?;
            if page.is_empty() {
                break;
            }
            cursor = page.last().map(|t| Cursor { created_at: t.created_at, id: t.id });

            for task in page {
                if task.is_terminal() || !filter.matches(&task.filter_doc()) {
                    continue;
                }
                match self.apply_bulk_update_one(task.id, update).await {
                    Ok(Some(t)) => result.push(t.id, ItemOutcome::Applied(t)),
                    Ok(None) => result.push(task.id, ItemOutcome::Conflict),
                    Err(EngineError::InvalidArgument(msg)) => {
                        result.push(task.id, ItemOutcome::Invalid(msg))
                    }
                    Err(EngineError::NotFound(_)) => result.push(task.id, ItemOutcome::NotFound),
                    Err(e) => return Err(e),
                }
            }

            if cursor.is_none() {
                break;
            }
        }
        Ok(result)
    }

    async fn apply_bulk_update_one(
        &self,
        task_id: Uuid,
        update: &UpdateDoc,
    ) -> Result<Option<Task>, EngineError> {
        for _ in 0..self.config.max_cas_retries {
            let task = match self.store.get_task(task_id).await {
                Ok(t) => t,
                Err(StoreError::NotFound) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            if task.is_terminal() {
                return Ok(None);
            }
            let mut updated = task.clone();
            let applied = apply_update(&task.filter_doc(), update)
                .map_err(|e| EngineError::InvalidArgument(e.to_string()))?;
            if let Value::Object(mut doc) = applied {
                updated.args = doc.remove("args").unwrap_or_default();
                updated.metadata = doc.remove("metadata").unwrap_or_default();
            }
            updated.last_modified = self.clock.now();

            match self.store.update_task_if_match(updated).await {
                Ok(t) => return Ok(Some(t)),
                Err(StoreError::CasConflict) => continue,
                Err(other) => return Err(other.into()),
            }
        }
        Err(EngineError::Conflict)
    }

    // --- Workers ---

    pub async fn register_worker(&self, req: RegisterWorkerRequest) -> Result<Worker, EngineError> {
        if req.max_retries == 0 {
            return Err(EngineError::InvalidArgument("max_retries must be >= 1".into()));
        }
        let now = self.clock.now();
        let worker = Worker {
            id: Uuid::now_v7(),
            queue_id: req.queue_id,
            worker_name: req.worker_name,
            metadata: req.metadata,
            max_retries: req.max_retries,
            status: WorkerStatus::Active,
            retries: 0,
            created_at: now,
            last_modified: now,
            etag: 0,
        };
        Ok(self.store.insert_worker(worker).await?)
    }

    pub async fn get_worker(&self, id: Uuid) -> Result<Worker, EngineError> {
        Ok(self.store.get_worker(id).await?)
    }

    pub async fn delete_worker(&self, id: Uuid) -> Result<(), EngineError> {
        Ok(self.store.delete_worker(id).await?)
    }

    pub async fn update_worker(
        &self,
        worker_id: Uuid,
        req: WorkerUpdateRequest,
    ) -> Result<Worker, EngineError> {
        for _ in 0..self.config.max_cas_retries {
            let worker = self.store.get_worker(worker_id).await?;
            let mut updated = worker.clone();
            if let Some(metadata) = req.metadata.clone() {
                updated.metadata = metadata;
            }
            if let Some(max_retries) = req.max_retries {
                if max_retries == 0 {
                    return Err(EngineError::InvalidArgument("max_retries must be >= 1".into()));
                }
                updated.max_retries = max_retries;
            }
            if req.resume {
                if updated.status != WorkerStatus::Suspended {
                    return Err(EngineError::InvalidArgument(
                        "resume is only valid on a SUSPENDED worker".into(),
                    ));
                }
                updated.status = WorkerStatus::Active;
                updated.retries = 0;
            }
            updated.last_modified = self.clock.now();

            match self.store.update_worker_if_match(updated).await {
                Ok(new_worker) => {
                    if new_worker.status != worker.status {
                        let event_id = self.bus.alloc_event_id();
                        self.bus
                            .publish(Event::Transition {
                                id: event_id,
                                timestamp: new_worker.last_modified,
                                queue_id: new_worker.queue_id,
                                entity: EntityKind::Worker,
                                entity_id: new_worker.id,
                                old_status: Some(format!("{:?}", worker.status).to_uppercase()),
                                new_status: format!("{:?}", new_worker.status).to_uppercase(),
                                metadata: Value::Null,
                            })
                            .await;
                    }
                    return Ok(new_worker);
                }
                Err(StoreError::CasConflict) => continue,
                Err(other) => return Err(other.into()),
            }
        }
        Err(EngineError::Conflict)
    }

    pub async fn list_workers(
        &self,
        queue_id: Uuid,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<Vec<Worker>, EngineError> {
        filtered_page(
            cursor,
            limit,
            move |cur, page_limit| self.store.list_workers(queue_id, cur, page_limit),
            |_| true,
            |w| Cursor { created_at: w.created_at, id: w.id },
        )
        .await
    }
}

fn apply_task_update(task: &mut Task, req: &TaskUpdateRequest) -> Result<(), EngineError> {
    let pending_or_running = matches!(task.status, TaskStatus::Pending | TaskStatus::Running);
    let full_edit = task.status == TaskStatus::Pending;

    // metadata is always mutable, even on terminal tasks.
    if let Some(metadata) = req.metadata.clone() {
        task.metadata = metadata;
    }

    let restricted_requested = req.args.is_some()
        || req.heartbeat_timeout_secs.is_some()
        || req.task_timeout_secs.is_some()
        || req.cmd.is_some()
        || req.task_name.is_some();
    let retry_scoped_requested = req.priority.is_some() || req.max_retries.is_some();

    if (restricted_requested || retry_scoped_requested) && !pending_or_running {
        return Err(EngineError::InvalidArgument(
            "only metadata may be updated on a terminal task".into(),
        ));
    }
    if restricted_requested && !full_edit {
        return Err(EngineError::InvalidArgument(
            "args/cmd/task_name/timeouts may only be updated while PENDING".into(),
        ));
    }

    if let Some(priority) = req.priority {
        task.priority = priority;
    }
    if let Some(max_retries) = req.max_retries {
        task.max_retries = max_retries;
    }
    if let Some(args) = req.args.clone() {
        task.args = args;
    }
    if let Some(heartbeat_timeout_secs) = req.heartbeat_timeout_secs {
        task.heartbeat_timeout_secs = heartbeat_timeout_secs;
    }
    if let Some(task_timeout_secs) = req.task_timeout_secs {
        task.task_timeout_secs = task_timeout_secs;
    }
    if let Some(cmd) = req.cmd.clone() {
        task.cmd = cmd;
    }
    if let Some(task_name) = req.task_name.clone() {
        task.task_name = task_name;
    }
    Ok(())
}

/// Drains paginated store pages through an in-engine predicate until `limit`
/// matching items are collected or the store runs out of pages — the
/// filter-in-engine half of the design note in `store.rs`: the store only
/// knows `(status, cursor)`, everything else is applied here.
async fn filtered_page<T, Fut>(
    mut cursor: Option<Cursor>,
    limit: usize,
    fetch: impl Fn(Option<Cursor>, usize) -> Fut,
    predicate: impl Fn(&T) -> bool,
    cursor_of: impl Fn(&T) -> Cursor,
) -> Result<Vec<T>, EngineError>
where
    Fut: std::future::Future<Output = Result<Vec<T>, StoreError>>,
{
    const PAGE_SIZE: usize = 256;
    let mut out = Vec::new();
    loop {
        let page = fetch(cursor, PAGE_SIZE).await?;
        if page.is_empty() {
            break;
        }
        cursor = page.last().map(&cursor_of);
        for item in page {
            if predicate(&item) {
                out.push(item);
                if out.len() >= limit {
                    return Ok(out);
                }
            }
        }
    }
    Ok(out)
}
