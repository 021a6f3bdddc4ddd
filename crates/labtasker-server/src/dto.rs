//! Wire DTOs. Kept separate from `labtasker_core::types` so a change to the
//! wire format never forces a change to the engine's domain types, and vice
//! versa.

use chrono::{DateTime, Utc};
use labtasker_core::matcher::Filter;
use labtasker_core::store::Cursor;
use labtasker_core::{Outcome, Queue, Task, TaskStatus, Worker, WorkerStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreateQueueRequest {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default = "default_heartbeat_timeout")]
    pub default_heartbeat_timeout_secs: i64,
}

fn default_heartbeat_timeout() -> i64 {
    60
}

#[derive(Serialize)]
pub struct QueueResponse {
    pub id: Uuid,
    pub name: String,
    pub metadata: serde_json::Value,
    pub default_heartbeat_timeout_secs: i64,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl From<Queue> for QueueResponse {
    fn from(q: Queue) -> Self {
        Self {
            id: q.id,
            name: q.name,
            metadata: q.metadata.into(),
            default_heartbeat_timeout_secs: q.default_heartbeat_timeout_secs,
            created_at: q.created_at,
            last_modified: q.last_modified,
        }
    }
}

#[derive(Deserialize)]
pub struct SubmitTaskRequest {
    pub task_name: Option<String>,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub cmd: Option<String>,
    pub heartbeat_timeout_secs: Option<i64>,
    pub task_timeout_secs: Option<i64>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub priority: i64,
}

fn default_max_retries() -> u32 {
    3
}

#[derive(Serialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub queue_id: Uuid,
    pub task_name: Option<String>,
    pub args: serde_json::Value,
    pub metadata: serde_json::Value,
    pub cmd: Option<String>,
    pub heartbeat_timeout_secs: i64,
    pub task_timeout_secs: Option<i64>,
    pub max_retries: u32,
    pub priority: i64,
    pub status: TaskStatus,
    pub retries: u32,
    pub worker_id: Option<Uuid>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub summary: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl From<Task> for TaskResponse {
    fn from(t: Task) -> Self {
        Self {
            id: t.id,
            queue_id: t.queue_id,
            task_name: t.task_name,
            args: t.args.into(),
            metadata: t.metadata.into(),
            cmd: t.cmd,
            heartbeat_timeout_secs: t.heartbeat_timeout_secs,
            task_timeout_secs: t.task_timeout_secs,
            max_retries: t.max_retries,
            priority: t.priority,
            status: t.status,
            retries: t.retries,
            worker_id: t.worker_id,
            last_heartbeat: t.last_heartbeat,
            start_time: t.start_time,
            summary: t.summary.into(),
            created_at: t.created_at,
            last_modified: t.last_modified,
        }
    }
}

#[derive(Deserialize)]
pub struct FetchTaskRequest {
    pub worker_id: Uuid,
    #[serde(default)]
    pub required_fields: Vec<String>,
    pub extra_filter: Option<Filter>,
    pub heartbeat_timeout_override_secs: Option<i64>,
}

#[derive(Deserialize)]
pub struct HeartbeatRequest {
    pub worker_id: Uuid,
}

#[derive(Deserialize)]
pub struct ReportTaskRequest {
    pub worker_id: Uuid,
    pub outcome: Outcome,
    #[serde(default)]
    pub summary: serde_json::Value,
}

/// Wire-level partial update. Unlike the engine's `TaskUpdateRequest`, this
/// cannot explicitly clear an optional field to null — only set a new value
/// (see DESIGN.md).
#[derive(Deserialize, Default)]
pub struct UpdateTaskRequest {
    pub args: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    pub priority: Option<i64>,
    pub max_retries: Option<u32>,
    pub heartbeat_timeout_secs: Option<i64>,
    pub task_timeout_secs: Option<i64>,
    pub cmd: Option<String>,
    pub task_name: Option<String>,
}

#[derive(Deserialize)]
pub struct BulkUpdateTasksRequest {
    pub filter: Filter,
    pub update: std::collections::BTreeMap<String, serde_json::Value>,
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,
}

fn default_scan_limit() -> usize {
    256
}

#[derive(Serialize)]
pub struct BatchUpdateResponse {
    pub applied: Vec<Uuid>,
    pub not_found: Vec<Uuid>,
    pub conflict: Vec<Uuid>,
    pub invalid: Vec<(Uuid, String)>,
}

#[derive(Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<TaskStatus>,
    pub filter: Option<String>,
    pub cursor_created_at: Option<DateTime<Utc>>,
    pub cursor_id: Option<Uuid>,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

fn default_list_limit() -> usize {
    100
}

impl ListTasksQuery {
    pub fn cursor(&self) -> Option<Cursor> {
        match (self.cursor_created_at, self.cursor_id) {
            (Some(created_at), Some(id)) => Some(Cursor { created_at, id }),
            _ => None,
        }
    }

    pub fn parsed_filter(&self) -> Result<Option<Filter>, serde_json::Error> {
        self.filter.as_deref().map(serde_json::from_str).transpose()
    }
}

#[derive(Deserialize)]
pub struct ListWorkersQuery {
    pub cursor_created_at: Option<DateTime<Utc>>,
    pub cursor_id: Option<Uuid>,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

impl ListWorkersQuery {
    pub fn cursor(&self) -> Option<Cursor> {
        match (self.cursor_created_at, self.cursor_id) {
            (Some(created_at), Some(id)) => Some(Cursor { created_at, id }),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
pub struct RegisterWorkerRequest {
    pub worker_name: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Serialize)]
pub struct WorkerResponse {
    pub id: Uuid,
    pub queue_id: Uuid,
    pub worker_name: Option<String>,
    pub metadata: serde_json::Value,
    pub max_retries: u32,
    pub status: WorkerStatus,
    pub retries: u32,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl From<Worker> for WorkerResponse {
    fn from(w: Worker) -> Self {
        Self {
            id: w.id,
            queue_id: w.queue_id,
            worker_name: w.worker_name,
            metadata: w.metadata.into(),
            max_retries: w.max_retries,
            status: w.status,
            retries: w.retries,
            created_at: w.created_at,
            last_modified: w.last_modified,
        }
    }
}

#[derive(Deserialize, Default)]
pub struct UpdateWorkerRequest {
    pub metadata: Option<serde_json::Value>,
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub resume: bool,
}

#[derive(Deserialize, Default)]
pub struct SubscribeEventsRequest {
    pub entity: Option<labtasker_core::EntityKind>,
}

#[derive(Serialize)]
pub struct SubscribeEventsResponse {
    pub handle: Uuid,
}

#[derive(Deserialize)]
pub struct NextEventQuery {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}
