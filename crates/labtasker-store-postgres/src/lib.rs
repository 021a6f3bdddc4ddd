//! Postgres-backed `StoreAdapter`. Every mutation is a single
//! `UPDATE ... WHERE id = $1 AND etag = $2` statement; a zero-row result is
//! the etag-mismatch CAS failure, surfaced as `StoreError::CasConflict`.
//!
//! Queries are built with the runtime-checked `sqlx::query_as`/`query` APIs
//! rather than the `query!`/`query_as!` macros, since those require a live
//! database (or a `.sqlx` offline cache) at compile time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use labtasker_core::error::StoreError;
use labtasker_core::store::{Cursor, StoreAdapter};
use labtasker_core::types::{Queue, Task, TaskStatus, Worker, WorkerStatus};
use labtasker_core::value::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use uuid::Uuid;

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub db_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            db_url: String::new(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_seconds: 30,
        }
    }
}

impl PoolConfig {
    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_seconds))
            .connect(&self.db_url)
            .await
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &PoolConfig) -> Result<Self, sqlx::Error> {
        Ok(Self::new(config.connect().await?))
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn task_status_str(s: TaskStatus) -> &'static str {
    match s {
        TaskStatus::Pending => "PENDING",
        TaskStatus::Running => "RUNNING",
        TaskStatus::Success => "SUCCESS",
        TaskStatus::Failed => "FAILED",
        TaskStatus::Cancelled => "CANCELLED",
    }
}

fn parse_task_status(s: &str) -> TaskStatus {
    match s {
        "PENDING" => TaskStatus::Pending,
        "RUNNING" => TaskStatus::Running,
        "SUCCESS" => TaskStatus::Success,
        "FAILED" => TaskStatus::Failed,
        "CANCELLED" => TaskStatus::Cancelled,
        other => panic!("unknown task status in store: {other}"),
    }
}

fn worker_status_str(s: WorkerStatus) -> &'static str {
    match s {
        WorkerStatus::Active => "ACTIVE",
        WorkerStatus::Suspended => "SUSPENDED",
        WorkerStatus::Crashed => "CRASHED",
    }
}

fn parse_worker_status(s: &str) -> WorkerStatus {
    match s {
        "ACTIVE" => WorkerStatus::Active,
        "SUSPENDED" => WorkerStatus::Suspended,
        "CRASHED" => WorkerStatus::Crashed,
        other => panic!("unknown worker status in store: {other}"),
    }
}

#[derive(FromRow)]
struct QueueRow {
    id: Uuid,
    name: String,
    password_hash: String,
    metadata: serde_json::Value,
    default_heartbeat_timeout_secs: i64,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    etag: i64,
}

impl From<QueueRow> for Queue {
    fn from(r: QueueRow) -> Self {
        Queue {
            id: r.id,
            name: r.name,
            password_hash: r.password_hash,
            metadata: r.metadata.into(),
            default_heartbeat_timeout_secs: r.default_heartbeat_timeout_secs,
            created_at: r.created_at,
            last_modified: r.last_modified,
            etag: r.etag,
        }
    }
}

#[derive(FromRow)]
struct TaskRow {
    id: Uuid,
    queue_id: Uuid,
    task_name: Option<String>,
    args: serde_json::Value,
    metadata: serde_json::Value,
    cmd: Option<String>,
    heartbeat_timeout_secs: i64,
    task_timeout_secs: Option<i64>,
    max_retries: i32,
    priority: i64,
    status: String,
    retries: i32,
    worker_id: Option<Uuid>,
    last_heartbeat: Option<DateTime<Utc>>,
    start_time: Option<DateTime<Utc>>,
    summary: serde_json::Value,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    etag: i64,
}

impl From<TaskRow> for Task {
    fn from(r: TaskRow) -> Self {
        Task {
            id: r.id,
            queue_id: r.queue_id,
            task_name: r.task_name,
            args: r.args.into(),
            metadata: r.metadata.into(),
            cmd: r.cmd,
            heartbeat_timeout_secs: r.heartbeat_timeout_secs,
            task_timeout_secs: r.task_timeout_secs,
            max_retries: r.max_retries as u32,
            priority: r.priority,
            status: parse_task_status(&r.status),
            retries: r.retries as u32,
            worker_id: r.worker_id,
            last_heartbeat: r.last_heartbeat,
            start_time: r.start_time,
            summary: r.summary.into(),
            created_at: r.created_at,
            last_modified: r.last_modified,
            etag: r.etag,
        }
    }
}

#[derive(FromRow)]
struct WorkerRow {
    id: Uuid,
    queue_id: Uuid,
    worker_name: Option<String>,
    metadata: serde_json::Value,
    max_retries: i32,
    status: String,
    retries: i32,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    etag: i64,
}

impl From<WorkerRow> for Worker {
    fn from(r: WorkerRow) -> Self {
        Worker {
            id: r.id,
            queue_id: r.queue_id,
            worker_name: r.worker_name,
            metadata: r.metadata.into(),
            max_retries: r.max_retries as u32,
            status: parse_worker_status(&r.status),
            retries: r.retries as u32,
            created_at: r.created_at,
            last_modified: r.last_modified,
            etag: r.etag,
        }
    }
}

fn map_sqlx_err(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::AlreadyExists,
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => StoreError::Transient(err.to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

#[async_trait]
impl StoreAdapter for PgStore {
    async fn create_queue(&self, queue: Queue) -> Result<Queue, StoreError> {
        let row: QueueRow = sqlx::query_as(
            r#"
            INSERT INTO queues (id, name, password_hash, metadata, default_heartbeat_timeout_secs, created_at, last_modified, etag)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0)
            RETURNING id, name, password_hash, metadata, default_heartbeat_timeout_secs, created_at, last_modified, etag
            "#,
        )
        .bind(queue.id)
        .bind(&queue.name)
        .bind(&queue.password_hash)
        .bind(serde_json::Value::from(queue.metadata))
        .bind(queue.default_heartbeat_timeout_secs)
        .bind(queue.created_at)
        .bind(queue.last_modified)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(row.into())
    }

    async fn get_queue(&self, id: Uuid) -> Result<Queue, StoreError> {
        let row: QueueRow = sqlx::query_as("SELECT * FROM queues WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(row.into())
    }

    async fn get_queue_by_name(&self, name: &str) -> Result<Queue, StoreError> {
        let row: QueueRow = sqlx::query_as("SELECT * FROM queues WHERE name = $1")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(row.into())
    }

    async fn update_queue_if_match(&self, queue: Queue) -> Result<Queue, StoreError> {
        let row: Option<QueueRow> = sqlx::query_as(
            r#"
            UPDATE queues
            SET password_hash = $1, metadata = $2, default_heartbeat_timeout_secs = $3,
                last_modified = $4, etag = etag + 1
            WHERE id = $5 AND etag = $6
            RETURNING id, name, password_hash, metadata, default_heartbeat_timeout_secs, created_at, last_modified, etag
            "#,
        )
        .bind(&queue.password_hash)
        .bind(serde_json::Value::from(queue.metadata))
        .bind(queue.default_heartbeat_timeout_secs)
        .bind(queue.last_modified)
        .bind(queue.id)
        .bind(queue.etag)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        row.map(Into::into).ok_or(StoreError::CasConflict)
    }

    async fn delete_queue_cascade(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        sqlx::query("DELETE FROM tasks WHERE queue_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        sqlx::query("DELETE FROM workers WHERE queue_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        sqlx::query("DELETE FROM queues WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn insert_task(&self, task: Task) -> Result<Task, StoreError> {
        let row: TaskRow = sqlx::query_as(
            r#"
            INSERT INTO tasks (
                id, queue_id, task_name, args, metadata, cmd, heartbeat_timeout_secs,
                task_timeout_secs, max_retries, priority, status, retries, worker_id,
                last_heartbeat, start_time, summary, created_at, last_modified, etag
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, 0)
            RETURNING *
            "#,
        )
        .bind(task.id)
        .bind(task.queue_id)
        .bind(&task.task_name)
        .bind(serde_json::Value::from(task.args))
        .bind(serde_json::Value::from(task.metadata))
        .bind(&task.cmd)
        .bind(task.heartbeat_timeout_secs)
        .bind(task.task_timeout_secs)
        .bind(task.max_retries as i32)
        .bind(task.priority)
        .bind(task_status_str(task.status))
        .bind(task.retries as i32)
        .bind(task.worker_id)
        .bind(task.last_heartbeat)
        .bind(task.start_time)
        .bind(serde_json::Value::from(task.summary))
        .bind(task.created_at)
        .bind(task.last_modified)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(row.into())
    }

    async fn get_task(&self, id: Uuid) -> Result<Task, StoreError> {
        let row: TaskRow = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(row.into())
    }

    async fn update_task_if_match(&self, task: Task) -> Result<Task, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as(
            r#"
            UPDATE tasks
            SET task_name = $1, args = $2, metadata = $3, cmd = $4, heartbeat_timeout_secs = $5,
                task_timeout_secs = $6, max_retries = $7, priority = $8, status = $9, retries = $10,
                worker_id = $11, last_heartbeat = $12, start_time = $13, summary = $14,
                last_modified = $15, etag = etag + 1
            WHERE id = $16 AND etag = $17
            RETURNING *
            "#,
        )
        .bind(&task.task_name)
        .bind(serde_json::Value::from(task.args))
        .bind(serde_json::Value::from(task.metadata))
        .bind(&task.cmd)
        .bind(task.heartbeat_timeout_secs)
        .bind(task.task_timeout_secs)
        .bind(task.max_retries as i32)
        .bind(task.priority)
        .bind(task_status_str(task.status))
        .bind(task.retries as i32)
        .bind(task.worker_id)
        .bind(task.last_heartbeat)
        .bind(task.start_time)
        .bind(serde_json::Value::from(task.summary))
        .bind(task.last_modified)
        .bind(task.id)
        .bind(task.etag)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        row.map(Into::into).ok_or(StoreError::CasConflict)
    }

    async fn candidate_pending_tasks(
        &self,
        queue_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        // Plain ordered read, not a lock-and-claim: the caller (the engine's
        // fetch_next CAS loop) does its own per-candidate etag CAS, so no
        // `FOR UPDATE SKIP LOCKED` is needed at this step.
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"
            SELECT * FROM tasks
            WHERE queue_id = $1 AND status = 'PENDING'
            ORDER BY priority DESC, created_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(queue_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn running_tasks(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"
            SELECT * FROM tasks
            WHERE status = 'RUNNING'
            ORDER BY last_heartbeat ASC NULLS FIRST, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_tasks(
        &self,
        queue_id: Uuid,
        status: Option<TaskStatus>,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        let status_str = status.map(task_status_str);
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"
            SELECT * FROM tasks
            WHERE queue_id = $1
              AND ($2::TEXT IS NULL OR status = $2)
              AND ($3::TIMESTAMPTZ IS NULL OR (created_at, id) > ($3, $4))
            ORDER BY created_at ASC, id ASC
            LIMIT $5
            "#,
        )
        .bind(queue_id)
        .bind(status_str)
        .bind(cursor.map(|c| c.created_at))
        .bind(cursor.map(|c| c.id))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_worker(&self, worker: Worker) -> Result<Worker, StoreError> {
        let row: WorkerRow = sqlx::query_as(
            r#"
            INSERT INTO workers (id, queue_id, worker_name, metadata, max_retries, status, retries, created_at, last_modified, etag)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0)
            RETURNING *
            "#,
        )
        .bind(worker.id)
        .bind(worker.queue_id)
        .bind(&worker.worker_name)
        .bind(serde_json::Value::from(worker.metadata))
        .bind(worker.max_retries as i32)
        .bind(worker_status_str(worker.status))
        .bind(worker.retries as i32)
        .bind(worker.created_at)
        .bind(worker.last_modified)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(row.into())
    }

    async fn get_worker(&self, id: Uuid) -> Result<Worker, StoreError> {
        let row: WorkerRow = sqlx::query_as("SELECT * FROM workers WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(row.into())
    }

    async fn get_worker_by_name(&self, queue_id: Uuid, name: &str) -> Result<Worker, StoreError> {
        let row: WorkerRow =
            sqlx::query_as("SELECT * FROM workers WHERE queue_id = $1 AND worker_name = $2")
                .bind(queue_id)
                .bind(name)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        Ok(row.into())
    }

    async fn update_worker_if_match(&self, worker: Worker) -> Result<Worker, StoreError> {
        let row: Option<WorkerRow> = sqlx::query_as(
            r#"
            UPDATE workers
            SET worker_name = $1, metadata = $2, max_retries = $3, status = $4, retries = $5,
                last_modified = $6, etag = etag + 1
            WHERE id = $7 AND etag = $8
            RETURNING *
            "#,
        )
        .bind(&worker.worker_name)
        .bind(serde_json::Value::from(worker.metadata))
        .bind(worker.max_retries as i32)
        .bind(worker_status_str(worker.status))
        .bind(worker.retries as i32)
        .bind(worker.last_modified)
        .bind(worker.id)
        .bind(worker.etag)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        row.map(Into::into).ok_or(StoreError::CasConflict)
    }

    async fn delete_worker(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM workers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_workers(
        &self,
        queue_id: Uuid,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<Vec<Worker>, StoreError> {
        let rows: Vec<WorkerRow> = sqlx::query_as(
            r#"
            SELECT * FROM workers
            WHERE queue_id = $1
              AND ($2::TIMESTAMPTZ IS NULL OR (created_at, id) > ($2, $3))
            ORDER BY created_at ASC, id ASC
            LIMIT $4
            "#,
        )
        .bind(queue_id)
        .bind(cursor.map(|c| c.created_at))
        .bind(cursor.map(|c| c.id))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
