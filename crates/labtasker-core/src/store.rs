//! Abstract document-store adapter. The engine is written entirely against
//! this trait; concrete drivers (`labtasker-store-memory`,
//! `labtasker-store-postgres`) live in separate crates so `labtasker-core`
//! never depends on a particular persistence technology.

use crate::error::StoreError;
use crate::types::{Queue, Task, Worker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Opaque pagination cursor: `(created_at, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

#[async_trait]
pub trait StoreAdapter: Send + Sync {
    // --- Queues ---
    async fn create_queue(&self, queue: Queue) -> Result<Queue, StoreError>;
    async fn get_queue(&self, id: Uuid) -> Result<Queue, StoreError>;
    async fn get_queue_by_name(&self, name: &str) -> Result<Queue, StoreError>;
    /// `queue.etag` carries the caller's last-observed etag; the store
    /// compares-and-updates, bumping `etag` by one on success.
    async fn update_queue_if_match(&self, queue: Queue) -> Result<Queue, StoreError>;
    /// Deletes the queue and all tasks/workers with `queue_id == id` as one
    /// atomic unit.
    async fn delete_queue_cascade(&self, id: Uuid) -> Result<(), StoreError>;

    // --- Tasks ---
    async fn insert_task(&self, task: Task) -> Result<Task, StoreError>;
    async fn get_task(&self, id: Uuid) -> Result<Task, StoreError>;
    async fn update_task_if_match(&self, task: Task) -> Result<Task, StoreError>;

    /// Up to `limit` PENDING tasks for `queue_id`, sorted by
    /// `(priority DESC, created_at ASC, id ASC)`. The engine applies
    /// `required_fields`/`extra_filter` itself (the matcher is pure); this
    /// is just the ordered candidate scan.
    async fn candidate_pending_tasks(
        &self,
        queue_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError>;

    /// All RUNNING tasks, for the reaper's heartbeat/task-timeout sweep.
    /// Backed by the `tasks(queue_id, status, last_heartbeat ASC)` index.
    async fn running_tasks(&self, limit: usize) -> Result<Vec<Task>, StoreError>;

    /// A page of tasks for `queue_id`, optionally restricted to `status`,
    /// ordered by `(created_at, id)` ascending, strictly after `cursor`.
    /// Filtering by the query-matcher expression happens in the engine —
    /// the store only knows about status and the cursor.
    async fn list_tasks(
        &self,
        queue_id: Uuid,
        status: Option<crate::types::TaskStatus>,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError>;

    // --- Workers ---
    async fn insert_worker(&self, worker: Worker) -> Result<Worker, StoreError>;
    async fn get_worker(&self, id: Uuid) -> Result<Worker, StoreError>;
    async fn get_worker_by_name(&self, queue_id: Uuid, name: &str) -> Result<Worker, StoreError>;
    async fn update_worker_if_match(&self, worker: Worker) -> Result<Worker, StoreError>;
    async fn delete_worker(&self, id: Uuid) -> Result<(), StoreError>;

    async fn list_workers(
        &self,
        queue_id: Uuid,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<Vec<Worker>, StoreError>;
}
