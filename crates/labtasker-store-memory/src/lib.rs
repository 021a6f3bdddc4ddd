//! `dashmap`-backed `StoreAdapter`. Each document lives in its own `DashMap`
//! entry; `update_*_if_match` uses `DashMap::get_mut`, which holds the
//! shard's internal lock for the duration of the read-compare-write, giving
//! the same per-document CAS guarantee `labtasker-store-postgres` gets from
//! `UPDATE ... WHERE etag = $1`. No lock is ever held across an `.await`.
//!
//! Intended for `labtasker-core`'s own test suite and single-process
//! embedding; it holds everything in memory and does not persist.

use async_trait::async_trait;
use dashmap::DashMap;
use labtasker_core::error::StoreError;
use labtasker_core::store::{Cursor, StoreAdapter};
use labtasker_core::types::{Queue, Task, TaskStatus, Worker};
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    queues: DashMap<Uuid, Queue>,
    queue_names: DashMap<String, Uuid>,
    tasks: DashMap<Uuid, Task>,
    workers: DashMap<Uuid, Worker>,
    worker_names: DashMap<(Uuid, String), Uuid>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn create_queue(&self, queue: Queue) -> Result<Queue, StoreError> {
        if self.queue_names.contains_key(&queue.name) {
            return Err(StoreError::AlreadyExists);
        }
        self.queue_names.insert(queue.name.clone(), queue.id);
        self.queues.insert(queue.id, queue.clone());
        Ok(queue)
    }

    async fn get_queue(&self, id: Uuid) -> Result<Queue, StoreError> {
        self.queues.get(&id).map(|q| q.clone()).ok_or(StoreError::NotFound)
    }

    async fn get_queue_by_name(&self, name: &str) -> Result<Queue, StoreError> {
        let id = *self.queue_names.get(name).ok_or(StoreError::NotFound)?;
        self.get_queue(id).await
    }

    async fn update_queue_if_match(&self, queue: Queue) -> Result<Queue, StoreError> {
        let mut entry = self.queues.get_mut(&queue.id).ok_or(StoreError::NotFound)?;
        if entry.etag != queue.etag {
            return Err(StoreError::CasConflict);
        }
        let mut updated = queue;
        updated.etag += 1;
        *entry = updated.clone();
        Ok(updated)
    }

    async fn delete_queue_cascade(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some((_, queue)) = self.queues.remove(&id) {
            self.queue_names.remove(&queue.name);
        }
        self.tasks.retain(|_, t| t.queue_id != id);
        self.workers.retain(|_, w| w.queue_id != id);
        self.worker_names.retain(|(qid, _), _| *qid != id);
        Ok(())
    }

    async fn insert_task(&self, task: Task) -> Result<Task, StoreError> {
        self.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: Uuid) -> Result<Task, StoreError> {
        self.tasks.get(&id).map(|t| t.clone()).ok_or(StoreError::NotFound)
    }

    async fn update_task_if_match(&self, task: Task) -> Result<Task, StoreError> {
        let mut entry = self.tasks.get_mut(&task.id).ok_or(StoreError::NotFound)?;
        if entry.etag != task.etag {
            return Err(StoreError::CasConflict);
        }
        let mut updated = task;
        updated.etag += 1;
        *entry = updated.clone();
        Ok(updated)
    }

    async fn candidate_pending_tasks(
        &self,
        queue_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        let mut candidates: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| t.queue_id == queue_id && t.status == TaskStatus::Pending)
            .map(|t| t.clone())
            .collect();
        // (priority DESC, created_at ASC, id ASC).
        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn running_tasks(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
        let mut running: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Running)
            .map(|t| t.clone())
            .collect();
        running.sort_by(|a, b| {
            a.last_heartbeat
                .cmp(&b.last_heartbeat)
                .then_with(|| a.id.cmp(&b.id))
        });
        running.truncate(limit);
        Ok(running)
    }

    async fn list_tasks(
        &self,
        queue_id: Uuid,
        status: Option<TaskStatus>,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        let mut page: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| {
                t.queue_id == queue_id
                    && status.map_or(true, |s| t.status == s)
                    && cursor.map_or(true, |c| (t.created_at, t.id) > (c.created_at, c.id))
            })
            .map(|t| t.clone())
            .collect();
        page.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        page.truncate(limit);
        Ok(page)
    }

    async fn insert_worker(&self, worker: Worker) -> Result<Worker, StoreError> {
        if let Some(name) = &worker.worker_name {
            let key = (worker.queue_id, name.clone());
            if self.worker_names.contains_key(&key) {
                return Err(StoreError::AlreadyExists);
            }
            self.worker_names.insert(key, worker.id);
        }
        self.workers.insert(worker.id, worker.clone());
        Ok(worker)
    }

    async fn get_worker(&self, id: Uuid) -> Result<Worker, StoreError> {
        self.workers.get(&id).map(|w| w.clone()).ok_or(StoreError::NotFound)
    }

    async fn get_worker_by_name(&self, queue_id: Uuid, name: &str) -> Result<Worker, StoreError> {
        let id = *self
            .worker_names
            .get(&(queue_id, name.to_string()))
            .ok_or(StoreError::NotFound)?;
        self.get_worker(id).await
    }

    async fn update_worker_if_match(&self, worker: Worker) -> Result<Worker, StoreError> {
        let mut entry = self.workers.get_mut(&worker.id).ok_or(StoreError::NotFound)?;
        if entry.etag != worker.etag {
            return Err(StoreError::CasConflict);
        }
        let mut updated = worker;
        updated.etag += 1;
        *entry = updated.clone();
        Ok(updated)
    }

    async fn delete_worker(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some((_, worker)) = self.workers.remove(&id) {
            if let Some(name) = worker.worker_name {
                self.worker_names.remove(&(worker.queue_id, name));
            }
        }
        Ok(())
    }

    async fn list_workers(
        &self,
        queue_id: Uuid,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<Vec<Worker>, StoreError> {
        let mut page: Vec<Worker> = self
            .workers
            .iter()
            .filter(|w| {
                w.queue_id == queue_id
                    && cursor.map_or(true, |c| (w.created_at, w.id) > (c.created_at, c.id))
            })
            .map(|w| w.clone())
            .collect();
        page.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        page.truncate(limit);
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use labtasker_core::value::Value;

    fn queue() -> Queue {
        let now = Utc::now();
        Queue {
            id: Uuid::now_v7(),
            name: "default".to_string(),
            password_hash: "x".to_string(),
            metadata: Value::Null,
            default_heartbeat_timeout_secs: 60,
            created_at: now,
            last_modified: now,
            etag: 0,
        }
    }

    fn task(queue_id: Uuid, priority: i64) -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::now_v7(),
            queue_id,
            task_name: None,
            args: Value::Null,
            metadata: Value::Null,
            cmd: None,
            heartbeat_timeout_secs: 60,
            task_timeout_secs: None,
            max_retries: 3,
            priority,
            status: TaskStatus::Pending,
            retries: 0,
            worker_id: None,
            last_heartbeat: None,
            start_time: None,
            summary: Value::Null,
            created_at: now,
            last_modified: now,
            etag: 0,
        }
    }

    #[tokio::test]
    async fn create_queue_rejects_duplicate_name() {
        let store = MemoryStore::new();
        let q = queue();
        store.create_queue(q.clone()).await.unwrap();
        let mut dup = queue();
        dup.name = q.name.clone();
        assert!(matches!(
            store.create_queue(dup).await,
            Err(StoreError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn update_queue_if_match_detects_stale_etag() {
        let store = MemoryStore::new();
        let q = store.create_queue(queue()).await.unwrap();
        let updated = store.update_queue_if_match(q.clone()).await.unwrap();
        assert_eq!(updated.etag, 1);
        assert!(matches!(
            store.update_queue_if_match(q).await,
            Err(StoreError::CasConflict)
        ));
    }

    #[tokio::test]
    async fn candidate_pending_tasks_orders_by_priority_then_age() {
        let store = MemoryStore::new();
        let queue_id = Uuid::now_v7();
        let low = store.insert_task(task(queue_id, 0)).await.unwrap();
        let high = store.insert_task(task(queue_id, 10)).await.unwrap();
        let candidates = store.candidate_pending_tasks(queue_id, 10).await.unwrap();
        assert_eq!(candidates[0].id, high.id);
        assert_eq!(candidates[1].id, low.id);
    }

    #[tokio::test]
    async fn list_tasks_paginates_strictly_after_cursor() {
        let store = MemoryStore::new();
        let queue_id = Uuid::now_v7();
        for _ in 0..5 {
            store.insert_task(task(queue_id, 0)).await.unwrap();
        }
        let first_page = store.list_tasks(queue_id, None, None, 2).await.unwrap();
        assert_eq!(first_page.len(), 2);
        let cursor = Cursor {
            created_at: first_page[1].created_at,
            id: first_page[1].id,
        };
        let second_page = store
            .list_tasks(queue_id, None, Some(cursor), 2)
            .await
            .unwrap();
        assert_eq!(second_page.len(), 2);
        assert!(second_page.iter().all(|t| t.id != first_page[0].id && t.id != first_page[1].id));
    }

    #[tokio::test]
    async fn delete_queue_cascade_removes_tasks_and_workers() {
        let store = MemoryStore::new();
        let queue_id = Uuid::now_v7();
        store.insert_task(task(queue_id, 0)).await.unwrap();
        store.delete_queue_cascade(queue_id).await.unwrap();
        assert_eq!(store.candidate_pending_tasks(queue_id, 10).await.unwrap().len(), 0);
    }
}
