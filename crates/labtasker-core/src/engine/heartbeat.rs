//! Worker liveness refresh: bumps `last_heartbeat` on the task a worker
//! currently owns, guarded by the same CAS retry loop as every other
//! mutation.

use super::Engine;
use crate::error::{EngineError, StoreError};
use crate::types::{Task, TaskStatus};
use uuid::Uuid;

impl Engine {
    pub async fn heartbeat(&self, task_id: Uuid, worker_id: Uuid) -> Result<Task, EngineError> {
        for _ in 0..self.config.max_cas_retries {
            let task = self
                .store
                .get_task(task_id)
                .await
                .map_err(|_| EngineError::NotFound(format!("task {task_id}")))?;

            if task.status != TaskStatus::Running || task.worker_id != Some(worker_id) {
                return Err(EngineError::NotOwned { task_id, worker_id });
            }

            let mut updated = task.clone();
            let now = self.clock.now();
            updated.last_heartbeat = Some(now);
            updated.last_modified = now;

            match self.store.update_task_if_match(updated).await {
                Ok(task) => return Ok(task),
                Err(StoreError::CasConflict) => continue,
                Err(other) => return Err(other.into()),
            }
        }
        Err(EngineError::Conflict)
    }
}
