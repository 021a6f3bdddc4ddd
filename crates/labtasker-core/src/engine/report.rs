//! Reporting a task's outcome. The worker-counter update this triggers is
//! shared with the reaper, which treats an expired lease as if the owning
//! worker had reported failed, so it lives here as a crate-visible helper
//! `apply_worker_outcome`.

use super::Engine;
use crate::error::{EngineError, StoreError};
use crate::types::{EntityKind, Event, Task, TaskStatus, Worker, WorkerStatus};
use crate::value::Value;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed,
    Cancelled,
}

impl Engine {
    pub async fn report(
        &self,
        task_id: Uuid,
        worker_id: Uuid,
        outcome: Outcome,
        summary: Value,
    ) -> Result<Task, EngineError> {
        self.report_with_forced_worker_status(task_id, worker_id, outcome, summary, None)
            .await
    }

    /// Same as `report`, but lets the caller force the worker's resulting
    /// status when the failure doesn't already trigger suspension. Used
    /// only by the reaper, to mark the owning worker `CRASHED` on
    /// heartbeat expiry.
    pub(crate) async fn report_with_forced_worker_status(
        &self,
        task_id: Uuid,
        worker_id: Uuid,
        outcome: Outcome,
        summary: Value,
        forced_worker_status: Option<WorkerStatus>,
    ) -> Result<Task, EngineError> {
        for _ in 0..self.config.max_cas_retries {
            let task = self
                .store
                .get_task(task_id)
                .await
                .map_err(|_| EngineError::NotFound(format!("task {task_id}")))?;

            if task.status != TaskStatus::Running || task.worker_id != Some(worker_id) {
                return Err(EngineError::NotOwned { task_id, worker_id });
            }

            let now = self.clock.now();
            let mut updated = task.clone();
            updated.summary = summary.clone();
            updated.last_modified = now;

            match outcome {
                Outcome::Success => {
                    updated.status = TaskStatus::Success;
                    clear_lease(&mut updated);
                }
                Outcome::Failed => {
                    updated.retries += 1;
                    if updated.retries < updated.max_retries {
                        updated.status = TaskStatus::Pending;
                    } else {
                        updated.status = TaskStatus::Failed;
                    }
                    clear_lease(&mut updated);
                }
                Outcome::Cancelled => {
                    updated.status = TaskStatus::Cancelled;
                    clear_lease(&mut updated);
                }
            }

            match self.store.update_task_if_match(updated).await {
                Ok(new_task) => {
                    self.publish_task_transition(&task, &new_task).await;

                    if outcome != Outcome::Cancelled {
                        let success = outcome == Outcome::Success;
                        self.apply_worker_outcome(worker_id, success, forced_worker_status)
                            .await?;
                    }

                    info!(
                        task_id = %task_id, worker_id = %worker_id, outcome = ?outcome,
                        new_status = ?new_task.status, "task report applied"
                    );
                    return Ok(new_task);
                }
                Err(StoreError::CasConflict) => continue,
                Err(other) => return Err(other.into()),
            }
        }
        Err(EngineError::Conflict)
    }

    pub(crate) async fn publish_task_transition(&self, old: &Task, new: &Task) {
        let event_id = self.bus.alloc_event_id();
        self.bus
            .publish(Event::Transition {
                id: event_id,
                timestamp: new.last_modified,
                queue_id: new.queue_id,
                entity: EntityKind::Task,
                entity_id: new.id,
                old_status: Some(format!("{:?}", old.status).to_uppercase()),
                new_status: format!("{:?}", new.status).to_uppercase(),
                metadata: Value::Null,
            })
            .await;
    }

    /// Apply the consecutive-failure bookkeeping for `worker_id`: reset on
    /// success, increment and possibly suspend on failure. `forced_status`,
    /// when `Some`, is applied only if the failure didn't already trigger
    /// suspension — used by the reaper to mark a worker `CRASHED` on
    /// heartbeat expiry.
    pub(crate) async fn apply_worker_outcome(
        &self,
        worker_id: Uuid,
        success: bool,
        forced_status: Option<WorkerStatus>,
    ) -> Result<Worker, EngineError> {
        for _ in 0..self.config.max_cas_retries {
            let worker = self
                .store
                .get_worker(worker_id)
                .await
                .map_err(|_| EngineError::NotFound(format!("worker {worker_id}")))?;

            let mut updated = worker.clone();
            if success {
                updated.retries = 0;
            } else {
                updated.retries += 1;
                if updated.retries >= updated.max_retries {
                    updated.status = WorkerStatus::Suspended;
                } else if let Some(forced) = forced_status {
                    updated.status = forced;
                }
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
}

fn clear_lease(task: &mut Task) {
    task.worker_id = None;
    task.start_time = None;
    task.last_heartbeat = None;
}
