//! Claiming a task: scan the candidate window, apply required-field and
//! extra filters, then CAS the first match to RUNNING under the requesting
//! worker.

use super::Engine;
use crate::error::{EngineError, StoreError};
use crate::matcher::Filter;
use crate::types::{EntityKind, Event, TaskStatus, WorkerStatus};
use tracing::{debug, info};
use uuid::Uuid;

pub struct FetchRequest {
    pub queue_id: Uuid,
    pub worker_id: Uuid,
    pub required_fields: Vec<String>,
    pub extra_filter: Option<Filter>,
    /// Per-lease override, persisted onto the task document.
    pub heartbeat_timeout_override_secs: Option<i64>,
}

impl Engine {
    pub async fn fetch_next(
        &self,
        req: FetchRequest,
    ) -> Result<Option<crate::types::Task>, EngineError> {
        let worker = self
            .store
            .get_worker(req.worker_id)
            .await
            .map_err(|_| EngineError::WorkerInactive(req.worker_id))?;

        if worker.queue_id != req.queue_id {
            return Err(EngineError::WorkerInactive(req.worker_id));
        }
        if worker.status != WorkerStatus::Active {
            return Err(EngineError::WorkerInactive(req.worker_id));
        }

        metrics::counter!("labtasker_fetch_attempts_total").increment(1);

        let required = if req.required_fields.is_empty() {
            None
        } else {
            Some(Filter::required_fields(&req.required_fields))
        };

        let candidates = self
            .store
            .candidate_pending_tasks(req.queue_id, self.config.max_candidate_scan)
            .await?;

        for candidate in candidates {
            if candidate.status != TaskStatus::Pending {
                continue;
            }
            let doc = candidate.filter_doc();
            if let Some(ref f) = required {
                if !f.matches(&doc) {
                    continue;
                }
            }
            if let Some(ref f) = req.extra_filter {
                if !f.matches(&doc) {
                    continue;
                }
            }

            let now = self.clock.now();
            let mut updated = candidate.clone();
            updated.status = TaskStatus::Running;
            updated.worker_id = Some(req.worker_id);
            updated.start_time = Some(now);
            updated.last_heartbeat = Some(now);
            updated.last_modified = now;
            if let Some(secs) = req.heartbeat_timeout_override_secs {
                updated.heartbeat_timeout_secs = secs;
            }

            match self.store.update_task_if_match(updated).await {
                Ok(task) => {
                    let event_id = self.bus.alloc_event_id();
                    self.bus
                        .publish(Event::Transition {
                            id: event_id,
                            timestamp: now,
                            queue_id: req.queue_id,
                            entity: EntityKind::Task,
                            entity_id: task.id,
                            old_status: Some("PENDING".to_string()),
                            new_status: "RUNNING".to_string(),
                            metadata: crate::value::Value::Null,
                        })
                        .await;
                    info!(task_id = %task.id, worker_id = %req.worker_id, "dispatched task");
                    metrics::counter!("labtasker_fetch_hits_total").increment(1);
                    return Ok(Some(task));
                }
                Err(StoreError::CasConflict) => {
                    // Another worker won this candidate; move on.
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }

        debug!(queue_id = %req.queue_id, "fetch-next found no claimable task in candidate scan");
        metrics::counter!("labtasker_fetch_misses_total").increment(1);
        Ok(None)
    }
}
