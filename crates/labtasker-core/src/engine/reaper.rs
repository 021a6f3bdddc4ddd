//! The reaper: a periodic sweep over RUNNING tasks that expires stale
//! leases, covering two independent timeouts (heartbeat vs. absolute task
//! timeout) and routing each expiry through the same retry/suspension
//! policy a worker's own failure report goes through.

use super::report::Outcome;
use super::Engine;
use crate::error::EngineError;
use crate::types::{TaskStatus, WorkerStatus};
use crate::value::Value;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct ReaperReport {
    pub scanned: usize,
    pub requeued: usize,
    pub terminated: usize,
    pub workers_crashed: usize,
}

enum ExpiryKind {
    Heartbeat,
    TaskTimeout,
}

impl Engine {
    /// One sweep. Safe to call concurrently from multiple engine replicas:
    /// every mutation is a per-document CAS, so a reaper instance that
    /// loses a race to another simply skips that task.
    pub async fn run_reaper_once(&self, scan_limit: usize) -> Result<ReaperReport, EngineError> {
        let mut report = ReaperReport::default();
        let running = self.store.running_tasks(scan_limit).await?;
        let now = self.clock.now();

        for task in running {
            report.scanned += 1;

            let heartbeat_expired = task
                .last_heartbeat
                .map(|hb| (now - hb).num_seconds() > task.heartbeat_timeout_secs)
                .unwrap_or(false);
            let task_timed_out = match (task.task_timeout_secs, task.start_time) {
                (Some(timeout), Some(start)) => (now - start).num_seconds() > timeout,
                _ => false,
            };

            if !heartbeat_expired && !task_timed_out {
                continue;
            }

            let kind = if heartbeat_expired {
                ExpiryKind::Heartbeat
            } else {
                ExpiryKind::TaskTimeout
            };

            let Some(worker_id) = task.worker_id else {
                // Invariant violation guard: a RUNNING task must carry a
                // worker_id. Nothing to reap against; skip defensively.
                warn!(task_id = %task.id, "reaper found RUNNING task with no worker_id, skipping");
                continue;
            };

            match self
                .reap_one(task.id, worker_id, &kind)
                .await
            {
                Ok(terminal) => {
                    if terminal {
                        report.terminated += 1;
                        // A task that never recovers across its whole retry
                        // budget is the reaper's "poison pill" case.
                        metrics::counter!("labtasker_reaper_poison_pills_total").increment(1);
                    } else {
                        report.requeued += 1;
                        metrics::counter!("labtasker_reaper_stalls_reset_total").increment(1);
                    }
                    if matches!(kind, ExpiryKind::Heartbeat) {
                        report.workers_crashed += 1;
                    }
                }
                Err(EngineError::Conflict) => {
                    // Lost the race to another engine replica or the owning
                    // worker's own report; that's fine, skip to the next task.
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            scanned = report.scanned,
            requeued = report.requeued,
            terminated = report.terminated,
            workers_crashed = report.workers_crashed,
            "reaper sweep complete"
        );
        Ok(report)
    }

    /// Returns `true` if the task reached a terminal state, `false` if it
    /// was re-queued to PENDING.
    async fn reap_one(
        &self,
        task_id: uuid::Uuid,
        worker_id: uuid::Uuid,
        kind: &ExpiryKind,
    ) -> Result<bool, EngineError> {
        // Re-validate ownership under the report() CAS loop rather than
        // trusting the snapshot read in run_reaper_once: the task may have
        // already been reported on by the time we get here.
        let task = match self.store.get_task(task_id).await {
            Ok(t) => t,
            Err(_) => return Ok(true), // already gone; nothing to do
        };
        if task.status != TaskStatus::Running || task.worker_id != Some(worker_id) {
            return Ok(true); // already transitioned by someone else
        }

        let forced = match kind {
            ExpiryKind::Heartbeat => Some(WorkerStatus::Crashed),
            ExpiryKind::TaskTimeout => None,
        };

        let new_task = self
            .report_with_forced_worker_status(task_id, worker_id, Outcome::Failed, Value::Null, forced)
            .await?;

        Ok(new_task.status == TaskStatus::Failed)
    }
}
