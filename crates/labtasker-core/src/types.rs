//! Core entities: `Queue`, `Task`, `Worker`, `Event`.

use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self, retries: u32, max_retries: u32) -> bool {
        match self {
            TaskStatus::Success | TaskStatus::Cancelled => true,
            TaskStatus::Failed => retries >= max_retries,
            TaskStatus::Pending | TaskStatus::Running => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkerStatus {
    Active,
    Suspended,
    Crashed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Queue {
    pub id: Uuid,
    pub name: String,
    pub password_hash: String,
    pub metadata: Value,
    pub default_heartbeat_timeout_secs: i64,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub etag: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub queue_id: Uuid,
    pub task_name: Option<String>,
    pub args: Value,
    pub metadata: Value,
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
    pub summary: Value,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub etag: i64,
}

impl Task {
    /// Invariant: `status == RUNNING` iff worker/heartbeat/start fields are
    /// all set.
    pub fn check_running_invariant(&self) -> bool {
        let fields_set =
            self.worker_id.is_some() && self.last_heartbeat.is_some() && self.start_time.is_some();
        (self.status == TaskStatus::Running) == fields_set
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal(self.retries, self.max_retries)
    }

    /// The document a query-matcher `Filter` is evaluated against: `args`
    /// and `metadata` as top-level keys, so paths like `args.lr` and
    /// `metadata.tag` both resolve.
    pub fn filter_doc(&self) -> Value {
        let mut doc = std::collections::BTreeMap::new();
        doc.insert("args".to_string(), self.args.clone());
        doc.insert("metadata".to_string(), self.metadata.clone());
        Value::Object(doc)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: Uuid,
    pub queue_id: Uuid,
    pub worker_name: Option<String>,
    pub metadata: Value,
    pub max_retries: u32,
    pub status: WorkerStatus,
    pub retries: u32,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub etag: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    Worker,
    Queue,
}

/// Ephemeral fan-out event. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Transition {
        id: u64,
        timestamp: DateTime<Utc>,
        queue_id: Uuid,
        entity: EntityKind,
        entity_id: Uuid,
        old_status: Option<String>,
        new_status: String,
        metadata: Value,
    },
    /// Sentinel inserted when a subscriber's buffer overflows.
    Overflow { id: u64, timestamp: DateTime<Utc> },
}

impl Event {
    pub fn queue_id(&self) -> Option<Uuid> {
        match self {
            Event::Transition { queue_id, .. } => Some(*queue_id),
            Event::Overflow { .. } => None,
        }
    }
}
