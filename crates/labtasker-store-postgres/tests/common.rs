use chrono::Utc;
use labtasker_core::types::{Queue, Task, TaskStatus, Worker, WorkerStatus};
use labtasker_core::value::Value;
use uuid::Uuid;

#[allow(dead_code)]
pub fn new_queue() -> Queue {
    let now = Utc::now();
    Queue {
        id: Uuid::now_v7(),
        name: format!("q-{}", Uuid::now_v7()),
        password_hash: "hash".to_string(),
        metadata: Value::Null,
        default_heartbeat_timeout_secs: 60,
        created_at: now,
        last_modified: now,
        etag: 0,
    }
}

#[allow(dead_code)]
pub fn new_task(queue_id: Uuid) -> Task {
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
        max_retries: 1,
        priority: 0,
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

#[allow(dead_code)]
pub fn new_worker(queue_id: Uuid) -> Worker {
    let now = Utc::now();
    Worker {
        id: Uuid::now_v7(),
        queue_id,
        worker_name: None,
        metadata: Value::Null,
        max_retries: 3,
        status: WorkerStatus::Active,
        retries: 0,
        created_at: now,
        last_modified: now,
        etag: 0,
    }
}
