//! Shared harness for the engine-level scenario/invariant tests: a
//! `MemoryStore`-backed `Engine` plus a `TestClock` the tests can advance
//! without real sleeps.

use chrono::Utc;
use labtasker_core::clock::{SharedClock, TestClock};
use labtasker_core::store::StoreAdapter;
use labtasker_core::{Engine, EventBus, RegisterWorkerRequest, SubmitTaskRequest, Value};
use labtasker_store_memory::MemoryStore;
use std::sync::Arc;
use uuid::Uuid;

pub struct Harness {
    pub engine: Engine,
    pub clock: TestClock,
}

pub fn harness() -> Harness {
    let store: Arc<dyn StoreAdapter> = Arc::new(MemoryStore::new());
    let bus = Arc::new(EventBus::new(64));
    let clock = TestClock::new(Utc::now());
    let shared: SharedClock = Arc::new(clock.clone());
    let engine = Engine::new(store, bus, shared);
    Harness { engine, clock }
}

pub async fn new_queue(h: &Harness) -> Uuid {
    h.engine
        .create_queue(
            format!("q-{}", Uuid::now_v7()),
            "hash".to_string(),
            Value::Null,
            60,
        )
        .await
        .expect("create_queue")
        .id
}

pub async fn new_worker(h: &Harness, queue_id: Uuid, max_retries: u32) -> Uuid {
    h.engine
        .register_worker(RegisterWorkerRequest {
            queue_id,
            worker_name: None,
            metadata: Value::Null,
            max_retries,
        })
        .await
        .expect("register_worker")
        .id
}

pub struct SubmitOpts {
    pub args: Value,
    pub max_retries: u32,
    pub priority: i64,
    pub heartbeat_timeout_secs: i64,
    pub task_timeout_secs: Option<i64>,
}

impl Default for SubmitOpts {
    fn default() -> Self {
        Self {
            args: Value::Null,
            max_retries: 0,
            priority: 0,
            heartbeat_timeout_secs: 60,
            task_timeout_secs: None,
        }
    }
}

pub async fn submit(h: &Harness, queue_id: Uuid, opts: SubmitOpts) -> Uuid {
    h.engine
        .submit_task(SubmitTaskRequest {
            queue_id,
            task_name: None,
            args: opts.args,
            metadata: Value::Null,
            cmd: None,
            heartbeat_timeout_secs: opts.heartbeat_timeout_secs,
            task_timeout_secs: opts.task_timeout_secs,
            max_retries: opts.max_retries,
            priority: opts.priority,
        })
        .await
        .expect("submit_task")
        .id
}
