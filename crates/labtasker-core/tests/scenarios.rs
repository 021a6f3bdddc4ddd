//! End-to-end scenarios exercising the full submit/fetch/report lifecycle
//! plus retry, suspension, heartbeat-crash, and ordering behavior.

mod common;

use chrono::Duration;
use common::{harness, new_queue, new_worker, submit, SubmitOpts};
use labtasker_core::{FetchRequest, Outcome, TaskStatus, Value, WorkerStatus};

fn args(pairs: &[(&str, Value)]) -> Value {
    Value::Object(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
}

fn fetch_req(queue_id: uuid::Uuid, worker_id: uuid::Uuid) -> FetchRequest {
    FetchRequest {
        queue_id,
        worker_id,
        required_fields: Vec::new(),
        extra_filter: None,
        heartbeat_timeout_override_secs: None,
    }
}

#[tokio::test]
async fn s1_happy_path() {
    let h = harness();
    let queue_id = new_queue(&h).await;
    let t1 = submit(
        &h,
        queue_id,
        SubmitOpts {
            args: args(&[("lr", Value::Number(0.1))]),
            ..Default::default()
        },
    )
    .await;
    let worker_id = new_worker(&h, queue_id, 3).await;

    let fetched = h
        .engine
        .fetch_next(fetch_req(queue_id, worker_id))
        .await
        .expect("fetch_next")
        .expect("a task should be claimable");
    assert_eq!(fetched.id, t1);

    h.engine
        .heartbeat(t1, worker_id)
        .await
        .expect("heartbeat");

    let reported = h
        .engine
        .report(
            t1,
            worker_id,
            Outcome::Success,
            args(&[("acc", Value::Number(0.9))]),
        )
        .await
        .expect("report");
    assert_eq!(reported.status, TaskStatus::Success);

    let worker = h.engine.get_worker(worker_id).await.expect("get_worker");
    assert_eq!(worker.retries, 0);
}

#[tokio::test]
async fn s2_retry_on_failure_then_success() {
    let h = harness();
    let queue_id = new_queue(&h).await;
    let worker_id = new_worker(&h, queue_id, 5).await;
    let task_id = submit(
        &h,
        queue_id,
        SubmitOpts {
            max_retries: 2,
            ..Default::default()
        },
    )
    .await;

    for _ in 0..2 {
        let fetched = h
            .engine
            .fetch_next(fetch_req(queue_id, worker_id))
            .await
            .expect("fetch_next")
            .expect("task should be pending");
        assert_eq!(fetched.id, task_id);
        let after = h
            .engine
            .report(task_id, worker_id, Outcome::Failed, Value::Null)
            .await
            .expect("report failed");
        assert_eq!(after.status, TaskStatus::Pending);
    }

    let fetched = h
        .engine
        .fetch_next(fetch_req(queue_id, worker_id))
        .await
        .expect("fetch_next")
        .expect("task should be pending again");
    assert_eq!(fetched.id, task_id);
    let done = h
        .engine
        .report(task_id, worker_id, Outcome::Success, Value::Null)
        .await
        .expect("report success");

    assert_eq!(done.status, TaskStatus::Success);
    assert_eq!(done.retries, 2);
    let worker = h.engine.get_worker(worker_id).await.expect("get_worker");
    assert_eq!(worker.retries, 0);
}

#[tokio::test]
async fn s3_worker_suspension() {
    let h = harness();
    let queue_id = new_queue(&h).await;
    let worker_id = new_worker(&h, queue_id, 3).await;

    for _ in 0..3 {
        let task_id = submit(
            &h,
            queue_id,
            SubmitOpts {
                max_retries: 0,
                ..Default::default()
            },
        )
        .await;
        let fetched = h
            .engine
            .fetch_next(fetch_req(queue_id, worker_id))
            .await
            .expect("fetch_next")
            .expect("task should be claimable");
        assert_eq!(fetched.id, task_id);
        h.engine
            .report(task_id, worker_id, Outcome::Failed, Value::Null)
            .await
            .expect("report failed");
    }

    let worker = h.engine.get_worker(worker_id).await.expect("get_worker");
    assert_eq!(worker.status, WorkerStatus::Suspended);

    let err = h
        .engine
        .fetch_next(fetch_req(queue_id, worker_id))
        .await
        .expect_err("a suspended worker must not be able to fetch");
    assert!(matches!(err, labtasker_core::EngineError::WorkerInactive(_)));
}

#[tokio::test]
async fn s4_heartbeat_crash_requeues_and_crashes_worker() {
    let h = harness();
    let queue_id = new_queue(&h).await;
    let worker_id = new_worker(&h, queue_id, 5).await;
    let task_id = submit(
        &h,
        queue_id,
        SubmitOpts {
            max_retries: 2,
            heartbeat_timeout_secs: 1,
            ..Default::default()
        },
    )
    .await;

    h.engine
        .fetch_next(fetch_req(queue_id, worker_id))
        .await
        .expect("fetch_next")
        .expect("task should be claimable");

    h.clock.advance(Duration::seconds(2));
    let report = h.engine.run_reaper_once(256).await.expect("reaper sweep");
    assert_eq!(report.requeued, 1);
    assert_eq!(report.terminated, 0);
    assert_eq!(report.workers_crashed, 1);

    let task = h.engine.get_task(task_id).await.expect("get_task");
    assert_eq!(task.status, TaskStatus::Pending);

    let worker = h.engine.get_worker(worker_id).await.expect("get_worker");
    assert_eq!(worker.status, WorkerStatus::Crashed);
}

#[tokio::test]
async fn s5_priority_then_fifo() {
    let h = harness();
    let queue_id = new_queue(&h).await;
    let worker_id = new_worker(&h, queue_id, 3).await;

    let a = submit(
        &h,
        queue_id,
        SubmitOpts {
            priority: 5,
            ..Default::default()
        },
    )
    .await;
    let b = submit(
        &h,
        queue_id,
        SubmitOpts {
            priority: 10,
            ..Default::default()
        },
    )
    .await;
    let c = submit(
        &h,
        queue_id,
        SubmitOpts {
            priority: 10,
            ..Default::default()
        },
    )
    .await;

    let first = h
        .engine
        .fetch_next(fetch_req(queue_id, worker_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.id, b);
    h.engine
        .report(first.id, worker_id, Outcome::Success, Value::Null)
        .await
        .unwrap();

    let second = h
        .engine
        .fetch_next(fetch_req(queue_id, worker_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.id, c);
    h.engine
        .report(second.id, worker_id, Outcome::Success, Value::Null)
        .await
        .unwrap();

    let third = h
        .engine
        .fetch_next(fetch_req(queue_id, worker_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(third.id, a);
}

#[tokio::test]
async fn s6_required_fields_filters_candidates() {
    let h = harness();
    let queue_id = new_queue(&h).await;
    let worker_id = new_worker(&h, queue_id, 3).await;

    let t1 = submit(
        &h,
        queue_id,
        SubmitOpts {
            args: args(&[("lr", Value::Number(0.1))]),
            ..Default::default()
        },
    )
    .await;
    let t2 = submit(
        &h,
        queue_id,
        SubmitOpts {
            args: args(&[("lr", Value::Number(0.1)), ("batch", Value::Number(32.0))]),
            ..Default::default()
        },
    )
    .await;

    let req = FetchRequest {
        queue_id,
        worker_id,
        required_fields: vec!["args.batch".to_string()],
        extra_filter: None,
        heartbeat_timeout_override_secs: None,
    };
    let fetched = h
        .engine
        .fetch_next(req)
        .await
        .unwrap()
        .expect("t2 should be claimable");
    assert_eq!(fetched.id, t2);

    let req2 = FetchRequest {
        queue_id,
        worker_id,
        required_fields: vec!["args.batch".to_string()],
        extra_filter: None,
        heartbeat_timeout_override_secs: None,
    };
    let next = h.engine.fetch_next(req2).await.unwrap();
    assert!(next.is_none(), "t1 lacks args.batch and must not match");

    let pending = h
        .engine
        .list_tasks(queue_id, Some(TaskStatus::Pending), None, None, 10)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, t1);
}
