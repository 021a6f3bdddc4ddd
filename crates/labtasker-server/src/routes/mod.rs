mod events;
mod health;
mod queues;
mod tasks;
mod workers;

use crate::state::AppState;
use axum::routing::{delete, get, patch, post};
use axum::Router;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/_liveness", get(health::liveness))
        .route("/_readiness", get(health::readiness))
        .route("/api/v1/queues", post(queues::create_queue))
        .route("/api/v1/queues/:queue_name", get(queues::get_queue))
        .route("/api/v1/queues/:queue_name", delete(queues::delete_queue))
        .route("/api/v1/queues/:queue_name/tasks", post(tasks::submit_task))
        .route("/api/v1/queues/:queue_name/tasks", get(tasks::list_tasks))
        .route("/api/v1/queues/:queue_name/tasks", patch(tasks::bulk_update_tasks))
        .route(
            "/api/v1/queues/:queue_name/tasks/fetch",
            post(tasks::fetch_task),
        )
        .route(
            "/api/v1/queues/:queue_name/tasks/:task_id",
            get(tasks::get_task),
        )
        .route(
            "/api/v1/queues/:queue_name/tasks/:task_id",
            patch(tasks::update_task),
        )
        .route(
            "/api/v1/queues/:queue_name/tasks/:task_id/cancel",
            post(tasks::cancel_task),
        )
        .route(
            "/api/v1/queues/:queue_name/tasks/:task_id/heartbeat",
            post(tasks::heartbeat),
        )
        .route(
            "/api/v1/queues/:queue_name/tasks/:task_id/report",
            post(tasks::report_task),
        )
        .route(
            "/api/v1/queues/:queue_name/workers",
            post(workers::register_worker),
        )
        .route(
            "/api/v1/queues/:queue_name/workers",
            get(workers::list_workers),
        )
        .route(
            "/api/v1/queues/:queue_name/workers/:worker_id",
            patch(workers::update_worker),
        )
        .route(
            "/api/v1/queues/:queue_name/workers/:worker_id",
            delete(workers::delete_worker),
        )
        .route(
            "/api/v1/queues/:queue_name/events/subscribe",
            post(events::subscribe),
        )
        .route("/api/v1/events/:handle/next", get(events::next_event))
        .with_state(state)
}
