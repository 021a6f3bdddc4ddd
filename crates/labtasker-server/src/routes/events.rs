use super::queues::authenticate;
use crate::dto::{NextEventQuery, SubscribeEventsRequest, SubscribeEventsResponse};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use labtasker_core::{Event, SubscriptionFilter};
use std::time::Duration;
use uuid::Uuid;

pub async fn subscribe(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SubscribeEventsRequest>,
) -> Result<Json<SubscribeEventsResponse>, ApiError> {
    let queue = authenticate(&state, &queue_name, &headers).await?;
    let subscription = state
        .engine
        .bus()
        .subscribe(SubscriptionFilter {
            queue_id: Some(queue.id),
            entity: req.entity,
        })
        .await;
    let handle = subscription.handle();
    state.subscriptions.insert(handle, subscription);
    Ok(Json(SubscribeEventsResponse { handle }))
}

pub async fn next_event(
    State(state): State<AppState>,
    Path(handle): Path<Uuid>,
    Query(query): Query<NextEventQuery>,
) -> Result<Json<Event>, StatusCode> {
    let Some(subscription) = state.subscriptions.get(&handle) else {
        return Err(StatusCode::NOT_FOUND);
    };
    match subscription
        .next_event(Duration::from_millis(query.timeout_ms))
        .await
    {
        Some(event) => Ok(Json(event)),
        None => Err(StatusCode::NO_CONTENT),
    }
}
