use dashmap::DashMap;
use labtasker_core::{Engine, Subscription};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Live long-poll subscriptions, keyed by the handle returned from
    /// `subscribe-events`. A `Subscription` must stay alive (buffering
    /// events) between `next-event` calls, so it lives here rather than
    /// being dropped at the end of the subscribe request.
    pub subscriptions: Arc<DashMap<Uuid, Subscription>>,
}
