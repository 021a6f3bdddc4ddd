//! In-process event bus: bounded per-subscriber buffers with lossy overflow
//! plus an `Overflow` sentinel, and a long-poll `next_event` subscribers can
//! block on. Publishers are state transitions; subscribers are long-poll
//! listeners, each with its own buffer guarded by a `Mutex` and woken via
//! `Notify` rather than routed through a channel, since a subscriber's
//! buffer needs to be inspectable (for overflow eviction) as well as
//! poppable.

use crate::types::{EntityKind, Event};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::time::Duration;
use uuid::Uuid;

pub const DEFAULT_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub queue_id: Option<Uuid>,
    pub entity: Option<EntityKind>,
}

impl SubscriptionFilter {
    fn accepts(&self, event: &Event) -> bool {
        if let Some(queue_id) = self.queue_id {
            if event.queue_id() != Some(queue_id) {
                return false;
            }
        }
        if let Some(entity) = self.entity {
            match event {
                Event::Transition { entity: e, .. } if *e == entity => {}
                Event::Overflow { .. } => {}
                _ => return false,
            }
        }
        true
    }
}

struct SubscriberState {
    buffer: Mutex<VecDeque<Event>>,
    notify: Notify,
    filter: SubscriptionFilter,
    capacity: usize,
}

pub struct Subscription {
    handle: Uuid,
    state: Arc<SubscriberState>,
}

impl Subscription {
    pub fn handle(&self) -> Uuid {
        self.handle
    }

    /// Blocks until an event arrives or `timeout` expires.
    pub async fn next_event(&self, timeout: Duration) -> Option<Event> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(event) = self.state.buffer.lock().await.pop_front() {
                return Some(event);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            tokio::select! {
                _ = self.state.notify.notified() => {}
                _ = tokio::time::sleep(remaining) => return None,
            }
        }
    }
}

pub struct EventBus {
    next_event_id: AtomicU64,
    subscribers: Arc<Mutex<Vec<Arc<SubscriberState>>>>,
    default_capacity: usize,
}

impl EventBus {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            next_event_id: AtomicU64::new(1),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            default_capacity,
        }
    }

    pub async fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        let state = Arc::new(SubscriberState {
            buffer: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            filter,
            capacity: self.default_capacity,
        });
        self.subscribers.lock().await.push(state.clone());
        Subscription {
            handle: Uuid::now_v7(),
            state,
        }
    }

    fn next_id(&self) -> u64 {
        self.next_event_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Non-blocking publish. Each matching subscriber gets
    /// its own copy; on overflow the oldest buffered event is dropped and
    /// replaced conceptually by an `Overflow` sentinel so the consumer knows
    /// it missed data.
    pub async fn publish(&self, event: Event) {
        let subscribers = self.subscribers.lock().await;
        for sub in subscribers.iter() {
            if !sub.filter.accepts(&event) {
                continue;
            }
            let mut buffer = sub.buffer.lock().await;
            if buffer.len() >= sub.capacity {
                buffer.pop_front();
                let id = self.next_id();
                buffer.push_back(Event::Overflow {
                    id,
                    timestamp: chrono::Utc::now(),
                });
                metrics::counter!("labtasker_event_bus_overflow_total").increment(1);
            }
            buffer.push_back(event.clone());
            sub.notify.notify_waiters();
        }
    }

    pub fn alloc_event_id(&self) -> u64 {
        self.next_id()
    }
}
