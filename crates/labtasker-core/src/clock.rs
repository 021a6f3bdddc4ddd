//! Injectable monotonic(-ish) time source.
//!
//! The engine never calls `Utc::now()` directly; everything goes through a
//! `Clock` so tests can advance time deterministically (heartbeat expiry,
//! reaper sweeps) without real sleeps.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually-advanced clock for tests: advances past `heartbeat_timeout`
/// or a task's absolute timeout without a real sleep.
#[derive(Debug, Clone)]
pub struct TestClock {
    millis_since_epoch: Arc<AtomicI64>,
}

impl TestClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis_since_epoch: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    pub fn advance(&self, duration: chrono::Duration) {
        self.millis_since_epoch
            .fetch_add(duration.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis_since_epoch.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(millis).expect("valid timestamp")
    }
}

pub type SharedClock = Arc<dyn Clock>;
