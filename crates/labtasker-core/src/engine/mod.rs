//! The dispatch engine: state machine, fetch-next, heartbeat, report,
//! reaper, and admin operations.

mod admin;
mod dispatch;
mod heartbeat;
mod reaper;
mod report;

pub use admin::{
    RegisterWorkerRequest, SubmitTaskRequest, TaskUpdateRequest, WorkerUpdateRequest,
};
pub use dispatch::FetchRequest;
pub use report::Outcome;

use crate::bus::EventBus;
use crate::clock::SharedClock;
use crate::store::StoreAdapter;
use std::sync::Arc;

/// CAS retry budget for single-document read-modify-write sequences, and
/// the candidate-scan bound for fetch-next.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub max_cas_retries: usize,
    pub max_candidate_scan: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_cas_retries: 8,
            max_candidate_scan: 32,
        }
    }
}

pub struct Engine {
    pub(crate) store: Arc<dyn StoreAdapter>,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) clock: SharedClock,
    pub(crate) config: DispatchConfig,
}

impl Engine {
    pub fn new(store: Arc<dyn StoreAdapter>, bus: Arc<EventBus>, clock: SharedClock) -> Self {
        Self {
            store,
            bus,
            clock,
            config: DispatchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}
