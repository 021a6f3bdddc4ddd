//! Error taxonomy, split into two enums: `StoreError` is what an abstract
//! `StoreAdapter` can fail with, `EngineError` is what the engine boundary
//! surfaces to callers, wrapping `StoreError` plus the domain-level
//! failure kinds.

use thiserror::Error;
use uuid::Uuid;

/// Errors an abstract document store can report. Deliberately small: just
/// enough surface for the engine to distinguish "retry locally", "surface
/// to caller", and "back off".
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found")]
    NotFound,
    #[error("compare-and-update failed: etag mismatch")]
    CasConflict,
    #[error("unique constraint violated")]
    AlreadyExists,
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("store temporarily unavailable: {0}")]
    Transient(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("worker {0} is not active")]
    WorkerInactive(Uuid),
    #[error("task {task_id} is not owned by worker {worker_id}")]
    NotOwned { task_id: Uuid, worker_id: Uuid },
    #[error("conflict: too many concurrent compare-and-update retries")]
    Conflict,
    #[error("store unavailable, retry later: {0}")]
    Transient(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => EngineError::NotFound("document not found".to_string()),
            StoreError::CasConflict => EngineError::Conflict,
            StoreError::AlreadyExists => EngineError::AlreadyExists("unique constraint".to_string()),
            StoreError::Backend(msg) => EngineError::Transient(msg),
            StoreError::Transient(msg) => EngineError::Transient(msg),
        }
    }
}

impl EngineError {
    /// Stable category name, consumed by the transport layer to map onto
    /// HTTP status codes without the transport crate needing to match on
    /// every variant itself.
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::AlreadyExists(_) => "ALREADY_EXISTS",
            EngineError::InvalidArgument(_) => "INVALID_ARGUMENT",
            EngineError::Unauthorized => "UNAUTHORIZED",
            EngineError::WorkerInactive(_) => "WORKER_INACTIVE",
            EngineError::NotOwned { .. } => "NOT_OWNED",
            EngineError::Conflict => "CONFLICT",
            EngineError::Transient(_) => "TRANSIENT",
        }
    }
}

/// Per-item outcome for batch operations: one failing document never
/// aborts the rest of the batch.
#[derive(Debug)]
pub enum ItemOutcome<T> {
    Applied(T),
    NotFound,
    Conflict,
    Invalid(String),
}

#[derive(Debug, Default)]
pub struct BatchResult<T> {
    pub outcomes: Vec<(Uuid, ItemOutcome<T>)>,
}

impl<T> BatchResult<T> {
    pub fn new() -> Self {
        Self { outcomes: Vec::new() }
    }

    pub fn push(&mut self, id: Uuid, outcome: ItemOutcome<T>) {
        self.outcomes.push((id, outcome));
    }

    pub fn applied_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, ItemOutcome::Applied(_)))
            .count()
    }
}
