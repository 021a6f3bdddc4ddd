//! Labtasker's dispatch and lifecycle engine: store-driver agnostic,
//! transport agnostic. A concrete `StoreAdapter` (`labtasker-store-memory`,
//! `labtasker-store-postgres`) and a transport (`labtasker-server`) are
//! separate crates that depend on this one.

pub mod bus;
pub mod clock;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod store;
pub mod types;
pub mod value;

pub use bus::{EventBus, Subscription, SubscriptionFilter};
pub use clock::{Clock, SharedClock, SystemClock};
pub use engine::{
    DispatchConfig, Engine, FetchRequest, Outcome, RegisterWorkerRequest, SubmitTaskRequest,
    TaskUpdateRequest, WorkerUpdateRequest,
};
pub use error::{BatchResult, EngineError, ItemOutcome, StoreError};
pub use matcher::{Filter, UpdateDoc};
pub use store::{Cursor, StoreAdapter};
pub use types::{EntityKind, Event, Queue, Task, TaskStatus, Worker, WorkerStatus};
pub use value::Value;
