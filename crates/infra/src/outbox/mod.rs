//! Durable outbox for goods receipt side effects.
//!
//! A receipt transition commits first, then enqueues one task per inventory
//! movement it implies. Tasks run immediately and, on failure, are retried
//! with backoff by the dispatcher (synchronously via `drain_due` or from an
//! `OutboxWorker` thread). A task that runs out of attempts is dead-lettered
//! and raises an `OutboxAlert`. Movement tasks apply keyed movements, so a
//! retry after a partial success never double-applies.

pub mod alerts;
pub mod dispatcher;
pub mod store;
pub mod types;
pub mod worker;

pub use alerts::{AlertSink, InMemoryAlertSink, OutboxAlert};
pub use dispatcher::{DrainReport, OutboxDispatcher, TaskHandler, classify};
pub use store::{InMemoryOutboxStore, OutboxStats, OutboxStore, OutboxStoreError};
pub use types::{
    AttemptRecord, BackoffStrategy, DeadLetterEntry, MovementTaskPayload, OutboxStatus, OutboxTask,
    OutboxTaskId, OutboxTaskKind, RetryPolicy, TaskResult,
};
pub use worker::{OutboxWorker, OutboxWorkerConfig, OutboxWorkerHandle, WorkerStats};
