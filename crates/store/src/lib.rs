//! In-memory authoritative saga state store with optimistic concurrency,
//! secondary indexes, and optional snapshot persistence (spec §4.6).

mod instance;
mod snapshot;
mod store;

pub use instance::{CompletedStep, FailedStep, PendingStep, SagaInstance, SagaStatus, StatusKind, StepOutcome};
pub use snapshot::{FileSnapshotSink, SnapshotSink};
pub use store::{ListFilters, SagaStateStore};
