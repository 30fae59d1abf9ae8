//! Append-only, queryable structured log of saga lifecycle events (spec §4.3).

mod entry;
mod saga_log;
mod sink;

pub use entry::{EventKind, Level, LogEntry};
pub use saga_log::SagaLog;
pub use sink::{FileSink, JsonLinesFileSink};
