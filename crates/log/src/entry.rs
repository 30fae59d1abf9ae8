//! Saga Log entry shape (spec §4.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sagaflow_core::{PartnerId, SagaId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SagaStarted,
    StepStarted,
    StepCompleted,
    StepFailed,
    EventReceived,
    EventProcessed,
    SagaCompleted,
    SagaFailed,
    SagaCompensationStarted,
    SagaCompensationCompleted,
    TimeoutFired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub saga_id: Option<SagaId>,
    pub partner_id: Option<PartnerId>,
    pub level: Level,
    pub kind: EventKind,
    pub message: String,
    pub at: DateTime<Utc>,
}
