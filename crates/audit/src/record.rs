//! Audit record shape (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use sagaflow_core::{PartnerId, SagaId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    SagaStart,
    StepStart,
    StepSuccess,
    StepFailure,
    /// A step's deadline elapsed before its success/failure event arrived
    /// (spec §4.7: "Timeout: treat as business failure; record `timeout_fired`").
    Timeout,
    EventIn,
    EventOut,
    SagaEnd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub saga_id: SagaId,
    pub partner_id: Option<PartnerId>,
    /// Strictly increasing per saga; gaps are impossible (spec invariant 6).
    pub seq: u64,
    pub kind: AuditKind,
    pub step_name: Option<String>,
    pub event_type: Option<String>,
    pub payload: Option<JsonValue>,
    pub duration_ms: Option<u64>,
    pub at: DateTime<Utc>,
}
