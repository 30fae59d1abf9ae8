//! Reconstructed per-saga timeline view (spec §4.4).

use serde::{Deserialize, Serialize};

use sagaflow_core::SagaId;

use crate::record::AuditRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    pub saga_id: SagaId,
    pub saga_type: String,
    pub status: String,
    pub steps: Vec<AuditRecord>,
    pub events: Vec<AuditRecord>,
    pub total_duration_ms: Option<u64>,
}
