//! Saga instance shape (spec §3).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use sagaflow_core::{AggregateRoot, CorrelationId, EventId, PartnerId, SagaId};

/// Spec §3 names both `InProgress(k)` (in the state machine prose, §4.7)
/// and `AwaitingStep(k)` (in the status enum). Resolved per DESIGN.md:
/// they describe the same runtime state — "step k has been triggered, its
/// outcome is pending" — so the status enum carries a single variant,
/// `AwaitingStep(k)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaStatus {
    Initiated,
    AwaitingStep(u32),
    Compensating,
    Completed,
    Failed,
    Compensated,
}

/// Coarse status family, ignoring the step number, for indexing/filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusKind {
    Initiated,
    AwaitingStep,
    Compensating,
    Completed,
    Failed,
    Compensated,
}

impl From<SagaStatus> for StatusKind {
    fn from(status: SagaStatus) -> Self {
        match status {
            SagaStatus::Initiated => StatusKind::Initiated,
            SagaStatus::AwaitingStep(_) => StatusKind::AwaitingStep,
            SagaStatus::Compensating => StatusKind::Compensating,
            SagaStatus::Completed => StatusKind::Completed,
            SagaStatus::Failed => StatusKind::Failed,
            SagaStatus::Compensated => StatusKind::Compensated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Success,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedStep {
    pub step: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedStep {
    pub step: String,
    pub error_kind: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingStep {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaInstance {
    pub saga_id: SagaId,
    pub saga_type: String,
    pub correlation_id: CorrelationId,
    pub partner_id: Option<PartnerId>,
    pub status: SagaStatus,
    pub completed_steps: Vec<CompletedStep>,
    pub failed_steps: Vec<FailedStep>,
    /// Names of steps whose compensating event has already been emitted,
    /// walked in reverse completion order during `Compensating` (spec §4.7).
    pub compensated_steps: Vec<String>,
    pub pending_step: Option<PendingStep>,
    pub initial_payload: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
    /// Bounded idempotency window (spec §4.7: "last N event_ids, default
    /// 1000"); a `VecDeque` gives O(1) eviction of the oldest entry.
    /// Serialized so a snapshot write followed by rehydration reproduces a
    /// behaviorally equivalent saga (spec §8) — a duplicate event redelivered
    /// after a restart must still be recognized as already processed.
    processed_events: VecDeque<EventId>,
    processed_events_capacity: usize,
}

impl SagaInstance {
    pub fn new(
        saga_id: SagaId,
        saga_type: impl Into<String>,
        correlation_id: CorrelationId,
        partner_id: Option<PartnerId>,
        initial_payload: JsonValue,
        idempotency_window: usize,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            saga_id,
            saga_type: saga_type.into(),
            correlation_id,
            partner_id,
            status: SagaStatus::Initiated,
            completed_steps: Vec::new(),
            failed_steps: Vec::new(),
            compensated_steps: Vec::new(),
            pending_step: None,
            initial_payload,
            created_at: now,
            updated_at: now,
            version: 0,
            processed_events: VecDeque::new(),
            processed_events_capacity: idempotency_window.max(1),
        }
    }

    pub fn has_processed(&self, event_id: EventId) -> bool {
        self.processed_events.contains(&event_id)
    }

    pub fn mark_processed(&mut self, event_id: EventId) {
        if self.has_processed(event_id) {
            return;
        }
        self.processed_events.push_back(event_id);
        while self.processed_events.len() > self.processed_events_capacity {
            self.processed_events.pop_front();
        }
    }

    pub fn status_kind(&self) -> StatusKind {
        self.status.into()
    }
}

impl AggregateRoot for SagaInstance {
    type Id = SagaId;

    fn id(&self) -> &Self::Id {
        &self.saga_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
