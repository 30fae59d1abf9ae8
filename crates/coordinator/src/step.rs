//! Static step/saga-type definition table (spec §3 "Step Definition",
//! §4.7). This realizes the design note "dynamic dispatch by string keys →
//! `saga_type → step_definition_table` lookup plus a tagged variant over
//! event kinds": handler selection below is an exhaustive match over
//! `EventType`, not a registry lookup by string.

use std::time::Duration;

use sagaflow_core::PartnerId;
use sagaflow_events::EventType;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy)]
pub struct StepDefinition {
    pub name: &'static str,
    pub forward_event: EventType,
    pub expected_success_events: &'static [EventType],
    pub expected_failure_events: &'static [EventType],
    /// `None` means a no-op compensation (spec §3: "may be empty").
    pub compensating_event: Option<EventType>,
    /// Duplicate emission is acceptable for idempotent compensations
    /// (spec §4.7).
    pub compensation_idempotent: bool,
    pub timeout: Duration,
    /// Application-level retry attempts for emitting this step's trigger
    /// or compensating event, on top of the broker adapter's own transport
    /// retries (spec §4.2); exhausting these raises the Critical/alert
    /// path in spec §4.7's broker-failure semantics.
    pub retries: u32,
}

/// A saga type's static step sequence (spec §4.7: "a static, ordered list
/// of steps"). Implemented once per saga type; partner-onboarding's table
/// lives in `sagaflow-partner-onboarding`.
pub trait SagaTypeDefinition: Send + Sync {
    fn name(&self) -> &'static str;
    fn steps(&self) -> &'static [StepDefinition];

    fn step_index(&self, name: &str) -> Option<usize> {
        self.steps().iter().position(|s| s.name == name)
    }

    fn step(&self, index: usize) -> Option<StepDefinition> {
        self.steps().get(index).copied()
    }

    fn total_steps(&self) -> usize {
        self.steps().len()
    }

    /// Builds the payload for an outgoing trigger/compensation event from
    /// the saga's stored `initial_payload` (spec §4.9: "the handler fills
    /// in mandatory domain fields... from the saga's `initial_payload`").
    /// Defaults to passing `initial_payload` through unchanged; a saga type
    /// with a richer external schema overrides this.
    fn build_trigger_payload(&self, initial_payload: &JsonValue, partner_id: Option<PartnerId>) -> JsonValue {
        let _ = partner_id;
        initial_payload.clone()
    }

    /// `true` if `event_type` appears anywhere in this saga type's
    /// vocabulary (trigger, success, failure, or compensation for any
    /// step) — used to distinguish `UnexpectedTransition` (recognized but
    /// not expected right now) from a genuinely unknown event type.
    fn recognizes(&self, event_type: EventType) -> bool {
        self.steps().iter().any(|s| {
            s.forward_event == event_type
                || s.expected_success_events.contains(&event_type)
                || s.expected_failure_events.contains(&event_type)
                || s.compensating_event == Some(event_type)
        })
    }
}
