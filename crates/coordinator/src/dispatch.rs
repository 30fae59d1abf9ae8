//! Pure event-to-transition decision logic (spec §4.7, steps 3-4).
//!
//! Nothing here touches the store, broker, audit trail, or metrics — it
//! only classifies "given this saga's current step and this incoming
//! event, what should happen." `coordinator.rs` is the only caller and
//! owns every side effect the decision implies.

use chrono::{DateTime, Utc};

use sagaflow_events::{EventType, Envelope};
use sagaflow_store::{SagaInstance, SagaStatus};

use crate::step::SagaTypeDefinition;

#[derive(Debug, Clone)]
pub enum Decision {
    /// `event_type` matches the current step's expected success set.
    Advance { step_index: usize, completed_at: DateTime<Utc> },
    /// `event_type` matches the current step's expected failure set.
    EnterCompensation { failed_step_index: usize, message: String },
    /// Recognized somewhere in this saga type's vocabulary, but not what
    /// the current step is waiting for (spec §7 `UnexpectedTransition`).
    Unexpected,
    /// Not part of this saga type's vocabulary at all.
    Unrecognized,
    /// The saga isn't awaiting a step right now (terminal, or
    /// compensating) — the event is tolerated and dropped.
    Ignored,
}

pub fn decide(def: &dyn SagaTypeDefinition, saga: &SagaInstance, envelope: &Envelope) -> Decision {
    let SagaStatus::AwaitingStep(step_number) = saga.status else {
        return Decision::Ignored;
    };
    let event_type: EventType = envelope.event_type();
    let step_index = step_number.saturating_sub(1) as usize;
    let Some(step) = def.step(step_index) else {
        return Decision::Ignored;
    };

    if step.expected_success_events.contains(&event_type) {
        Decision::Advance { step_index, completed_at: envelope.occurred_at() }
    } else if step.expected_failure_events.contains(&event_type) {
        Decision::EnterCompensation {
            failed_step_index: step_index,
            message: format!("step '{}' received failure event {event_type}", step.name),
        }
    } else if def.recognizes(event_type) {
        Decision::Unexpected
    } else {
        Decision::Unrecognized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    use sagaflow_core::{CorrelationId, PartnerId, SagaId};
    use sagaflow_events::EventType;

    struct TestSagaType;

    const STEPS: &[crate::step::StepDefinition] = &[
        crate::step::StepDefinition {
            name: "partner_registration",
            forward_event: EventType::PartnerOnboardingInitiated,
            expected_success_events: &[EventType::PartnerRegistrationCompleted],
            expected_failure_events: &[EventType::PartnerRegistrationFailed],
            compensating_event: None,
            compensation_idempotent: true,
            timeout: Duration::from_secs(30),
            retries: 3,
        },
        crate::step::StepDefinition {
            name: "contract_creation",
            forward_event: EventType::ContractCreationRequested,
            expected_success_events: &[EventType::ContractCreated],
            expected_failure_events: &[EventType::ContractCreationFailed],
            compensating_event: Some(EventType::ContractCancelled),
            compensation_idempotent: true,
            timeout: Duration::from_secs(30),
            retries: 3,
        },
    ];

    impl SagaTypeDefinition for TestSagaType {
        fn name(&self) -> &'static str {
            "partner-onboarding"
        }
        fn steps(&self) -> &'static [crate::step::StepDefinition] {
            STEPS
        }
    }

    fn saga_awaiting(step_number: u32) -> SagaInstance {
        let mut instance = SagaInstance::new(
            SagaId::new(),
            "partner-onboarding",
            CorrelationId::new("corr-1"),
            Some(PartnerId::new()),
            json!({}),
            1000,
            Utc::now(),
        );
        instance.status = SagaStatus::AwaitingStep(step_number);
        instance
    }

    fn envelope(event_type: EventType) -> Envelope {
        Envelope::initiating(event_type, SagaId::new(), CorrelationId::new("corr-1"), "test", json!({}), Utc::now())
    }

    #[test]
    fn matching_success_event_advances() {
        let saga = saga_awaiting(2);
        let decision = decide(&TestSagaType, &saga, &envelope(EventType::ContractCreated));
        assert!(matches!(decision, Decision::Advance { step_index: 1, .. }));
    }

    #[test]
    fn matching_failure_event_enters_compensation() {
        let saga = saga_awaiting(2);
        let decision = decide(&TestSagaType, &saga, &envelope(EventType::ContractCreationFailed));
        assert!(matches!(decision, Decision::EnterCompensation { failed_step_index: 1, .. }));
    }

    #[test]
    fn recognized_but_wrong_step_event_is_unexpected() {
        let saga = saga_awaiting(1);
        let decision = decide(&TestSagaType, &saga, &envelope(EventType::ContractCreated));
        assert!(matches!(decision, Decision::Unexpected));
    }

    #[test]
    fn unrecognized_event_is_flagged() {
        let saga = saga_awaiting(1);
        let decision = decide(&TestSagaType, &saga, &envelope(EventType::DocumentsVerified));
        // DocumentsVerified isn't in this truncated test table at all.
        assert!(matches!(decision, Decision::Unrecognized));
    }

    #[test]
    fn non_awaiting_status_ignores_every_event() {
        let mut saga = saga_awaiting(1);
        saga.status = SagaStatus::Completed;
        let decision = decide(&TestSagaType, &saga, &envelope(EventType::PartnerRegistrationCompleted));
        assert!(matches!(decision, Decision::Ignored));
    }
}
