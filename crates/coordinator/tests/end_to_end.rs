//! End-to-end coordinator scenarios against the in-memory broker/store/audit
//! stack, exercising the full `start -> dispatch -> advance/compensate`
//! surface without a real transport.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use sagaflow_audit::AuditTrail;
use sagaflow_broker::{Ack, EventBus, InMemoryDeadLetterSink, InMemoryEventBus};
use sagaflow_core::{CoordinatorConfig, CorrelationId};
use sagaflow_coordinator::{Coordinator, StepDefinition};
use sagaflow_events::{Envelope, EventType};
use sagaflow_log::SagaLog;
use sagaflow_metrics::MetricsAggregator;
use sagaflow_store::{SagaStateStore, SagaStatus};

struct TwoStepSaga;

const STEPS: &[StepDefinition] = &[
    StepDefinition {
        name: "partner_registration",
        forward_event: EventType::PartnerOnboardingInitiated,
        expected_success_events: &[EventType::PartnerRegistrationCompleted],
        expected_failure_events: &[EventType::PartnerRegistrationFailed],
        compensating_event: Some(EventType::PartnerRegistrationReverted),
        compensation_idempotent: true,
        timeout: Duration::from_millis(50),
        retries: 3,
    },
    StepDefinition {
        name: "contract_creation",
        forward_event: EventType::ContractCreationRequested,
        expected_success_events: &[EventType::ContractCreated],
        expected_failure_events: &[EventType::ContractCreationFailed],
        compensating_event: Some(EventType::ContractCancelled),
        compensation_idempotent: true,
        timeout: Duration::from_millis(50),
        retries: 3,
    },
];

impl sagaflow_coordinator::SagaTypeDefinition for TwoStepSaga {
    fn name(&self) -> &'static str {
        "two-step-onboarding"
    }
    fn steps(&self) -> &'static [StepDefinition] {
        STEPS
    }
}

fn build_coordinator() -> (Arc<Coordinator>, Arc<InMemoryEventBus>) {
    let dlq = Arc::new(InMemoryDeadLetterSink::new());
    let bus = Arc::new(InMemoryEventBus::new(64, dlq));
    let store = Arc::new(SagaStateStore::new());
    let audit = Arc::new(AuditTrail::new());
    let log = SagaLog::new(10_000);
    let metrics = Arc::new(MetricsAggregator::new(Default::default()));
    let config = CoordinatorConfig::default();

    let coordinator = Coordinator::new(
        Arc::clone(&store),
        Arc::clone(&bus) as Arc<dyn EventBus>,
        audit,
        log,
        metrics,
        config,
    );
    coordinator.register_saga_type(Arc::new(TwoStepSaga));
    coordinator.subscribe_all_topics();

    (coordinator, bus)
}

fn wait_until(mut predicate: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn successful_run_advances_through_every_step_to_completion() {
    let (coordinator, _bus) = build_coordinator();
    let saga_id = coordinator
        .start("two-step-onboarding", json!({"partner": "Acme"}), None, None)
        .unwrap();

    assert!(wait_until(|| matches!(
        coordinator.status(saga_id).unwrap().status,
        SagaStatus::AwaitingStep(1)
    )));

    let saga = coordinator.status(saga_id).unwrap();
    let success = Envelope::initiating(
        EventType::PartnerRegistrationCompleted,
        saga_id,
        saga.correlation_id.clone(),
        "partner-service",
        json!({}),
        Utc::now(),
    );
    assert_eq!(coordinator.dispatch_envelope(success), Ack::Ack);

    assert!(wait_until(|| matches!(
        coordinator.status(saga_id).unwrap().status,
        SagaStatus::AwaitingStep(2)
    )));

    let saga = coordinator.status(saga_id).unwrap();
    let success2 = Envelope::initiating(
        EventType::ContractCreated,
        saga_id,
        saga.correlation_id.clone(),
        "contract-service",
        json!({}),
        Utc::now(),
    );
    assert_eq!(coordinator.dispatch_envelope(success2), Ack::Ack);

    assert!(wait_until(|| coordinator.status(saga_id).unwrap().status == SagaStatus::Completed));

    let timeline = coordinator.timeline(saga_id).unwrap();
    assert_eq!(timeline.status, "Completed");
    assert!(timeline.total_duration_ms.is_some());
}

#[test]
fn failure_event_drives_reverse_compensation() {
    let (coordinator, _bus) = build_coordinator();
    let saga_id = coordinator
        .start("two-step-onboarding", json!({}), None, None)
        .unwrap();

    assert!(wait_until(|| matches!(
        coordinator.status(saga_id).unwrap().status,
        SagaStatus::AwaitingStep(1)
    )));
    let saga = coordinator.status(saga_id).unwrap();
    let success = Envelope::initiating(
        EventType::PartnerRegistrationCompleted,
        saga_id,
        saga.correlation_id.clone(),
        "partner-service",
        json!({}),
        Utc::now(),
    );
    coordinator.dispatch_envelope(success);
    assert!(wait_until(|| matches!(
        coordinator.status(saga_id).unwrap().status,
        SagaStatus::AwaitingStep(2)
    )));

    let saga = coordinator.status(saga_id).unwrap();
    let failure = Envelope::initiating(
        EventType::ContractCreationFailed,
        saga_id,
        saga.correlation_id.clone(),
        "contract-service",
        json!({"reason": "credit check failed"}),
        Utc::now(),
    );
    coordinator.dispatch_envelope(failure);

    assert!(wait_until(|| coordinator.status(saga_id).unwrap().status == SagaStatus::Compensated));

    let saga = coordinator.status(saga_id).unwrap();
    assert_eq!(saga.compensated_steps, vec!["partner_registration".to_string()]);
}

#[test]
fn duplicate_event_is_applied_exactly_once() {
    let (coordinator, _bus) = build_coordinator();
    let saga_id = coordinator
        .start("two-step-onboarding", json!({}), None, None)
        .unwrap();
    assert!(wait_until(|| matches!(
        coordinator.status(saga_id).unwrap().status,
        SagaStatus::AwaitingStep(1)
    )));

    let saga = coordinator.status(saga_id).unwrap();
    let success = Envelope::initiating(
        EventType::PartnerRegistrationCompleted,
        saga_id,
        saga.correlation_id.clone(),
        "partner-service",
        json!({}),
        Utc::now(),
    );
    coordinator.dispatch_envelope(success.clone());
    assert!(wait_until(|| matches!(
        coordinator.status(saga_id).unwrap().status,
        SagaStatus::AwaitingStep(2)
    )));

    // Redeliver the same envelope: must not advance the saga a second time.
    coordinator.dispatch_envelope(success);
    std::thread::sleep(Duration::from_millis(50));

    let saga = coordinator.status(saga_id).unwrap();
    assert_eq!(saga.completed_steps.len(), 1);
    assert!(matches!(saga.status, SagaStatus::AwaitingStep(2)));
}

#[test]
fn step_timeout_triggers_compensation_without_a_failure_event() {
    let (coordinator, _bus) = build_coordinator();
    let saga_id = coordinator
        .start("two-step-onboarding", json!({}), None, None)
        .unwrap();

    // first step's timeout is 50ms; never send a success/failure event.
    assert!(wait_until(|| coordinator.status(saga_id).unwrap().status == SagaStatus::Compensated));
}

#[test]
fn manual_compensate_walks_completed_steps_in_reverse() {
    let (coordinator, _bus) = build_coordinator();
    let saga_id = coordinator
        .start("two-step-onboarding", json!({}), None, None)
        .unwrap();
    assert!(wait_until(|| matches!(
        coordinator.status(saga_id).unwrap().status,
        SagaStatus::AwaitingStep(1)
    )));

    let saga = coordinator.status(saga_id).unwrap();
    let success = Envelope::initiating(
        EventType::PartnerRegistrationCompleted,
        saga_id,
        saga.correlation_id.clone(),
        "partner-service",
        json!({}),
        Utc::now(),
    );
    coordinator.dispatch_envelope(success);
    assert!(wait_until(|| matches!(
        coordinator.status(saga_id).unwrap().status,
        SagaStatus::AwaitingStep(2)
    )));

    coordinator.compensate(saga_id, "operator requested rollback").unwrap();

    assert!(wait_until(|| coordinator.status(saga_id).unwrap().status == SagaStatus::Compensated));
    let saga = coordinator.status(saga_id).unwrap();
    assert_eq!(saga.compensated_steps, vec!["partner_registration".to_string()]);
}

#[test]
fn manual_compensate_on_an_already_compensating_saga_is_a_no_op() {
    let (coordinator, _bus) = build_coordinator();
    let saga_id = coordinator
        .start("two-step-onboarding", json!({}), None, None)
        .unwrap();
    assert!(wait_until(|| matches!(
        coordinator.status(saga_id).unwrap().status,
        SagaStatus::AwaitingStep(1)
    )));

    coordinator.compensate(saga_id, "first call").unwrap();
    assert!(wait_until(|| coordinator.status(saga_id).unwrap().status == SagaStatus::Compensating
        || coordinator.status(saga_id).unwrap().status == SagaStatus::Compensated));

    coordinator.compensate(saga_id, "second call").unwrap();

    assert!(wait_until(|| coordinator.status(saga_id).unwrap().status == SagaStatus::Compensated));
    let saga = coordinator.status(saga_id).unwrap();
    assert_eq!(
        saga.failed_steps.iter().filter(|f| f.error_kind == "ManualCompensate").count(),
        1,
        "a second compensate call on an already-Compensating saga must not append another failure entry"
    );
}

#[test]
fn unrecognized_event_is_dead_lettered_and_leaves_saga_untouched() {
    let (coordinator, _bus) = build_coordinator();
    let saga_id = coordinator
        .start("two-step-onboarding", json!({}), None, None)
        .unwrap();
    assert!(wait_until(|| matches!(
        coordinator.status(saga_id).unwrap().status,
        SagaStatus::AwaitingStep(1)
    )));

    let saga = coordinator.status(saga_id).unwrap();
    let stray = Envelope::initiating(
        EventType::DocumentsVerified,
        saga_id,
        saga.correlation_id.clone(),
        "document-service",
        json!({}),
        Utc::now(),
    );
    assert_eq!(coordinator.dispatch_envelope(stray), Ack::DeadLetter);

    let saga = coordinator.status(saga_id).unwrap();
    assert!(matches!(saga.status, SagaStatus::AwaitingStep(1)));
}

#[test]
fn correlation_id_alone_resolves_to_the_right_saga() {
    let (coordinator, _bus) = build_coordinator();
    let correlation_id = CorrelationId::new("external-corr-1");
    let saga_id = coordinator
        .start("two-step-onboarding", json!({}), Some(correlation_id.clone()), None)
        .unwrap();
    assert!(wait_until(|| matches!(
        coordinator.status(saga_id).unwrap().status,
        SagaStatus::AwaitingStep(1)
    )));

    // Build the success envelope without a saga_id, as an external service
    // that only knows the correlation id would.
    let without_saga_id = Envelope::new(
        sagaflow_core::EventId::new(),
        EventType::PartnerRegistrationCompleted,
        None,
        correlation_id,
        None,
        Utc::now(),
        "partner-service",
        json!({}),
    );
    coordinator.dispatch_envelope(without_saga_id);

    assert!(wait_until(|| matches!(
        coordinator.status(saga_id).unwrap().status,
        SagaStatus::AwaitingStep(2)
    )));
}
