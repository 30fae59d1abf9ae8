//! Drives the real 5-step partner-onboarding table through the coordinator,
//! rather than a truncated test fixture, to exercise the full step
//! sequence and the C9 payload enrichment that is specific to this saga
//! type.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use sagaflow_audit::AuditTrail;
use sagaflow_broker::{Ack, EventBus, Handler, InMemoryDeadLetterSink, InMemoryEventBus};
use sagaflow_core::{CoordinatorConfig, PartnerId};
use sagaflow_coordinator::Coordinator;
use sagaflow_events::{Envelope, EventType, Topic};
use sagaflow_log::SagaLog;
use sagaflow_metrics::MetricsAggregator;
use sagaflow_partner_onboarding::PartnerOnboardingSaga;
use sagaflow_store::{SagaStateStore, SagaStatus};

struct Recorder {
    seen: Mutex<Vec<Envelope>>,
}

impl Handler for Recorder {
    fn handle(&self, envelope: Envelope) -> Ack {
        self.seen.lock().unwrap().push(envelope);
        Ack::Ack
    }
}

fn build() -> (Arc<Coordinator>, Arc<InMemoryEventBus>, Arc<Recorder>) {
    let dlq = Arc::new(InMemoryDeadLetterSink::new());
    let bus = Arc::new(InMemoryEventBus::new(64, dlq));
    let store = Arc::new(SagaStateStore::new());
    let audit = Arc::new(AuditTrail::new());
    let log = SagaLog::new(10_000);
    let metrics = Arc::new(MetricsAggregator::new(Default::default()));

    let coordinator = Coordinator::new(
        Arc::clone(&store),
        Arc::clone(&bus) as Arc<dyn EventBus>,
        audit,
        log,
        metrics,
        CoordinatorConfig::default(),
    );
    coordinator.register_saga_type(Arc::new(PartnerOnboardingSaga));
    coordinator.subscribe_all_topics();

    let recorder = Arc::new(Recorder { seen: Mutex::new(Vec::new()) });
    for topic in [Topic::PartnerEvents, Topic::ContractEvents, Topic::DocumentEvents, Topic::CampaignEvents, Topic::RecruitmentEvents, Topic::SagaEvents] {
        bus.subscribe(topic, "test-recorder", Arc::clone(&recorder) as Arc<dyn Handler>);
    }

    (coordinator, bus, recorder)
}

fn wait_until(mut predicate: impl FnMut() -> bool) -> bool {
    for _ in 0..300 {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

fn advance(coordinator: &Coordinator, saga_id: sagaflow_core::SagaId, event_type: EventType, source: &str) {
    let saga = coordinator.status(saga_id).unwrap();
    let envelope = Envelope::initiating(event_type, saga_id, saga.correlation_id, source, json!({}), Utc::now());
    coordinator.dispatch_envelope(envelope);
}

#[test]
fn full_five_step_onboarding_reaches_completion() {
    let (coordinator, _bus, _recorder) = build();
    let partner_id = PartnerId::new();
    let saga_id = coordinator
        .start("partner-onboarding", json!({"legal_name": "Acme Co"}), None, Some(partner_id))
        .unwrap();

    let responses = [
        EventType::PartnerRegistrationCompleted,
        EventType::ContractCreated,
        EventType::DocumentsVerified,
        EventType::CampaignsEnabled,
        EventType::RecruitmentSetupCompleted,
    ];

    for (i, event_type) in responses.into_iter().enumerate() {
        assert!(wait_until(|| matches!(
            coordinator.status(saga_id).unwrap().status,
            SagaStatus::AwaitingStep(k) if k as usize == i + 1
        )));
        advance(&coordinator, saga_id, event_type, "demo-service");
    }

    assert!(wait_until(|| coordinator.status(saga_id).unwrap().status == SagaStatus::Completed));
    let saga = coordinator.status(saga_id).unwrap();
    assert_eq!(saga.completed_steps.len(), 5);
    assert_eq!(saga.partner_id, Some(partner_id));
}

#[test]
fn failure_at_document_verification_reverts_the_two_prior_steps() {
    let (coordinator, _bus, _recorder) = build();
    let partner_id = PartnerId::new();
    let saga_id = coordinator
        .start("partner-onboarding", json!({"legal_name": "Acme Co"}), None, Some(partner_id))
        .unwrap();

    assert!(wait_until(|| matches!(coordinator.status(saga_id).unwrap().status, SagaStatus::AwaitingStep(1))));
    advance(&coordinator, saga_id, EventType::PartnerRegistrationCompleted, "partner-service");
    assert!(wait_until(|| matches!(coordinator.status(saga_id).unwrap().status, SagaStatus::AwaitingStep(2))));
    advance(&coordinator, saga_id, EventType::ContractCreated, "contract-service");
    assert!(wait_until(|| matches!(coordinator.status(saga_id).unwrap().status, SagaStatus::AwaitingStep(3))));
    advance(&coordinator, saga_id, EventType::DocumentVerificationFailed, "document-service");

    assert!(wait_until(|| coordinator.status(saga_id).unwrap().status == SagaStatus::Compensated));
    let saga = coordinator.status(saga_id).unwrap();
    assert_eq!(saga.compensated_steps, vec!["contract_creation".to_string(), "partner_registration".to_string()]);

    let timeline = coordinator.timeline(saga_id).unwrap();
    assert!(timeline.steps.iter().any(|r| matches!(r.kind, sagaflow_audit::AuditKind::StepFailure)));
}

#[test]
fn trigger_events_carry_the_enriched_partner_data_payload() {
    let (coordinator, _bus, recorder) = build();
    let partner_id = PartnerId::new();
    let saga_id = coordinator
        .start("partner-onboarding", json!({"legal_name": "Acme Co"}), None, Some(partner_id))
        .unwrap();

    assert!(wait_until(|| {
        recorder
            .seen
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.saga_id() == Some(saga_id) && e.event_type() == EventType::PartnerOnboardingInitiated)
    }));

    let seen = recorder.seen.lock().unwrap();
    let initiating = seen
        .iter()
        .find(|e| e.event_type() == EventType::PartnerOnboardingInitiated)
        .expect("initiating event was published");
    assert_eq!(initiating.payload()["partner_id"], partner_id.to_string());
    assert_eq!(initiating.payload()["partner_data"]["legal_name"], "Acme Co");
}
