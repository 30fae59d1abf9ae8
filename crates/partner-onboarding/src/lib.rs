//! The partner-onboarding saga type: the reference workflow's static step
//! table (spec §4.7) plus the C9 integration glue that translates the
//! coordinator's opaque `initial_payload` into the field shape external
//! services expect on the wire (spec §4.9).

mod payload;

use std::time::Duration;

use sagaflow_core::PartnerId;
use sagaflow_coordinator::{SagaTypeDefinition, StepDefinition};
use sagaflow_events::EventType;
use serde_json::Value as JsonValue;

pub use payload::{extract_partner_id, PartnerRegistrationPayload};

const STEPS: &[StepDefinition] = &[
    StepDefinition {
        name: "partner_registration",
        forward_event: EventType::PartnerOnboardingInitiated,
        expected_success_events: &[EventType::PartnerRegistrationCompleted],
        expected_failure_events: &[EventType::PartnerRegistrationFailed],
        compensating_event: Some(EventType::PartnerRegistrationReverted),
        compensation_idempotent: true,
        timeout: Duration::from_secs(30),
        retries: 3,
    },
    StepDefinition {
        name: "contract_creation",
        forward_event: EventType::ContractCreationRequested,
        expected_success_events: &[EventType::ContractCreated],
        expected_failure_events: &[EventType::ContractCreationFailed],
        compensating_event: Some(EventType::ContractCancelled),
        compensation_idempotent: true,
        timeout: Duration::from_secs(30),
        retries: 3,
    },
    StepDefinition {
        name: "document_verification",
        forward_event: EventType::DocumentVerificationRequested,
        expected_success_events: &[EventType::DocumentsVerified],
        expected_failure_events: &[EventType::DocumentVerificationFailed],
        compensating_event: Some(EventType::DocumentsInvalidated),
        compensation_idempotent: true,
        timeout: Duration::from_secs(60),
        retries: 3,
    },
    StepDefinition {
        name: "campaign_enablement",
        forward_event: EventType::CampaignsEnablementRequested,
        expected_success_events: &[EventType::CampaignsEnabled],
        expected_failure_events: &[EventType::CampaignsEnablementFailed],
        compensating_event: Some(EventType::CampaignsDisabled),
        compensation_idempotent: true,
        timeout: Duration::from_secs(30),
        retries: 3,
    },
    StepDefinition {
        name: "recruitment_setup",
        forward_event: EventType::RecruitmentSetupRequested,
        expected_success_events: &[EventType::RecruitmentSetupCompleted],
        expected_failure_events: &[EventType::RecruitmentSetupFailed],
        compensating_event: Some(EventType::RecruitmentTornDown),
        compensation_idempotent: true,
        timeout: Duration::from_secs(30),
        retries: 3,
    },
];

/// The reference workflow from spec §4.7: registration, contracting,
/// document verification, campaign enablement, recruitment setup.
pub struct PartnerOnboardingSaga;

impl SagaTypeDefinition for PartnerOnboardingSaga {
    fn name(&self) -> &'static str {
        "partner-onboarding"
    }

    fn steps(&self) -> &'static [StepDefinition] {
        STEPS
    }

    fn build_trigger_payload(&self, initial_payload: &JsonValue, partner_id: Option<PartnerId>) -> JsonValue {
        payload::enrich(initial_payload, partner_id)
    }
}
