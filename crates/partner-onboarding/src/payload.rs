//! Payload shaping for the partner-onboarding saga (spec §4.9).
//!
//! The coordinator stores whatever JSON the caller handed to `start()` as
//! `initial_payload` and otherwise treats it as opaque. Each outgoing
//! trigger or compensating event, though, is consumed by a concrete
//! downstream service with its own schema — this module is where that
//! schema lives.

use sagaflow_core::PartnerId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

/// The subset of the start-time payload the onboarding services require.
/// Extra fields supplied by the caller pass through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerRegistrationPayload {
    pub legal_name: String,
    #[serde(default)]
    pub contact_email: Option<String>,
}

/// Pulls `partner_id` out of `initial_payload` if the caller embedded it
/// there rather than passing it as the separate `start()` argument.
pub fn extract_partner_id(initial_payload: &JsonValue) -> Option<PartnerId> {
    initial_payload.get("partner_id")?.as_str()?.parse().ok()
}

/// Nests the stored payload under `partner_data` and injects `partner_id`
/// as a top-level field, per spec §4.9's "fills in mandatory domain
/// fields (e.g., `partner_id`, `partner_data`) from the saga's
/// `initial_payload`". Idempotent: re-enriching an already-enriched
/// payload is a no-op, since `initial_payload` itself never changes.
pub fn enrich(initial_payload: &JsonValue, partner_id: Option<PartnerId>) -> JsonValue {
    let partner_id = partner_id.or_else(|| extract_partner_id(initial_payload));
    json!({
        "partner_id": partner_id.map(|id| id.to_string()),
        "partner_data": initial_payload,
    })
}
