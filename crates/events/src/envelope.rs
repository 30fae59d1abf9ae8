//! Canonical event envelope + wire codec (spec §4.1, §6.1).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use sagaflow_core::{CorrelationId, ErrorKind, EventId, SagaId};

use crate::event_type::EventType;

/// An event envelope, immutable once constructed.
///
/// `source` is carried for debugging only; per spec §4.1 it MUST NOT
/// influence routing, so nothing in this crate or `sagaflow-coordinator`
/// reads it for anything but logging/audit display.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    event_id: EventId,
    event_type: EventType,
    saga_id: Option<SagaId>,
    correlation_id: CorrelationId,
    causation_id: Option<EventId>,
    occurred_at: DateTime<Utc>,
    source: String,
    payload: JsonValue,
}

impl Envelope {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_id: EventId,
        event_type: EventType,
        saga_id: Option<SagaId>,
        correlation_id: CorrelationId,
        causation_id: Option<EventId>,
        occurred_at: DateTime<Utc>,
        source: impl Into<String>,
        payload: JsonValue,
    ) -> Self {
        Self {
            event_id,
            event_type,
            saga_id,
            correlation_id,
            causation_id,
            occurred_at,
            source: source.into(),
            payload,
        }
    }

    /// Build the initiating event of a new saga: no causation, saga id and
    /// correlation id coincide unless an external correlation id was supplied.
    pub fn initiating(
        event_type: EventType,
        saga_id: SagaId,
        correlation_id: CorrelationId,
        source: impl Into<String>,
        payload: JsonValue,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            EventId::new(),
            event_type,
            Some(saga_id),
            correlation_id,
            None,
            occurred_at,
            source,
            payload,
        )
    }

    /// Build an event caused by this one, inheriting saga/correlation.
    pub fn caused_by(
        &self,
        event_type: EventType,
        source: impl Into<String>,
        payload: JsonValue,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            EventId::new(),
            event_type,
            self.saga_id,
            self.correlation_id.clone(),
            Some(self.event_id),
            occurred_at,
            source,
            payload,
        )
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn saga_id(&self) -> Option<SagaId> {
        self.saga_id
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn causation_id(&self) -> Option<EventId> {
        self.causation_id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    pub fn with_saga_id(mut self, saga_id: SagaId) -> Self {
        self.saga_id = Some(saga_id);
        self
    }

    fn validate(&self) -> Result<(), ErrorKind> {
        if self.event_id.is_nil() {
            return Err(ErrorKind::MalformedEvent("event_id must not be nil".to_string()));
        }
        if self.correlation_id.as_str().is_empty() {
            return Err(ErrorKind::MalformedEvent(
                "correlation_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// The flat, string-typed shape actually transmitted on the wire (spec §6.1).
#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    event_id: String,
    event_type: String,
    #[serde(default)]
    saga_id: String,
    correlation_id: String,
    #[serde(default)]
    causation_id: String,
    occurred_at: String,
    #[serde(default)]
    source: String,
    #[serde(default = "default_payload")]
    payload: JsonValue,
}

fn default_payload() -> JsonValue {
    JsonValue::Object(Default::default())
}

/// Serialize an envelope to its canonical wire JSON.
///
/// Refuses (with `ErrorKind::MalformedEvent`) to emit an envelope missing
/// `event_id`, `event_type`, `correlation_id`, or `occurred_at` (spec §4.1);
/// because those fields are non-optional in `Envelope`, this amounts to a
/// final sanity check against a nil/empty value having slipped through.
pub fn encode(envelope: &Envelope) -> Result<String, ErrorKind> {
    envelope.validate()?;

    let wire = WireEnvelope {
        event_id: envelope.event_id.to_string(),
        event_type: envelope.event_type.to_string(),
        saga_id: envelope.saga_id.map(|s| s.to_string()).unwrap_or_default(),
        correlation_id: envelope.correlation_id.as_str().to_string(),
        causation_id: envelope.causation_id.map(|c| c.to_string()).unwrap_or_default(),
        occurred_at: envelope.occurred_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        source: envelope.source.clone(),
        payload: envelope.payload.clone(),
    };

    serde_json::to_string(&wire).map_err(|e| ErrorKind::MalformedEvent(e.to_string()))
}

/// Decode a wire JSON document into an `Envelope`.
///
/// Tolerates unknown fields inside `payload` (forward-compatible); fails
/// with `ErrorKind::MalformedEvent` if a required envelope field is missing,
/// `event_type` is not a recognized identifier, or `occurred_at` cannot be
/// parsed as ISO-8601 UTC.
pub fn decode(raw: &str) -> Result<Envelope, ErrorKind> {
    let wire: WireEnvelope =
        serde_json::from_str(raw).map_err(|e| ErrorKind::MalformedEvent(e.to_string()))?;

    let event_id: EventId = wire
        .event_id
        .parse()
        .map_err(|e: sagaflow_core::DomainError| ErrorKind::MalformedEvent(e.to_string()))?;

    let event_type: EventType = wire
        .event_type
        .parse()
        .map_err(|e: crate::event_type::UnknownEventType| ErrorKind::MalformedEvent(e.to_string()))?;

    let saga_id = if wire.saga_id.is_empty() {
        None
    } else {
        Some(
            wire.saga_id
                .parse()
                .map_err(|e: sagaflow_core::DomainError| ErrorKind::MalformedEvent(e.to_string()))?,
        )
    };

    let causation_id = if wire.causation_id.is_empty() {
        None
    } else {
        Some(
            wire.causation_id
                .parse()
                .map_err(|e: sagaflow_core::DomainError| ErrorKind::MalformedEvent(e.to_string()))?,
        )
    };

    if wire.correlation_id.is_empty() {
        return Err(ErrorKind::MalformedEvent("correlation_id is required".to_string()));
    }

    let occurred_at = DateTime::parse_from_rfc3339(&wire.occurred_at)
        .map_err(|e| ErrorKind::MalformedEvent(format!("occurred_at: {e}")))?
        .with_timezone(&Utc);

    Ok(Envelope {
        event_id,
        event_type,
        saga_id,
        correlation_id: CorrelationId::new(wire.correlation_id),
        causation_id,
        occurred_at,
        source: wire.source,
        payload: wire.payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::SubsecRound;
    use serde_json::json;

    fn sample() -> Envelope {
        Envelope::initiating(
            EventType::PartnerOnboardingInitiated,
            SagaId::new(),
            CorrelationId::new("corr-1"),
            "saga-coordinator",
            json!({"nombre": "Acme", "email": "a@acme.test"}),
            // encode() truncates to millisecond precision; match that here
            // or the round-trip equality fails on sub-millisecond digits.
            Utc::now().trunc_subsecs(3),
        )
    }

    #[test]
    fn encode_then_decode_is_identity() {
        let original = sample();
        let wire = encode(&original).unwrap();
        let decoded = decode(&wire).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn decode_rejects_missing_required_field() {
        let err = decode(r#"{"event_type":"ContractCreated","correlation_id":"c","occurred_at":"2024-01-01T00:00:00.000Z"}"#);
        assert!(matches!(err, Err(ErrorKind::MalformedEvent(_))));
    }

    #[test]
    fn decode_rejects_unparseable_timestamp() {
        let raw = r#"{
            "event_id":"0f1e2d3c-0000-0000-0000-000000000000",
            "event_type":"ContractCreated",
            "correlation_id":"c",
            "occurred_at":"not-a-timestamp"
        }"#;
        assert!(matches!(decode(raw), Err(ErrorKind::MalformedEvent(_))));
    }

    #[test]
    fn decode_tolerates_unknown_payload_fields() {
        let raw = r#"{
            "event_id":"0f1e2d3c-0000-0000-0000-000000000001",
            "event_type":"ContractCreated",
            "correlation_id":"c",
            "occurred_at":"2024-01-01T00:00:00.000Z",
            "payload":{"known":1,"totally_unknown_field":"ignored by readers"}
        }"#;
        let env = decode(raw).unwrap();
        assert_eq!(env.payload()["totally_unknown_field"], "ignored by readers");
    }

    #[test]
    fn empty_saga_id_decodes_to_none() {
        let raw = r#"{
            "event_id":"0f1e2d3c-0000-0000-0000-000000000002",
            "event_type":"ContractCreated",
            "saga_id":"",
            "correlation_id":"c",
            "occurred_at":"2024-01-01T00:00:00.000Z"
        }"#;
        assert_eq!(decode(raw).unwrap().saga_id(), None);
    }

    #[test]
    fn causation_chain_carries_correlation_and_saga_forward() {
        let first = sample();
        let second = first.caused_by(EventType::PartnerRegistrationCompleted, "onboarding", json!({}), Utc::now());
        assert_eq!(second.correlation_id(), first.correlation_id());
        assert_eq!(second.saga_id(), first.saga_id());
        assert_eq!(second.causation_id(), Some(first.event_id()));
    }
}
