//! Sink for envelopes that exhaust redelivery (spec §4.2, §7 `DeadLetter`).

use std::sync::Mutex;

use sagaflow_events::{Envelope, Topic};

/// A single dead-lettered envelope, with the reason redelivery stopped.
#[derive(Debug, Clone)]
pub struct DeadLetterRecord {
    pub envelope: Envelope,
    pub topic: Topic,
    pub reason: String,
}

pub trait DeadLetterSink: Send + Sync {
    fn record(&self, record: DeadLetterRecord);
}

/// In-memory dead-letter sink for the test harness / local dev, matching
/// the role `InMemoryEventBus` plays for pub/sub itself.
#[derive(Debug, Default)]
pub struct InMemoryDeadLetterSink {
    records: Mutex<Vec<DeadLetterRecord>>,
}

impl InMemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().expect("dead letter sink lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("dead letter sink lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeadLetterSink for InMemoryDeadLetterSink {
    fn record(&self, record: DeadLetterRecord) {
        self.records.lock().expect("dead letter sink lock poisoned").push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sagaflow_core::{CorrelationId, SagaId};
    use sagaflow_events::EventType;

    #[test]
    fn records_accumulate_in_insertion_order() {
        let sink = InMemoryDeadLetterSink::new();
        for i in 0..3 {
            sink.record(DeadLetterRecord {
                envelope: Envelope::initiating(
                    EventType::PartnerOnboardingInitiated,
                    SagaId::new(),
                    CorrelationId::new(format!("corr-{i}")),
                    "test",
                    serde_json::json!({}),
                    Utc::now(),
                ),
                topic: Topic::PartnerEvents,
                reason: "exhausted retries".to_string(),
            });
        }
        assert_eq!(sink.len(), 3);
    }
}
