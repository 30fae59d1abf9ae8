//! Broker adapter contract (spec §4.2): topic-scoped publish/subscribe with
//! acknowledgement, backed by at-least-once delivery.

use sagaflow_core::ErrorKind;
use sagaflow_events::{Envelope, Topic};

/// Outcome a subscription handler returns for each delivered envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Envelope processed successfully; broker may discard it.
    Ack,
    /// Transient failure; broker redelivers with backoff.
    Nack,
    /// Permanent failure; broker stops redelivery and records the envelope
    /// for offline inspection instead.
    DeadLetter,
}

/// Receives envelopes delivered by a subscription.
///
/// At-least-once: the same envelope may be handed to `handle` more than
/// once across restarts or nacked redeliveries. Implementors (here, the
/// coordinator's dispatch loop) must be idempotent.
pub trait Handler: Send + Sync {
    fn handle(&self, envelope: Envelope) -> Ack;
}

impl<F> Handler for F
where
    F: Fn(Envelope) -> Ack + Send + Sync,
{
    fn handle(&self, envelope: Envelope) -> Ack {
        self(envelope)
    }
}

/// A live subscription; dropping it does not stop delivery (per spec,
/// subscriptions are shared and long-lived) — use `unsubscribe` explicitly.
pub trait Subscription: Send {
    fn unsubscribe(self: Box<Self>);
}

/// Topic-scoped producer/consumer with reconnect, subscription lifecycle,
/// and acknowledgement (spec §4.2).
pub trait EventBus: Send + Sync {
    /// Publish and block until the broker acknowledges receipt. Retries
    /// internally with backoff; returns `ErrorKind::BrokerUnavailable` once
    /// retries are exhausted. May block the caller if the adapter's
    /// internal publish queue is full (backpressure, spec §5).
    fn publish(&self, topic: Topic, envelope: Envelope) -> Result<(), ErrorKind>;

    /// Register a shared subscription; `handler` is invoked for every
    /// envelope delivered on `topic`, possibly more than once per envelope.
    fn subscribe(
        &self,
        topic: Topic,
        subscription_name: &str,
        handler: std::sync::Arc<dyn Handler>,
    ) -> Box<dyn Subscription>;
}
