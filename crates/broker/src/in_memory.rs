//! In-memory broker adapter for tests and local/dev wiring.
//!
//! Best-effort fan-out, at-least-once delivery, Nack redelivery with
//! backoff, DeadLetter on exhaustion. No IO, no external dependencies —
//! a real transport is a separate `EventBus` implementation plugged in at
//! the same seam.

use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use sagaflow_core::ErrorKind;
use sagaflow_events::{Envelope, Topic};

use crate::backoff::Backoff;
use crate::bus::{Ack, EventBus, Handler, Subscription};
use crate::dead_letter::{DeadLetterRecord, DeadLetterSink};

struct Subscriber {
    name: String,
    handler: Arc<dyn Handler>,
}

struct QueueItem {
    topic: Topic,
    envelope: Envelope,
}

struct Inner {
    subscribers: Mutex<HashMap<Topic, Vec<Subscriber>>>,
    sender: SyncSender<QueueItem>,
    dead_letter: Arc<dyn DeadLetterSink>,
    backoff: Backoff,
}

/// In-memory `EventBus`. Spawns a single dispatch thread that drains the
/// bounded publish queue and fans envelopes out to subscribers.
pub struct InMemoryEventBus {
    inner: Arc<Inner>,
}

impl InMemoryEventBus {
    /// `queue_capacity` bounds the in-flight publish queue (spec §4.2/§5
    /// backpressure); once full, `publish` blocks the caller.
    pub fn new(queue_capacity: usize, dead_letter: Arc<dyn DeadLetterSink>) -> Self {
        Self::with_backoff(queue_capacity, dead_letter, Backoff::default())
    }

    pub fn with_backoff(
        queue_capacity: usize,
        dead_letter: Arc<dyn DeadLetterSink>,
        backoff: Backoff,
    ) -> Self {
        let (sender, receiver) = sync_channel(queue_capacity.max(1));
        let inner = Arc::new(Inner {
            subscribers: Mutex::new(HashMap::new()),
            sender,
            dead_letter,
            backoff,
        });

        spawn_dispatch_loop(Arc::clone(&inner), receiver);

        Self { inner }
    }
}

fn spawn_dispatch_loop(inner: Arc<Inner>, receiver: Receiver<QueueItem>) {
    thread::spawn(move || {
        while let Ok(item) = receiver.recv() {
            deliver(&inner, item);
        }
    });
}

fn deliver(inner: &Arc<Inner>, item: QueueItem) {
    let subs: Vec<Arc<dyn Handler>> = {
        let guard = inner.subscribers.lock().expect("broker subscriber lock poisoned");
        guard
            .get(&item.topic)
            .map(|v| v.iter().map(|s| Arc::clone(&s.handler)).collect())
            .unwrap_or_default()
    };

    for handler in subs {
        deliver_to_one(inner, &item.topic, &item.envelope, handler.as_ref());
    }
}

fn deliver_to_one(inner: &Arc<Inner>, topic: &Topic, envelope: &Envelope, handler: &dyn Handler) {
    let mut attempt = 1;
    loop {
        match handler.handle(envelope.clone()) {
            Ack::Ack => return,
            Ack::DeadLetter => {
                tracing::warn!(
                    event_id = %envelope.event_id(),
                    event_type = %envelope.event_type(),
                    topic = %topic,
                    "handler rejected envelope outright, dead-lettering"
                );
                inner.dead_letter.record(DeadLetterRecord {
                    envelope: envelope.clone(),
                    topic: *topic,
                    reason: "handler returned DeadLetter".to_string(),
                });
                return;
            }
            Ack::Nack => {
                if attempt >= inner.backoff.max_attempts() {
                    tracing::warn!(
                        event_id = %envelope.event_id(),
                        event_type = %envelope.event_type(),
                        topic = %topic,
                        attempts = attempt,
                        "exhausted redelivery attempts, dead-lettering"
                    );
                    inner.dead_letter.record(DeadLetterRecord {
                        envelope: envelope.clone(),
                        topic: *topic,
                        reason: format!("exhausted {attempt} redelivery attempts"),
                    });
                    return;
                }
                tracing::debug!(
                    event_id = %envelope.event_id(),
                    attempt,
                    "handler nacked envelope, retrying after backoff"
                );
                thread::sleep(inner.backoff.delay_for_attempt(attempt));
                attempt += 1;
            }
        }
    }
}

struct InMemorySubscription {
    inner: Arc<Inner>,
    topic: Topic,
    name: String,
}

impl Subscription for InMemorySubscription {
    fn unsubscribe(self: Box<Self>) {
        if let Ok(mut guard) = self.inner.subscribers.lock() {
            if let Some(subs) = guard.get_mut(&self.topic) {
                subs.retain(|s| s.name != self.name);
            }
        }
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(&self, topic: Topic, envelope: Envelope) -> Result<(), ErrorKind> {
        self.inner
            .sender
            .send(QueueItem { topic, envelope })
            .map_err(|_| ErrorKind::BrokerUnavailable("dispatch thread is gone".to_string()))
    }

    fn subscribe(
        &self,
        topic: Topic,
        subscription_name: &str,
        handler: Arc<dyn Handler>,
    ) -> Box<dyn Subscription> {
        let mut guard = self.inner.subscribers.lock().expect("broker subscriber lock poisoned");
        guard.entry(topic).or_default().push(Subscriber {
            name: subscription_name.to_string(),
            handler,
        });

        Box::new(InMemorySubscription {
            inner: Arc::clone(&self.inner),
            topic,
            name: subscription_name.to_string(),
        })
    }
}
