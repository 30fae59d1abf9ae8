//! Timeout scheduling (spec §4.7 "Timeout wheel").
//!
//! A single tick thread holds `(saga_id, step, deadline)` entries and, on
//! fire, places the fired entry onto the coordinator's work queue — it
//! never mutates saga state directly (spec §5: "it never mutates saga
//! state directly").

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};

use sagaflow_core::SagaId;

#[derive(Debug, Clone)]
pub struct TimeoutFired {
    pub saga_id: SagaId,
    pub step: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    deadline: DateTime<Utc>,
    saga_id: SagaId,
    step: String,
    /// Bumped whenever a step is re-armed; a fired entry whose generation
    /// no longer matches the latest arm for `(saga_id, step)` is stale and
    /// is dropped silently (the saga has since moved on).
    generation: u64,
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline.cmp(&other.deadline)
    }
}

struct Shared {
    heap: Mutex<BinaryHeap<Reverse<Entry>>>,
    generations: Mutex<std::collections::HashMap<(SagaId, String), u64>>,
}

/// Arms/cancels step deadlines and fires them onto a work queue.
pub struct TimeoutWheel {
    shared: Arc<Shared>,
}

impl TimeoutWheel {
    pub fn start(sender: Sender<TimeoutFired>, tick: Duration) -> Self {
        let shared = Arc::new(Shared {
            heap: Mutex::new(BinaryHeap::new()),
            generations: Mutex::new(std::collections::HashMap::new()),
        });

        let worker_shared = Arc::clone(&shared);
        thread::spawn(move || loop {
            thread::sleep(tick);
            let now = Utc::now();
            let mut heap = worker_shared.heap.lock().expect("timeout wheel lock poisoned");
            while let Some(Reverse(entry)) = heap.peek() {
                if entry.deadline > now {
                    break;
                }
                let Reverse(entry) = heap.pop().expect("peeked entry must exist");
                let generations = worker_shared.generations.lock().expect("timeout wheel generations lock poisoned");
                let current_gen = generations.get(&(entry.saga_id, entry.step.clone())).copied();
                drop(generations);
                if current_gen != Some(entry.generation) {
                    continue; // stale: step was re-armed or cancelled since
                }
                let _ = sender.send(TimeoutFired { saga_id: entry.saga_id, step: entry.step.clone() });
            }
        });

        Self { shared }
    }

    /// Arms a new deadline, superseding any previous arm for this
    /// `(saga_id, step)` pair.
    pub fn arm(&self, saga_id: SagaId, step: impl Into<String>, deadline: DateTime<Utc>) {
        let step = step.into();
        let mut generations = self.shared.generations.lock().expect("timeout wheel generations lock poisoned");
        let generation = generations.entry((saga_id, step.clone())).or_insert(0);
        *generation += 1;
        let generation = *generation;
        drop(generations);

        self.shared
            .heap
            .lock()
            .expect("timeout wheel lock poisoned")
            .push(Reverse(Entry { deadline, saga_id, step, generation }));
    }

    /// Cancels any pending deadline for `(saga_id, step)`; a future fire
    /// for the superseded generation is dropped as stale.
    pub fn cancel(&self, saga_id: SagaId, step: &str) {
        let mut generations = self.shared.generations.lock().expect("timeout wheel generations lock poisoned");
        generations.remove(&(saga_id, step.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration as StdDuration;

    #[test]
    fn fires_after_deadline_elapses() {
        let (tx, rx) = channel();
        let wheel = TimeoutWheel::start(tx, StdDuration::from_millis(5));
        let saga_id = SagaId::new();
        wheel.arm(saga_id, "contract_creation", Utc::now() + chrono::Duration::milliseconds(10));

        let fired = rx.recv_timeout(StdDuration::from_millis(200)).unwrap();
        assert_eq!(fired.saga_id, saga_id);
        assert_eq!(fired.step, "contract_creation");
    }

    #[test]
    fn cancelled_entry_does_not_fire() {
        let (tx, rx) = channel();
        let wheel = TimeoutWheel::start(tx, StdDuration::from_millis(5));
        let saga_id = SagaId::new();
        wheel.arm(saga_id, "contract_creation", Utc::now() + chrono::Duration::milliseconds(10));
        wheel.cancel(saga_id, "contract_creation");

        assert!(rx.recv_timeout(StdDuration::from_millis(100)).is_err());
    }

    #[test]
    fn rearming_supersedes_the_previous_deadline() {
        let (tx, rx) = channel();
        let wheel = TimeoutWheel::start(tx, StdDuration::from_millis(5));
        let saga_id = SagaId::new();
        wheel.arm(saga_id, "contract_creation", Utc::now() + chrono::Duration::milliseconds(10));
        wheel.arm(saga_id, "contract_creation", Utc::now() + chrono::Duration::milliseconds(500));

        // the first (stale) deadline must not produce a fire near t=10ms
        assert!(rx.recv_timeout(StdDuration::from_millis(60)).is_err());
    }
}
