//! Topic-scoped broker adapter: publish/subscribe with acknowledgement,
//! backoff-driven redelivery, and dead-lettering (spec §4.2).

mod backoff;
mod bus;
mod dead_letter;
mod in_memory;
mod topic;

pub use backoff::Backoff;
pub use bus::{Ack, EventBus, Handler, Subscription};
pub use dead_letter::{DeadLetterRecord, DeadLetterSink, InMemoryDeadLetterSink};
pub use in_memory::InMemoryEventBus;
pub use topic::topic_for;
