//! The event envelope and event-type vocabulary the coordinator speaks.

mod envelope;
mod event_type;

pub use envelope::{decode, encode, Envelope};
pub use event_type::{EventType, Topic, UnknownEventType};
