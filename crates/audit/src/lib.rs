//! Ground-truth, durable, per-saga audit trail and timeline reconstruction
//! (spec §4.4), distinct from the diagnostic Saga Log (`sagaflow-log`).

mod record;
mod timeline;
mod trail;

pub use record::{AuditKind, AuditRecord};
pub use timeline::Timeline;
pub use trail::AuditTrail;
