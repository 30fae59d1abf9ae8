//! Reverse-walk compensation driver (spec §4.7 "Compensation").
//!
//! Pure planning only: given a saga's completed steps and what has already
//! been compensated, decide what happens next. Steps with no compensating
//! event (`compensating_event: None`) are no-ops and are skipped without
//! emitting anything. The step that actually failed is never compensated —
//! only steps that completed *before* it are walked in reverse.

use sagaflow_events::EventType;
use sagaflow_store::SagaInstance;

use crate::step::SagaTypeDefinition;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompensationPlan {
    /// Emit `event_type` for `step_name`, then mark it compensated.
    Emit { step_name: String, event_type: EventType },
    /// `step_name` has no compensating event; mark it compensated with no
    /// broker traffic and keep walking.
    Skip { step_name: String },
    /// Every completed step has been compensated (or skipped).
    Done,
}

/// Looks at `saga.completed_steps` in reverse completion order and returns
/// the next thing the compensation driver needs to do.
pub fn next_compensation_step(def: &dyn SagaTypeDefinition, saga: &SagaInstance) -> CompensationPlan {
    for completed in saga.completed_steps.iter().rev() {
        if saga.compensated_steps.iter().any(|s| s == &completed.step) {
            continue;
        }
        let Some(index) = def.step_index(&completed.step) else {
            continue;
        };
        let Some(step) = def.step(index) else {
            continue;
        };
        return match step.compensating_event {
            Some(event_type) => CompensationPlan::Emit { step_name: completed.step.clone(), event_type },
            None => CompensationPlan::Skip { step_name: completed.step.clone() },
        };
    }
    CompensationPlan::Done
}
