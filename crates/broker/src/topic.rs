//! Static event-type → topic mapping (spec §6.2).
//!
//! `EventType::topic()` already carries this table; this free function
//! exists as the seam spec §4.2 calls out ("the mapping is part of
//! configuration") — a deployment wanting a different mapping swaps this
//! function out without touching `sagaflow-events`.

use sagaflow_events::{EventType, Topic};

pub fn topic_for(event_type: EventType) -> Topic {
    event_type.topic()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_spec_table_for_a_sample() {
        assert_eq!(topic_for(EventType::ContractCreated), Topic::ContractEvents);
        assert_eq!(topic_for(EventType::RecruitmentSetupFailed), Topic::RecruitmentEvents);
    }
}
