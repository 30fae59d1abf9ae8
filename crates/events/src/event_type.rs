//! The fixed vocabulary of event types the coordinator understands (spec §6.2).
//!
//! Re-architected per the design notes: rather than dispatching on raw
//! strings, every event name the wire format can carry is a variant here,
//! so routing in the coordinator (C7) is an exhaustive match rather than a
//! registry lookup by string key.

use core::str::FromStr;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Topics the broker adapter routes by (spec §6.2).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    PartnerEvents,
    ContractEvents,
    DocumentEvents,
    CampaignEvents,
    RecruitmentEvents,
    SagaEvents,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::PartnerEvents => "partner-events",
            Topic::ContractEvents => "contract-events",
            Topic::DocumentEvents => "document-events",
            Topic::CampaignEvents => "campaign-events",
            Topic::RecruitmentEvents => "recruitment-events",
            Topic::SagaEvents => "saga-events",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! event_type_enum {
    ($( $variant:ident => $topic:expr ),+ $(,)?) => {
        /// Every event name the coordinator's wire vocabulary defines.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum EventType {
            $( $variant, )+
        }

        impl EventType {
            /// The static topic this event type is published/consumed on.
            ///
            /// Per spec §4.2 this mapping is part of configuration in a real
            /// deployment (a broker could remap topics); the table itself,
            /// however, is fixed by the domain vocabulary, so it is exposed
            /// here as the default and callers needing remapping can layer a
            /// lookup on top.
            pub fn topic(&self) -> Topic {
                match self {
                    $( EventType::$variant => $topic, )+
                }
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( EventType::$variant => stringify!($variant), )+
                }
            }

            pub const ALL: &'static [EventType] = &[
                $( EventType::$variant, )+
            ];
        }

        impl fmt::Display for EventType {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for EventType {
            type Err = UnknownEventType;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( stringify!($variant) => Ok(EventType::$variant), )+
                    other => Err(UnknownEventType(other.to_string())),
                }
            }
        }
    };
}

event_type_enum! {
    PartnerOnboardingInitiated => Topic::PartnerEvents,
    PartnerRegistrationCompleted => Topic::PartnerEvents,
    PartnerRegistrationFailed => Topic::PartnerEvents,
    PartnerRegistrationReverted => Topic::PartnerEvents,

    ContractCreationRequested => Topic::ContractEvents,
    ContractCreated => Topic::ContractEvents,
    ContractCreationFailed => Topic::ContractEvents,
    ContractCancelled => Topic::ContractEvents,
    ContractSigned => Topic::ContractEvents,
    ContractActivated => Topic::ContractEvents,

    DocumentVerificationRequested => Topic::DocumentEvents,
    DocumentsVerified => Topic::DocumentEvents,
    DocumentVerificationFailed => Topic::DocumentEvents,
    DocumentsInvalidated => Topic::DocumentEvents,

    CampaignsEnablementRequested => Topic::CampaignEvents,
    CampaignsEnabled => Topic::CampaignEvents,
    CampaignsEnablementFailed => Topic::CampaignEvents,
    CampaignsDisabled => Topic::CampaignEvents,

    RecruitmentSetupRequested => Topic::RecruitmentEvents,
    RecruitmentSetupCompleted => Topic::RecruitmentEvents,
    RecruitmentSetupFailed => Topic::RecruitmentEvents,
    RecruitmentTornDown => Topic::RecruitmentEvents,

    PartnerOnboardingCompleted => Topic::SagaEvents,
    PartnerOnboardingFailed => Topic::SagaEvents,
    PartnerOnboardingCompensated => Topic::SagaEvents,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);
