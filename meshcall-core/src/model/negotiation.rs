use crate::model::participant::ParticipantId;
use serde::{Deserialize, Serialize};

/// Which side of a pair produces the offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationRole {
    Initiator,
    Responder,
}

impl NegotiationRole {
    /// Role of `local` towards `remote`. The greater id offers.
    ///
    /// Both ends evaluate this on their own and always land on opposite
    /// roles, so no message is needed to agree on who goes first.
    pub fn for_pair(local: &ParticipantId, remote: &ParticipantId) -> Self {
        if local > remote {
            Self::Initiator
        } else {
            Self::Responder
        }
    }

    pub fn is_initiator(self) -> bool {
        self == Self::Initiator
    }
}
