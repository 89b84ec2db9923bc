use crate::model::participant::{ParticipantId, ParticipantInfo};
use crate::model::room::RoomId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope of a point-to-point message the relay forwards untouched.
///
/// `from` is filled in by the relay; whatever a client puts there is
/// overwritten before delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayedSignal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ParticipantId>,
    pub to: ParticipantId,
    pub payload: Value,
}

impl RelayedSignal {
    pub fn new(to: ParticipantId, payload: Value) -> Self {
        Self {
            from: None,
            to,
            payload,
        }
    }
}

/// Every message carried by the signaling channel, in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SignalMessage {
    /// Relay -> client, first message on a fresh channel.
    Welcome { participant_id: ParticipantId },

    /// Client -> relay: switch to `room_id`.
    JoinRoom { room_id: RoomId, username: String },

    /// Relay -> joiner: everybody else already in the room.
    #[serde(rename = "room_users")]
    RoomMembership { users: Vec<ParticipantInfo> },

    #[serde(rename = "user_joined")]
    ParticipantJoined { user: ParticipantInfo },

    #[serde(rename = "user_left")]
    ParticipantLeft { participant_id: ParticipantId },

    Offer(RelayedSignal),

    Answer(RelayedSignal),

    IceCandidate(RelayedSignal),

    /// Relay -> client: a message was rejected.
    Error { message: String },
}

impl SignalMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::JoinRoom { .. } => "join_room",
            Self::RoomMembership { .. } => "room_users",
            Self::ParticipantJoined { .. } => "user_joined",
            Self::ParticipantLeft { .. } => "user_left",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice_candidate",
            Self::Error { .. } => "error",
        }
    }

    /// The routing envelope of offer/answer/ice_candidate messages.
    pub fn relayed(&self) -> Option<&RelayedSignal> {
        match self {
            Self::Offer(r) | Self::Answer(r) | Self::IceCandidate(r) => Some(r),
            _ => None,
        }
    }

    /// Stamps the sender on a relayed message. Other variants pass through.
    pub fn with_sender(mut self, sender: ParticipantId) -> Self {
        if let Self::Offer(r) | Self::Answer(r) | Self::IceCandidate(r) = &mut self {
            r.from = Some(sender);
        }
        self
    }
}
