mod description;
mod negotiation;
mod participant;
mod room;
mod signaling;

pub use description::{IceCandidate, SdpKind, SessionDescription};
pub use negotiation::NegotiationRole;
pub use participant::{ParticipantId, ParticipantInfo};
pub use room::RoomId;
pub use signaling::{RelayedSignal, SignalMessage};
