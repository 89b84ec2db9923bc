use crate::error::Result;
use async_trait::async_trait;
use meshcall_core::{
    IceCandidate, ParticipantId, RelayedSignal, RoomId, SessionDescription, SignalMessage,
};

/// Outbound half of the signaling channel as seen by the mesh.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    async fn send_signal(&self, msg: SignalMessage) -> Result<()>;

    async fn join_room(&self, room_id: &RoomId, username: &str) -> Result<()> {
        self.send_signal(SignalMessage::JoinRoom {
            room_id: room_id.clone(),
            username: username.to_owned(),
        })
        .await
    }

    async fn send_offer(&self, to: &ParticipantId, offer: &SessionDescription) -> Result<()> {
        self.send_signal(SignalMessage::Offer(RelayedSignal::new(
            to.clone(),
            offer.to_payload(),
        )))
        .await
    }

    async fn send_answer(&self, to: &ParticipantId, answer: &SessionDescription) -> Result<()> {
        self.send_signal(SignalMessage::Answer(RelayedSignal::new(
            to.clone(),
            answer.to_payload(),
        )))
        .await
    }

    async fn send_ice(&self, to: &ParticipantId, candidate: &IceCandidate) -> Result<()> {
        self.send_signal(SignalMessage::IceCandidate(RelayedSignal::new(
            to.clone(),
            candidate.to_payload(),
        )))
        .await
    }
}
