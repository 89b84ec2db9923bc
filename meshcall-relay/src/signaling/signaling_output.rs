use async_trait::async_trait;
use meshcall_core::{ParticipantId, SignalMessage};

/// Delivery side of the relay: rooms push membership events through this,
/// the router forwards offers/answers/candidates through it.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    /// Queue `msg` on the participant's channel.
    ///
    /// Returns false when the participant has no live channel; the message is
    /// dropped in that case.
    async fn send_to(&self, participant_id: &ParticipantId, msg: SignalMessage) -> bool;

    /// Send the same message to each recipient.
    async fn broadcast(&self, recipients: &[ParticipantId], msg: SignalMessage) {
        for participant_id in recipients {
            self.send_to(participant_id, msg.clone()).await;
        }
    }
}
