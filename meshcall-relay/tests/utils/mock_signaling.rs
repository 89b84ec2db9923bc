use async_trait::async_trait;
use meshcall_core::{ParticipantId, ParticipantInfo, SignalMessage};
use meshcall_relay::SignalingOutput;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// A message captured on its way to one participant.
#[derive(Debug, Clone)]
pub struct Delivered {
    pub to: ParticipantId,
    pub msg: SignalMessage,
}

/// Mock SignalingOutput that captures all outgoing signals.
#[derive(Clone)]
pub struct MockSignalingOutput {
    /// Channel to send captured signals.
    tx: mpsc::UnboundedSender<Delivered>,
    /// All captured signals (for verification).
    signals: Arc<Mutex<Vec<Delivered>>>,
}

impl MockSignalingOutput {
    /// Create a new MockSignalingOutput and its receiver channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivered>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let signaling = Self {
            tx,
            signals: Arc::new(Mutex::new(Vec::new())),
        };
        (signaling, rx)
    }

    /// Create a MockSignalingOutput without a receiver (signals are only stored).
    pub fn new_stored_only() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self {
            tx,
            signals: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every message delivered to `participant_id`, in delivery order.
    pub async fn messages_for(&self, participant_id: &ParticipantId) -> Vec<SignalMessage> {
        self.signals
            .lock()
            .await
            .iter()
            .filter(|d| &d.to == participant_id)
            .map(|d| d.msg.clone())
            .collect()
    }

    /// The latest membership snapshot delivered to `participant_id`.
    pub async fn last_snapshot_for(
        &self,
        participant_id: &ParticipantId,
    ) -> Option<Vec<ParticipantInfo>> {
        self.messages_for(participant_id)
            .await
            .into_iter()
            .rev()
            .find_map(|m| match m {
                SignalMessage::RoomMembership { users } => Some(users),
                _ => None,
            })
    }

    /// Ids announced to `participant_id` through `user_left`.
    pub async fn departures_seen_by(&self, participant_id: &ParticipantId) -> Vec<ParticipantId> {
        self.messages_for(participant_id)
            .await
            .into_iter()
            .filter_map(|m| match m {
                SignalMessage::ParticipantLeft { participant_id } => Some(participant_id),
                _ => None,
            })
            .collect()
    }

    /// Ids announced to `participant_id` through `user_joined`.
    pub async fn arrivals_seen_by(&self, participant_id: &ParticipantId) -> Vec<ParticipantId> {
        self.messages_for(participant_id)
            .await
            .into_iter()
            .filter_map(|m| match m {
                SignalMessage::ParticipantJoined { user } => Some(user.id),
                _ => None,
            })
            .collect()
    }

    pub async fn clear(&self) {
        self.signals.lock().await.clear();
    }
}

impl Default for MockSignalingOutput {
    fn default() -> Self {
        Self::new_stored_only()
    }
}

#[async_trait]
impl SignalingOutput for MockSignalingOutput {
    async fn send_to(&self, participant_id: &ParticipantId, msg: SignalMessage) -> bool {
        tracing::debug!("[MockSignaling] {} to {}", msg.kind(), participant_id);

        let delivered = Delivered {
            to: participant_id.clone(),
            msg,
        };

        self.signals.lock().await.push(delivered.clone());
        let _ = self.tx.send(delivered);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_signaling_captures_messages() {
        let (signaling, mut rx) = MockSignalingOutput::new();
        let id = ParticipantId::from("p1");

        signaling
            .send_to(&id, SignalMessage::RoomMembership { users: vec![] })
            .await;

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.to, id);
        assert_eq!(signaling.last_snapshot_for(&id).await, Some(vec![]));
    }
}
