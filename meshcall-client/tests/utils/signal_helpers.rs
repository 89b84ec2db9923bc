use meshcall_client::{LinkState, MeshEvent, SessionEvent};
use meshcall_core::{
    IceCandidate, ParticipantId, ParticipantInfo, RelayedSignal, SessionDescription,
    SignalMessage,
};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, timeout};

/// Timeout for waiting on an expected event or message.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long "nothing happens" is observed for.
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

pub fn pid(id: &str) -> ParticipantId {
    ParticipantId::from(id)
}

pub fn user(id: &str) -> ParticipantInfo {
    ParticipantInfo::new(pid(id), format!("user-{}", id))
}

pub fn membership(ids: &[&str]) -> SignalMessage {
    SignalMessage::RoomMembership {
        users: ids.iter().map(|id| user(id)).collect(),
    }
}

pub fn joined(id: &str) -> SignalMessage {
    SignalMessage::ParticipantJoined { user: user(id) }
}

pub fn left(id: &str) -> SignalMessage {
    SignalMessage::ParticipantLeft {
        participant_id: pid(id),
    }
}

/// An offer as the relay would deliver it: stamped with its sender.
pub fn offer_from(from: &str, to: &str, sdp: &str) -> SignalMessage {
    SignalMessage::Offer(RelayedSignal::new(
        pid(to),
        SessionDescription::offer(sdp).to_payload(),
    ))
    .with_sender(pid(from))
}

pub fn answer_from(from: &str, to: &str, sdp: &str) -> SignalMessage {
    SignalMessage::Answer(RelayedSignal::new(
        pid(to),
        SessionDescription::answer(sdp).to_payload(),
    ))
    .with_sender(pid(from))
}

pub fn candidate_from(from: &str, to: &str, candidate: &str) -> SignalMessage {
    SignalMessage::IceCandidate(RelayedSignal::new(
        pid(to),
        IceCandidate::new(candidate).to_payload(),
    ))
    .with_sender(pid(from))
}

/// Next outbound message of `kind`, skipping everything else.
pub async fn next_sent(
    rx: &mut mpsc::UnboundedReceiver<SignalMessage>,
    kind: &str,
) -> RelayedSignal {
    timeout(EVENT_TIMEOUT, async {
        loop {
            let msg = rx.recv().await.expect("signaling output dropped");
            if msg.kind() == kind {
                return msg.relayed().cloned().expect("not a relayed message");
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {} was sent", kind))
}

/// Next offer or answer sent, decoded.
pub async fn next_description(
    rx: &mut mpsc::UnboundedReceiver<SignalMessage>,
    kind: &str,
) -> (ParticipantId, SessionDescription) {
    let signal = next_sent(rx, kind).await;
    let desc = SessionDescription::from_payload(&signal.payload).expect("bad description");
    (signal.to, desc)
}

pub async fn wait_for_event(
    rx: &mut broadcast::Receiver<MeshEvent>,
    mut pred: impl FnMut(&MeshEvent) -> bool,
) -> MeshEvent {
    timeout(EVENT_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("mesh event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for mesh event")
}

pub async fn wait_for_state(
    rx: &mut broadcast::Receiver<MeshEvent>,
    peer: &str,
    wanted: LinkState,
) {
    let peer = pid(peer);
    wait_for_event(rx, |e| {
        matches!(e, MeshEvent::PeerStateChanged { peer: p, state } if *p == peer && *state == wanted)
    })
    .await;
}

pub async fn wait_for_connected(rx: &mut broadcast::Receiver<MeshEvent>, peer: &str) {
    let peer = pid(peer);
    wait_for_event(rx, |e| matches!(e, MeshEvent::PeerConnected { peer: p } if *p == peer)).await;
}

pub async fn wait_for_removed(rx: &mut broadcast::Receiver<MeshEvent>, peer: &str) {
    let peer = pid(peer);
    wait_for_event(rx, |e| matches!(e, MeshEvent::PeerRemoved { peer: p } if *p == peer)).await;
}

/// Polls `cond` until it holds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Next value from an mpsc receiver, or `None` after `wait`.
pub async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>, wait: Duration) -> Option<T> {
    timeout(wait, rx.recv()).await.ok().flatten()
}

pub async fn wait_for_session_event(
    rx: &mut broadcast::Receiver<SessionEvent>,
    mut pred: impl FnMut(&SessionEvent) -> bool,
) -> SessionEvent {
    timeout(EVENT_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("session event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}
