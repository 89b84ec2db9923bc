use crate::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use meshcall_core::{ParticipantId, ParticipantInfo, SignalMessage};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const MAX_USERNAME_CHARS: usize = 64;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let participant_id = ParticipantId::generate();

    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, participant_id, state))
}

async fn handle_socket(socket: WebSocket, participant_id: ParticipantId, state: AppState) {
    info!("New WebSocket connection: {}", participant_id);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    state.signaling.add_peer(participant_id.clone(), tx.clone());
    state.signaling.send_signal(
        &participant_id,
        &SignalMessage::Welcome {
            participant_id: participant_id.clone(),
        },
    );

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let state = state.clone();
        let participant_id = participant_id.clone();
        let interval = state.config.keepalive_interval();
        let timeout = state.config.keepalive_timeout();

        async move {
            let mut keepalive = tokio::time::interval_at(Instant::now() + interval, interval);
            let mut last_seen = Instant::now();

            loop {
                tokio::select! {
                    frame = receiver.next() => {
                        let Some(Ok(msg)) = frame else { break };
                        last_seen = Instant::now();

                        match msg {
                            Message::Text(text) => {
                                match serde_json::from_str::<SignalMessage>(text.as_str()) {
                                    Ok(signal) => dispatch(&state, &participant_id, signal).await,
                                    Err(e) => {
                                        warn!("Invalid SignalMessage from {}: {}", participant_id, e);
                                        reject(&state, &participant_id, format!("invalid message: {}", e));
                                    }
                                }
                            }
                            Message::Close(_) => break,
                            _ => {}
                        }
                    }

                    _ = keepalive.tick() => {
                        if last_seen.elapsed() > timeout {
                            warn!("Keepalive timeout for {}, dropping channel", participant_id);
                            break;
                        }
                        if tx.send(Message::Ping(Bytes::new())).is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    state.signaling.remove_peer(&participant_id);
    state.room_manager.disconnect(&participant_id).await;
    info!("WebSocket disconnected: {}", participant_id);
}

async fn dispatch(state: &AppState, participant_id: &ParticipantId, signal: SignalMessage) {
    match signal {
        SignalMessage::JoinRoom { room_id, username } => {
            if room_id.is_empty() {
                reject(state, participant_id, "room id must not be empty".to_owned());
                return;
            }
            if username.chars().count() > MAX_USERNAME_CHARS {
                reject(
                    state,
                    participant_id,
                    format!("username longer than {} characters", MAX_USERNAME_CHARS),
                );
                return;
            }

            let user = ParticipantInfo::new(participant_id.clone(), username);
            state.room_manager.join(user, room_id).await;
        }

        signal @ (SignalMessage::Offer(_)
        | SignalMessage::Answer(_)
        | SignalMessage::IceCandidate(_)) => relay_signal(state, participant_id, signal),

        other => {
            warn!(
                "Participant {} sent relay-only message {}",
                participant_id,
                other.kind()
            );
            reject(
                state,
                participant_id,
                format!("unexpected message type {}", other.kind()),
            );
        }
    }
}

/// Forwards an offer/answer/candidate to its target. Targets that are gone or
/// in another room are a silent drop.
fn relay_signal(state: &AppState, from: &ParticipantId, signal: SignalMessage) {
    let Some(target) = signal.relayed().map(|r| r.to.clone()) else {
        return;
    };

    if !state.room_manager.share_room(from, &target) {
        debug!(
            "Dropping {} from {} to {}: not in the same room",
            signal.kind(),
            from,
            target
        );
        return;
    }

    let kind = signal.kind();
    if state
        .signaling
        .send_signal(&target, &signal.with_sender(from.clone()))
    {
        debug!("Relayed {} from {} to {}", kind, from, target);
    }
}

fn reject(state: &AppState, participant_id: &ParticipantId, message: String) {
    state
        .signaling
        .send_signal(participant_id, &SignalMessage::Error { message });
}
