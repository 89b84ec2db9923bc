use crate::config::SessionConfig;
use crate::error::{ClientError, Result};
use crate::media::{LocalMedia, MediaSource, RemoteTrack};
use crate::mesh::{MeshCoordinator, MeshEvent, MeshHandle, PeerSummary};
use crate::signaling::{SignalingChannel, SignalingOutput};
use crate::transport::TransportFactory;
use meshcall_core::{ParticipantId, RoomId, SignalMessage};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The user ended the call.
    Left,
    /// The relay connection dropped.
    ChannelDisconnected,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Mesh(MeshEvent),
    Ended(EndReason),
}

/// Shared teardown state, reachable from both `end_call` and the inbound
/// pump that notices a lost channel.
struct SessionShared {
    ended: AtomicBool,
    media: LocalMedia,
    mesh: MeshHandle,
    channel: Arc<SignalingChannel>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionShared {
    /// Runs at most once.
    async fn end(&self, reason: EndReason) -> bool {
        if self.ended.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("Call ended: {:?}", reason);
        if let Err(e) = self.mesh.leave().await {
            debug!("Mesh already stopped: {}", e);
        }
        self.media.stop();
        self.channel.close().await;
        let _ = self.events.send(SessionEvent::Ended(reason));
        true
    }
}

/// A joined call: local capture, relay connection and the peer mesh.
pub struct Session {
    participant_id: ParticipantId,
    room_id: RoomId,
    shared: Arc<SessionShared>,
    pump: JoinHandle<()>,
    forwarder: JoinHandle<()>,
}

impl Session {
    /// Acquires media, connects to the relay, waits for the assigned id and
    /// joins the configured room.
    ///
    /// Media is released again if anything after acquisition fails.
    pub async fn start(
        config: SessionConfig,
        media_source: &dyn MediaSource,
        factory: Arc<dyn TransportFactory>,
    ) -> Result<Session> {
        config.validate()?;

        let media = media_source.acquire().await?;
        info!(
            "Local media acquired ({} tracks), connecting to {}",
            media.tracks().len(),
            config.signaling_url
        );

        let connected = tokio::time::timeout(config.join_timeout, async {
            let (channel, mut inbound) = SignalingChannel::connect(&config.signaling_url).await?;
            let participant_id = wait_for_welcome(&mut inbound).await?;
            Ok::<_, ClientError>((channel, inbound, participant_id))
        })
        .await;

        let (channel, inbound, participant_id) = match connected {
            Ok(Ok(parts)) => parts,
            Ok(Err(e)) => {
                media.stop();
                return Err(e);
            }
            Err(_) => {
                media.stop();
                return Err(ClientError::Timeout(format!(
                    "no welcome from {} within {:?}",
                    config.signaling_url, config.join_timeout
                )));
            }
        };
        info!("Assigned participant id {}", participant_id);

        let channel = Arc::new(channel);
        let signaling: Arc<dyn SignalingOutput> = channel.clone();
        let mesh = MeshCoordinator::spawn(
            participant_id.clone(),
            config.mesh.clone(),
            signaling,
            factory,
            media.clone(),
        );

        let (events, _) = broadcast::channel(config.mesh.event_capacity.max(1));
        let shared = Arc::new(SessionShared {
            ended: AtomicBool::new(false),
            media,
            mesh: mesh.clone(),
            channel: channel.clone(),
            events: events.clone(),
        });

        let forwarder = tokio::spawn(forward_mesh_events(mesh.subscribe(), events));
        let pump = tokio::spawn(pump_inbound(inbound, shared.clone()));

        if let Err(e) = channel
            .join_room(&config.room_id, &config.display_name)
            .await
        {
            shared.end(EndReason::ChannelDisconnected).await;
            pump.abort();
            forwarder.abort();
            return Err(e);
        }
        info!(
            "Joining room {} as {}",
            config.room_id, config.display_name
        );

        Ok(Session {
            participant_id,
            room_id: config.room_id,
            shared,
            pump,
            forwarder,
        })
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn local_media(&self) -> &LocalMedia {
        &self.shared.media
    }

    pub fn is_ended(&self) -> bool {
        self.shared.ended.load(Ordering::SeqCst)
    }

    /// Mutes or unmutes the camera without renegotiating.
    pub fn toggle_camera(&self, enabled: bool) {
        self.shared.media.set_video_enabled(enabled);
    }

    pub fn toggle_microphone(&self, enabled: bool) {
        self.shared.media.set_audio_enabled(enabled);
    }

    pub fn is_video_enabled(&self) -> bool {
        self.shared.media.is_video_enabled()
    }

    pub fn is_audio_enabled(&self) -> bool {
        self.shared.media.is_audio_enabled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn active_peers(&self) -> usize {
        self.shared.mesh.active_peers()
    }

    pub async fn peers(&self) -> Result<Vec<PeerSummary>> {
        self.shared.mesh.peers().await
    }

    pub async fn remote_tracks(&self) -> Result<Vec<(ParticipantId, RemoteTrack)>> {
        let peers = self.peers().await?;
        Ok(peers
            .into_iter()
            .flat_map(|peer| {
                let id = peer.info.id;
                peer.tracks.into_iter().map(move |track| (id.clone(), track))
            })
            .collect())
    }

    /// Closes every link, releases media and disconnects from the relay.
    pub async fn end_call(self) -> Result<()> {
        self.shared.end(EndReason::Left).await;
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.pump.abort();
        self.forwarder.abort();
    }
}

async fn wait_for_welcome(
    inbound: &mut mpsc::UnboundedReceiver<SignalMessage>,
) -> Result<ParticipantId> {
    while let Some(msg) = inbound.recv().await {
        match msg {
            SignalMessage::Welcome { participant_id } => return Ok(participant_id),
            SignalMessage::Error { message } => return Err(ClientError::Protocol(message)),
            other => debug!("Ignoring {} before welcome", other.kind()),
        }
    }
    Err(ClientError::ChannelDisconnected)
}

async fn pump_inbound(
    mut inbound: mpsc::UnboundedReceiver<SignalMessage>,
    shared: Arc<SessionShared>,
) {
    while let Some(msg) = inbound.recv().await {
        // Teardown has started; nothing may reach the mesh any more.
        if shared.ended.load(Ordering::SeqCst) {
            return;
        }
        if let SignalMessage::Error { message } = &msg {
            warn!("Relay rejected a message: {}", message);
            continue;
        }
        if shared.mesh.deliver(msg).is_err() {
            return;
        }
    }
    warn!("Signaling channel lost");
    shared.end(EndReason::ChannelDisconnected).await;
}

async fn forward_mesh_events(
    mut mesh_events: broadcast::Receiver<MeshEvent>,
    events: broadcast::Sender<SessionEvent>,
) {
    loop {
        match mesh_events.recv().await {
            Ok(event) => {
                let _ = events.send(SessionEvent::Mesh(event));
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Session event forwarder lagged, {} events skipped", skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
